use serde::{Deserialize, Serialize};

/// One catalog entry, named the way the pipeline reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub age_group: String,
    pub category: String,
    pub price: f64,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub description: String,
    pub inventory: u64,
}

/// Field names as they appear in the storefront's `data.ts`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CatalogRow {
    id: String,
    name: String,
    age_group: String,
    category: String,
    price_usd: f64,
    sizes: Vec<String>,
    colors: Vec<String>,
    product_description: String,
    inventory: u64,
}

impl From<CatalogRow> for Product {
    fn from(row: CatalogRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            age_group: row.age_group,
            category: row.category,
            price: row.price_usd,
            sizes: row.sizes,
            colors: row.colors,
            description: row.product_description,
            inventory: row.inventory,
        }
    }
}
