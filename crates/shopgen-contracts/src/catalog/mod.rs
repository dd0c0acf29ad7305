mod extract;
mod product;

pub use extract::{extract_products_block, load_products, object_literal_to_json, parse_products};
pub use product::Product;
