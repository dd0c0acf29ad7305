use serde::Serialize;
use shopgen_contracts::catalog::Product;

/// A product with the text the pipeline would derive for it, before any
/// model call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptPreview {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_prompt: String,
}

pub fn build_description(product: &Product) -> String {
    format!(
        "{} is a {} staple for {}. Crafted for daily wear with a comfortable fit, it comes in {} and sizes {}. Finished with durable details for long-lasting use.",
        product.name,
        product.category,
        product.age_group,
        leading(&product.colors, 2),
        leading(&product.sizes, 3),
    )
}

pub fn build_image_prompt(product: &Product) -> String {
    format!(
        "Studio product photo of a {} item named {}, color palette {}, minimal background, soft diffused lighting, realistic fabric texture, centered composition, no text, no logos.",
        product.category,
        product.name,
        leading(&product.colors, 2),
    )
}

/// Instruction sent to the text model when descriptions are model-written.
pub fn build_copy_prompt(product: &Product) -> String {
    format!(
        "Write a short, premium product description (1-2 sentences) for a clothing item.\n\
Name: {}\n\
Category: {}\n\
Age group: {}\n\
Colors: {}\n\
Sizes: {}\n\
Price: ${}\n\
Avoid markdown and keep it under 40 words.",
        product.name,
        product.category,
        product.age_group,
        product.colors.join(", "),
        product.sizes.join(", "),
        format_price(product.price),
    )
}

pub fn preview(products: &[Product]) -> Vec<PromptPreview> {
    products
        .iter()
        .map(|product| PromptPreview {
            id: product.id.clone(),
            name: product.name.clone(),
            description: build_description(product),
            image_prompt: build_image_prompt(product),
        })
        .collect()
}

fn leading(values: &[String], count: usize) -> String {
    values
        .iter()
        .take(count)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whole prices print without a decimal point (`28`), others as-is (`28.5`).
fn format_price(price: f64) -> String {
    if price.fract() == 0.0 && price.abs() < 1e15 {
        format!("{}", price as i64)
    } else {
        format!("{price}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tee() -> Product {
        Product {
            id: "tee-001".to_string(),
            name: "Nimbus Cotton Tee".to_string(),
            age_group: "adults".to_string(),
            category: "tops".to_string(),
            price: 28.0,
            sizes: ["XS", "S", "M", "L", "XL"].map(String::from).to_vec(),
            colors: ["white", "midnight", "sage"].map(String::from).to_vec(),
            description: "Soft combed cotton tee.".to_string(),
            inventory: 42,
        }
    }

    #[test]
    fn description_uses_two_colors_and_three_sizes() {
        assert_eq!(
            build_description(&tee()),
            "Nimbus Cotton Tee is a tops staple for adults. Crafted for daily wear with a comfortable fit, it comes in white, midnight and sizes XS, S, M. Finished with durable details for long-lasting use."
        );
    }

    #[test]
    fn image_prompt_golden() {
        assert_eq!(
            build_image_prompt(&tee()),
            "Studio product photo of a tops item named Nimbus Cotton Tee, color palette white, midnight, minimal background, soft diffused lighting, realistic fabric texture, centered composition, no text, no logos."
        );
    }

    #[test]
    fn builders_are_pure() {
        let product = tee();
        assert_eq!(build_description(&product), build_description(&product.clone()));
        assert_eq!(build_image_prompt(&product), build_image_prompt(&product));
        assert_eq!(product, tee());
    }

    #[test]
    fn short_lists_do_not_pad() {
        let mut product = tee();
        product.colors = vec!["ecru".to_string()];
        product.sizes = vec!["OS".to_string()];
        assert!(build_description(&product).contains("it comes in ecru and sizes OS."));
    }

    #[test]
    fn copy_prompt_lists_everything() {
        let mut product = tee();
        let prompt = build_copy_prompt(&product);
        assert!(prompt.starts_with("Write a short, premium product description"));
        assert!(prompt.contains("\nColors: white, midnight, sage\n"));
        assert!(prompt.contains("\nSizes: XS, S, M, L, XL\n"));
        assert!(prompt.contains("\nPrice: $28\n"));
        assert!(prompt.ends_with("keep it under 40 words."));

        product.price = 74.5;
        assert!(build_copy_prompt(&product).contains("Price: $74.5"));
    }

    #[test]
    fn preview_rows_follow_catalog_order() {
        let mut second = tee();
        second.id = "tee-002".to_string();
        let rows = preview(&[tee(), second]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, "tee-002");
        assert_eq!(rows[0].image_prompt, build_image_prompt(&tee()));
    }
}
