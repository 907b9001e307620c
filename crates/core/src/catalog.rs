use std::collections::BTreeMap;

/// Static reference data injected into prompt templates: the product
/// display-name → code mapping and the list of federal-district region codes.
///
/// Populated once at startup and read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    products: BTreeMap<String, String>,
    regions: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        let products = [
            ("Несквик", "12345"),
            ("Йогурт Чудо", "12"),
            ("Coca-Cola", "1001"),
            ("Pepsi", "1002"),
        ]
        .into_iter()
        .map(|(name, code)| (name.to_owned(), code.to_owned()))
        .collect();

        let regions = ["ЦФО", "СЗФО", "ЮФО", "ПФО", "УФО", "СФО", "ДФО", "СКФО"]
            .into_iter()
            .map(str::to_owned)
            .collect();

        Self { products, regions }
    }
}

impl Catalog {
    pub fn new(products: BTreeMap<String, String>, regions: Vec<String>) -> Self {
        Self { products, regions }
    }

    pub fn code_for(&self, display_name: &str) -> Option<&str> {
        self.products.get(display_name).map(String::as_str)
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// `"1001, 1002, 12, 12345"`; order follows the map's sorted keys.
    pub fn product_codes_joined(&self) -> String {
        self.products.values().cloned().collect::<Vec<_>>().join(", ")
    }

    pub fn product_names_joined(&self) -> String {
        self.products.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    /// `"Coca-Cola": "1001", ..., "Несквик": "12345"`, the exact shape the
    /// dialogue template shows the model.
    pub fn name_code_pairs_joined(&self) -> String {
        self.products
            .iter()
            .map(|(name, code)| format!("\"{name}\": \"{code}\""))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn regions_joined(&self) -> String {
        self.regions.join(", ")
    }
}
