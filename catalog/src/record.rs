//! Shop records and raw JSON normalization.

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// A shop entry as it appears in an uploaded JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawShop {
    pub title: String,
    pub venue: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub subcategories: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// A normalized shop. Immutable once ingested; copied by value into
/// retrieval results and conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRecord {
    /// Stable identifier, `"{name} | {location}"`.
    pub id: String,

    /// Shop name.
    pub name: String,

    /// Top-level categories, e.g. "Food & Beverage".
    pub categories: Vec<String>,

    /// Finer-grained categories, e.g. "Chinese".
    #[serde(default)]
    pub subcategories: Vec<String>,

    /// Lower-cased search keywords, unique.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Free-text description.
    pub description: String,

    /// Floor / lot label.
    pub location: String,
}

impl ShopRecord {
    /// Normalize a raw entry. `position` is only used for error reporting.
    pub fn from_raw(raw: RawShop, position: usize) -> Result<Self> {
        let name = collapse_whitespace(&raw.title);
        let location = collapse_whitespace(&raw.venue);

        if name.is_empty() {
            return Err(CatalogError::InvalidRecord {
                position,
                reason: "missing title".to_string(),
            });
        }
        if location.is_empty() {
            return Err(CatalogError::InvalidRecord {
                position,
                reason: format!("shop {name:?} has no venue"),
            });
        }

        let mut keywords: Vec<String> = Vec::new();
        for keyword in clean_list(raw.keywords) {
            let keyword = keyword.to_lowercase();
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }

        Ok(Self {
            id: format!("{name} | {location}"),
            name,
            categories: clean_list(raw.categories),
            subcategories: clean_list(raw.subcategories),
            keywords,
            description: collapse_whitespace(&raw.description),
            location,
        })
    }

    /// Categories joined for display.
    pub fn category(&self) -> String {
        self.categories.join(", ")
    }

    /// Human-readable document stored alongside the embedding.
    pub fn document(&self) -> String {
        format!(
            "Title: {}\nVenue: {}\nCategories: {}\nSubcategories: {}\nDescription: {}",
            self.name,
            self.location,
            self.categories.join(", "),
            self.subcategories.join(", "),
            self.description
        )
    }

    /// Compact text the embedding is computed from: name, categories,
    /// subcategories and keywords. The description is not embedded.
    pub fn embedding_text(&self) -> String {
        [
            self.name.clone(),
            self.categories.join(", "),
            self.subcategories.join(", "),
            self.keywords.join(", "),
        ]
        .join(" | ")
    }
}

/// Parse and normalize a JSON array of shops.
///
/// A single invalid entry rejects the whole upload.
pub fn parse_shops(json: &str) -> Result<Vec<ShopRecord>> {
    let raw: Vec<RawShop> = serde_json::from_str(json)?;
    raw.into_iter()
        .enumerate()
        .map(|(position, shop)| ShopRecord::from_raw(shop, position))
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .iter()
        .map(|item| collapse_whitespace(item))
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"[
        {
            "title": "  Dolly   Dim Sum ",
            "venue": "LG2.12",
            "categories": ["Food & Beverage"],
            "subcategories": ["Chinese", ""],
            "keywords": ["Dim Sum", "halal", "dim sum", " "],
            "description": "Halal   dim sum all day."
        }
    ]"#;

    #[test]
    fn test_parse_normalizes_fields() {
        let shops = parse_shops(SAMPLE).unwrap();
        let shop = &shops[0];

        assert_eq!(shop.id, "Dolly Dim Sum | LG2.12");
        assert_eq!(shop.name, "Dolly Dim Sum");
        assert_eq!(shop.subcategories, vec!["Chinese".to_string()]);
        assert_eq!(shop.keywords, vec!["dim sum".to_string(), "halal".to_string()]);
        assert_eq!(shop.description, "Halal dim sum all day.");
    }

    #[test]
    fn test_embedding_text_layout() {
        let shop = &parse_shops(SAMPLE).unwrap()[0];
        assert_eq!(
            shop.embedding_text(),
            "Dolly Dim Sum | Food & Beverage | Chinese | dim sum, halal"
        );
        assert!(shop.document().contains("Venue: LG2.12"));
    }

    #[test]
    fn test_missing_venue_rejects_upload() {
        let json = r#"[
            {"title": "Ok", "venue": "G1"},
            {"title": "Broken", "venue": "   "}
        ]"#;
        let err = parse_shops(json).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord { position: 1, .. }));
    }

    #[test]
    fn test_not_an_array() {
        assert!(matches!(
            parse_shops(r#"{"title": "x"}"#),
            Err(CatalogError::Serialization(_))
        ));
    }
}
