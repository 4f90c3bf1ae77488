//! Shop record store.
//!
//! An id-keyed catalog of normalized shops, persisted as a single JSON
//! snapshot written atomically through a temp file.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::fs;
use tracing::{debug, info};

use crate::error::Result;
use crate::record::ShopRecord;

/// Id-keyed collection of shops.
#[derive(Debug, Clone, Default)]
pub struct ShopCatalog {
    records: BTreeMap<String, ShopRecord>,
}

impl ShopCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a shop. Returns `true` when the id was new.
    pub fn upsert(&mut self, record: ShopRecord) -> bool {
        self.records.insert(record.id.clone(), record).is_none()
    }

    /// Get a shop by id.
    pub fn get(&self, id: &str) -> Option<&ShopRecord> {
        self.records.get(id)
    }

    /// Number of shops.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All shops in id order.
    pub fn records(&self) -> impl Iterator<Item = &ShopRecord> {
        self.records.values()
    }

    /// Serialize the catalog to JSON.
    pub fn to_json(&self) -> Result<String> {
        let records: Vec<&ShopRecord> = self.records.values().collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// Load a catalog from a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<ShopRecord> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for record in records {
            catalog.upsert(record);
        }
        Ok(catalog)
    }

    /// Load a snapshot from disk; a missing file yields an empty catalog.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            debug!("No catalog snapshot at {}", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).await?;
        let catalog = Self::from_json(&content)?;
        info!("Loaded {} shops from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Write a snapshot to disk.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, self.to_json()?).await?;
        fs::rename(&temp_path, path).await?;

        debug!("Saved {} shops to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_shops;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn shops() -> Vec<ShopRecord> {
        parse_shops(
            r#"[
                {"title": "Dolly Dim Sum", "venue": "LG2.12", "categories": ["Food & Beverage"]},
                {"title": "Uniqlo", "venue": "G1.05", "categories": ["Fashion"]}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_upsert_reports_new_ids() {
        let mut catalog = ShopCatalog::new();
        let records = shops();

        assert!(catalog.upsert(records[0].clone()));
        assert!(!catalog.upsert(records[0].clone()));
        assert!(catalog.upsert(records[1].clone()));
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("shops.json");

        let mut catalog = ShopCatalog::new();
        for record in shops() {
            catalog.upsert(record);
        }
        catalog.save(&path).await.unwrap();

        let restored = ShopCatalog::load(&path).await.unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get("Uniqlo | G1.05").unwrap().name, "Uniqlo");
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = ShopCatalog::load(temp_dir.path().join("nope.json"))
            .await
            .unwrap();
        assert!(catalog.is_empty());
    }
}
