//! Helpers for JSON asset documents
//!
//! Material, material instance and scene files are JSON objects that refer to
//! other assets by their 26 character ULID.

use crate::assets::AssetMetadata;
use crate::error::Result;
use crate::ulid::Ulid;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{Read, Seek, SeekFrom};

/// Read the JSON document described by `metadata`, starting at its offset
pub fn read_document(metadata: &AssetMetadata) -> Result<Value> {
    let mut file = std::fs::File::open(&metadata.path)?;
    if metadata.offset > 0 {
        file.seek(SeekFrom::Start(u64::from(metadata.offset)))?;
    }
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Convert the value at `key`.
///
/// A missing key gives `None` silently, a value of the wrong shape is logged.
pub fn field<T: DeserializeOwned>(object: &Value, key: &str) -> Option<T> {
    let value = object.get(key)?;
    match T::deserialize(value) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("Invalid value for json key \"{key}\": {e}");
            None
        }
    }
}

/// Asset id stored as a string at `key`
pub fn asset_id(object: &Value, key: &str) -> Option<Ulid> {
    let text = object.get(key)?.as_str()?;
    let id = Ulid::from_str_lossy(text);
    if id.is_nil() {
        tracing::warn!("Ignoring invalid asset id \"{text}\" for key \"{key}\"");
        return None;
    }
    Some(id)
}

/// Asset ids in the string array at `key`; invalid entries are skipped
pub fn asset_ids(object: &Value, key: &str) -> Vec<Ulid> {
    let Some(items) = object.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.as_str().map(Ulid::from_str_lossy).unwrap_or_default();
            if id.is_nil() {
                tracing::warn!("Ignoring invalid asset id {item} in \"{key}\"");
                None
            } else {
                Some(id)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetType;
    use serde_json::json;
    use std::io::Write;

    const ID: &str = "01HWPC5Y8GZZ3A6AQVX4PYRXHC";

    #[test]
    fn test_asset_ids() {
        let doc = json!({ "textures": [ID, "bogus", 3, ID.to_lowercase()] });
        let ids = asset_ids(&doc, "textures");
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
        assert!(asset_ids(&doc, "missing").is_empty());
    }

    #[test]
    fn test_asset_id_and_field() {
        let doc = json!({ "shader": ID, "depth": true, "count": "three" });
        assert_eq!(asset_id(&doc, "shader").unwrap().to_string(), ID);
        assert_eq!(field::<bool>(&doc, "depth"), Some(true));
        assert_eq!(field::<u32>(&doc, "count"), None);
        assert_eq!(field::<u32>(&doc, "absent"), None);
    }

    #[test]
    fn test_read_document_with_offset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"HEADER{\"name\": \"packed\"}").unwrap();
        let metadata = AssetMetadata {
            id: Ulid::generate(),
            name: "packed".into(),
            asset_type: AssetType::Scene,
            path: file.path().to_path_buf(),
            offset: 6,
        };
        let doc = read_document(&metadata).unwrap();
        assert_eq!(doc["name"], "packed");
    }
}
