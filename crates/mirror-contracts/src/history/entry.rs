use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assets::decode_data_uri;

/// Snapshot of one successful generation, as persisted in the history slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
    pub person_preview: String,
    pub garment_preview: String,
    pub result_image: String,
    #[serde(default)]
    pub prompt: String,
    pub model_name: String,
}

impl HistoryEntry {
    /// New entry stamped with the current time and a time-ordered id.
    pub fn new(
        person_preview: impl Into<String>,
        garment_preview: impl Into<String>,
        result_image: impl Into<String>,
        prompt: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            person_preview: person_preview.into(),
            garment_preview: garment_preview.into(),
            result_image: result_image.into(),
            prompt: prompt.into(),
            model_name: model_name.into(),
        }
    }

    /// MIME type and bytes of the stored result image.
    pub fn decode_result(&self) -> anyhow::Result<(String, Vec<u8>)> {
        decode_data_uri(&self.result_image)
    }

    pub fn result_image_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.decode_result()?.1)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::HistoryEntry;

    #[test]
    fn serializes_with_camel_case_fields() -> anyhow::Result<()> {
        let entry = HistoryEntry::new("p.png", "g.png", "data:image/png;base64,AA==", "", "Flash");
        let value = serde_json::to_value(&entry)?;
        for key in [
            "id",
            "timestamp",
            "personPreview",
            "garmentPreview",
            "resultImage",
            "prompt",
            "modelName",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["modelName"], json!("Flash"));
        assert!(value["timestamp"].as_i64().unwrap_or(0) > 0);
        assert!(matches!(value["id"], Value::String(_)));
        Ok(())
    }

    #[test]
    fn ids_are_unique_and_time_ordered() {
        let first = HistoryEntry::new("p", "g", "r", "", "m");
        let second = HistoryEntry::new("p", "g", "r", "", "m");
        assert_ne!(first.id, second.id);
        assert!(first.id < second.id);
    }

    #[test]
    fn stored_result_decodes_to_image_bytes() -> anyhow::Result<()> {
        let entry = HistoryEntry::new("p", "g", "data:image/jpeg;base64,Zmlyc3Q=", "", "m");
        let (mime_type, bytes) = entry.decode_result()?;
        assert_eq!(mime_type, "image/jpeg");
        assert_eq!(bytes, b"first");
        assert_eq!(entry.result_image_bytes()?, b"first");

        let broken = HistoryEntry::new("p", "g", "not-a-uri", "", "m");
        assert!(broken.result_image_bytes().is_err());
        Ok(())
    }
}
