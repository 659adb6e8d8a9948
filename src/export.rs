//! Export of the collected image list
//!
//! The worker context turns the shared collection into a downloadable
//! artifact. The core ships a JSON renderer; spreadsheet-shaped formats
//! are host concerns (they need the host's file-save UI) and reach this
//! API through the same trait.

use crate::pagination::types::ImageRecord;
use anyhow::{Result, bail};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Requested artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Json,
    Html,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

/// Rendering options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Restrict output to these record fields (camelCase keys); `None`
    /// exports every field
    pub fields: Option<Vec<String>>,
    /// Pretty-print where the format supports it
    pub pretty: bool,
}

/// A rendered artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub record_count: usize,
}

/// Renders the collected records into one format
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(
        &self,
        records: &[ImageRecord],
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<ExportResult>;
}

/// Built-in JSON renderer with optional field projection
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

#[async_trait]
impl Exporter for JsonExporter {
    async fn export(
        &self,
        records: &[ImageRecord],
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<ExportResult> {
        if format != ExportFormat::Json {
            bail!("unsupported export format: {format:?}");
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let value = serde_json::to_value(record)?;
            rows.push(project_fields(value, options.fields.as_deref()));
        }

        let bytes = if options.pretty {
            serde_json::to_vec_pretty(&rows)?
        } else {
            serde_json::to_vec(&rows)?
        };
        debug!("Exported {} records as JSON ({} bytes)", rows.len(), bytes.len());
        Ok(ExportResult {
            format,
            bytes,
            record_count: rows.len(),
        })
    }
}

/// Keep only the requested keys; unknown keys are silently absent from
/// the output rather than an error, so field lists survive schema drift
fn project_fields(value: Value, fields: Option<&[String]>) -> Value {
    let Some(fields) = fields else {
        return value;
    };
    let Value::Object(map) = value else {
        return Value::Null;
    };
    let mut projected = serde_json::Map::new();
    for field in fields {
        if let Some(v) = map.get(field) {
            projected.insert(field.clone(), v.clone());
        }
    }
    Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ImageRecord> {
        vec![
            ImageRecord::new(
                "https://cdn.example.com/a.jpg".to_string(),
                "https://example.com/g?page=1".to_string(),
                1,
            ),
            ImageRecord::new(
                "https://cdn.example.com/b.jpg".to_string(),
                "https://example.com/g?page=2".to_string(),
                2,
            ),
        ]
    }

    #[tokio::test]
    async fn exports_all_fields_by_default() {
        let result = JsonExporter
            .export(&records(), ExportFormat::Json, &ExportOptions::default())
            .await
            .unwrap();
        assert_eq!(result.record_count, 2);
        let rows: Vec<Value> = serde_json::from_slice(&result.bytes).unwrap();
        assert_eq!(rows[0]["fileUrl"], "https://cdn.example.com/a.jpg");
        assert_eq!(rows[1]["pageNumber"], 2);
    }

    #[tokio::test]
    async fn field_projection_drops_everything_else() {
        let options = ExportOptions {
            fields: Some(vec!["fileUrl".to_string(), "pageNumber".to_string()]),
            pretty: false,
        };
        let result = JsonExporter
            .export(&records(), ExportFormat::Json, &options)
            .await
            .unwrap();
        let rows: Vec<Value> = serde_json::from_slice(&result.bytes).unwrap();
        let row = rows[0].as_object().unwrap();
        assert_eq!(row.len(), 2);
        assert!(row.contains_key("fileUrl"));
        assert!(!row.contains_key("filename"));
    }

    #[tokio::test]
    async fn non_json_format_is_rejected() {
        let err = JsonExporter
            .export(&records(), ExportFormat::Xlsx, &ExportOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported export format"));
    }
}
