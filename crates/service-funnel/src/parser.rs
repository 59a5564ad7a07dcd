use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;
use crate::model::FUNNEL_DELIMITER;

/// One raw catalog row as it appears in the CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogRow {
    #[serde(rename = "Category ID")]
    pub category_id: i64,
    #[serde(rename = "Category Name")]
    pub category_name: String,
    #[serde(rename = "Service ID")]
    pub service_id: i64,
    #[serde(rename = "Question Funnel", default)]
    pub question_funnel: Option<String>,
}

pub fn parse_catalog_file(path: &Path) -> Result<Vec<CatalogRow>, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("failed to read {}: {e}", path.display())))?;
    parse_catalog(&content)
}

/// Parse catalog CSV content. Rows are numbered from 1, header excluded.
pub fn parse_catalog(content: &str) -> Result<Vec<CatalogRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<CatalogRow>().enumerate() {
        let row = result.map_err(|e| AppError::Parse {
            row: idx + 1,
            message: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Split a delimited funnel into trimmed tokens.
///
/// Returns `None` for a blank funnel or one with an empty step.
pub fn split_funnel(raw: &str) -> Option<Vec<String>> {
    if raw.trim().is_empty() {
        return None;
    }
    let tokens: Vec<String> = raw
        .split(FUNNEL_DELIMITER)
        .map(|t| t.trim().to_string())
        .collect();
    if tokens.iter().any(|t| t.is_empty()) {
        return None;
    }
    Some(tokens)
}
