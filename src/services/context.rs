use serde::Serialize;
use std::collections::HashSet;
use crate::error::AppError;
use crate::models::{ColumnBucket, ColumnCategories, ColumnProfile, Row};
use crate::services::workspace::Workspace;

/// What the model gets to see of one selected sheet.
#[derive(Debug, Clone, Serialize)]
pub struct SheetContext {
    pub file: String,
    pub sheet: String,
    pub row_count: usize,
    pub truncated: bool,
    pub columns: Vec<String>,
    pub categories: ColumnCategories,
    pub profiles: Vec<ColumnProfile>,
    pub sample_rows: Vec<Row>,
}

/// Snapshot of the selected sheets taken when analysis starts.
#[derive(Debug, Clone, Serialize)]
pub struct DataContext {
    pub sheets: Vec<SheetContext>,
}

impl DataContext {
    pub fn from_workspace(workspace: &Workspace, sample_rows: usize) -> Result<Self, AppError> {
        let sheets: Vec<SheetContext> = workspace
            .selected_sheets()
            .into_iter()
            .map(|(file, sheet)| SheetContext {
                file: file.name.clone(),
                sheet: sheet.name.clone(),
                row_count: sheet.rows.len(),
                truncated: sheet.truncated,
                columns: sheet.columns.clone(),
                categories: sheet.categories.clone(),
                profiles: sheet.profiles.clone(),
                sample_rows: sheet.rows.iter().take(sample_rows).cloned().collect(),
            })
            .collect();

        if sheets.is_empty() {
            return Err(AppError::InvalidInput("No sheets selected for analysis".to_string()));
        }
        Ok(Self { sheets })
    }

    pub fn column_names(&self) -> HashSet<&str> {
        self.sheets
            .iter()
            .flat_map(|s| s.columns.iter().map(String::as_str))
            .collect()
    }

    /// Column names in `bucket` across all selected sheets, without repeats.
    pub fn bucket_columns(&self, bucket: ColumnBucket) -> Vec<String> {
        let mut seen = HashSet::new();
        self.sheets
            .iter()
            .flat_map(|s| s.categories.bucket(bucket).iter())
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect()
    }

    pub fn to_prompt_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
