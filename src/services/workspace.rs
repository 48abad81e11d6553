use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::error::AppError;
use crate::models::{ColumnCategories, FileData, SheetData};
use crate::services::selection::SheetSelection;
use crate::services::steps::StepBoard;

/// Everything the dashboard shows: uploaded files, the sheet selection and
/// the analysis steps.
#[derive(Debug, Default)]
pub struct Workspace {
    files: Vec<FileData>,
    pub selection: SheetSelection,
    pub board: StepBoard,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetSummary {
    pub index: usize,
    pub name: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub categories: ColumnCategories,
    pub truncated: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub index: usize,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub sheets: Vec<SheetSummary>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[FileData] {
        &self.files
    }

    /// Store a parsed file and select its first sheet. Returns the file index.
    pub fn add_file(&mut self, file: FileData) -> usize {
        let index = self.files.len();
        if !file.sheets.is_empty() {
            self.selection.select(index, 0);
        }
        tracing::info!("Added file {} at index {} ({} sheets)", file.name, index, file.sheets.len());
        self.files.push(file);
        index
    }

    pub fn remove_file(&mut self, index: usize) -> Result<FileData, AppError> {
        self.file(index)?;
        let removed = self.files.remove(index);
        self.selection.remove_file_and_shift(index);
        tracing::info!("Removed file {} from index {}", removed.name, index);
        Ok(removed)
    }

    pub fn file(&self, index: usize) -> Result<&FileData, AppError> {
        self.files
            .get(index)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", index)))
    }

    pub fn sheet(&self, file: usize, sheet: usize) -> Result<&SheetData, AppError> {
        self.file(file)?
            .sheets
            .get(sheet)
            .ok_or_else(|| AppError::NotFound(format!("Sheet {} of file {} not found", sheet, file)))
    }

    pub fn toggle_sheet(&mut self, file: usize, sheet: usize) -> Result<bool, AppError> {
        self.sheet(file, sheet)?;
        Ok(self.selection.toggle(file, sheet))
    }

    pub fn set_file_selection(&mut self, file: usize, sheets: &[usize]) -> Result<(), AppError> {
        self.file(file)?;
        for &sheet in sheets {
            self.sheet(file, sheet)?;
        }
        self.selection.set_file(file, sheets.iter().copied());
        Ok(())
    }

    /// Selected sheets in selection order, with their file.
    pub fn selected_sheets(&self) -> Vec<(&FileData, &SheetData)> {
        self.selection
            .entries()
            .filter_map(|(file, sheet)| {
                let file_data = self.files.get(file)?;
                let sheet_data = file_data.sheets.get(sheet)?;
                Some((file_data, sheet_data))
            })
            .collect()
    }

    pub fn file_summaries(&self) -> Vec<FileSummary> {
        self.files
            .iter()
            .enumerate()
            .map(|(file_idx, file)| FileSummary {
                index: file_idx,
                name: file.name.clone(),
                uploaded_at: file.uploaded_at,
                sheets: file.sheets
                    .iter()
                    .enumerate()
                    .map(|(sheet_idx, sheet)| SheetSummary {
                        index: sheet_idx,
                        name: sheet.name.clone(),
                        row_count: sheet.rows.len(),
                        columns: sheet.columns.clone(),
                        categories: sheet.categories.clone(),
                        truncated: sheet.truncated,
                        selected: self.selection.contains(file_idx, sheet_idx),
                    })
                    .collect(),
            })
            .collect()
    }
}
