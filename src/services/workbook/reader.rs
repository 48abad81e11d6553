use super::classifier::classify_column;
use super::utils::*;
use std::io::Cursor;
use std::collections::HashSet;
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::Utc;
use serde_json::{Number, Value};
use crate::error::AppError;
use crate::models::{ColumnCategories, FileData, Row, SheetData};

/// Decode a workbook (xlsx, xlsm, xlsb, xls, ods) into sheets of named rows.
///
/// Worksheets with no header row are skipped; a workbook without any usable
/// worksheet is rejected.
pub fn parse_workbook(name: &str, file_data: Bytes, max_rows: usize) -> Result<FileData, AppError> {
    let start = std::time::Instant::now();
    tracing::info!("Parsing workbook {} ({}KB)", name, file_data.len() / 1024);

    let cursor = Cursor::new(file_data);
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| {
            tracing::error!("Failed to open workbook {}: {}", name, e);
            AppError::FileProcessingError(format!("Failed to open workbook {}: {}", name, e))
        })?;

    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for sheet_name in &sheet_names {
        match workbook.worksheet_range(sheet_name) {
            Ok(range) => {
                let mut rows = range.rows();
                let Some(header_row) = rows.next().map(|row| row.to_vec()) else {
                    tracing::warn!("Sheet {} is empty, skipping", sheet_name);
                    continue;
                };
                // the cap counts data rows, so blank rows are dropped first
                let mut body: Vec<Vec<Data>> = rows
                    .filter(|row| !row.iter().all(is_blank))
                    .take(max_rows + 1)
                    .map(|row| row.to_vec())
                    .collect();
                let truncated = body.len() > max_rows;
                if truncated {
                    body.truncate(max_rows);
                    tracing::warn!(
                        "Sheet {} has more than {} data rows, keeping the first {}",
                        sheet_name, max_rows, max_rows
                    );
                }

                match build_sheet(sheet_name, header_row, body, truncated) {
                    Some(sheet) => {
                        tracing::info!(
                            "Sheet {}: {} rows x {} columns",
                            sheet_name, sheet.rows.len(), sheet.columns.len()
                        );
                        sheets.push(sheet);
                    }
                    None => tracing::warn!("Sheet {} is empty, skipping", sheet_name),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read worksheet {}: {}", sheet_name, e);
                continue;
            }
        }
    }

    if sheets.is_empty() {
        tracing::error!("No valid data found in workbook {}", name);
        return Err(AppError::FileProcessingError(format!("No valid data found in {}", name)));
    }

    tracing::info!("Parsed {} sheets of {} in {:?}", sheets.len(), name, start.elapsed());
    Ok(FileData {
        name: name.to_string(),
        uploaded_at: Utc::now(),
        sheets,
    })
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// `body` holds the non-blank data rows below `header_row`.
fn build_sheet(
    sheet_name: &str,
    header_row: Vec<Data>,
    body: Vec<Vec<Data>>,
    truncated: bool,
) -> Option<SheetData> {
    let width = body.iter()
        .map(|row| row.len())
        .chain(std::iter::once(header_row.len()))
        .max()
        .unwrap_or(0);

    // Keep a column if it has a header or at least one value
    let kept: Vec<usize> = (0..width)
        .filter(|&idx| {
            header_row.get(idx).map_or(false, |c| !is_blank(c))
                || body.iter().any(|row| row.get(idx).map_or(false, |c| !is_blank(c)))
        })
        .collect();

    if kept.is_empty() {
        return None;
    }

    let mut existing_names = HashSet::new();
    let columns: Vec<String> = kept.iter()
        .map(|&idx| {
            let raw = header_row.get(idx).map(cell_to_string).unwrap_or_default();
            unique_column_name(&raw, idx, &mut existing_names)
        })
        .collect();

    let mut categories = ColumnCategories::default();
    let profiles = kept.iter().zip(&columns)
        .map(|(&idx, name)| {
            let values: Vec<Data> = body.iter()
                .map(|row| row.get(idx).cloned().unwrap_or(Data::Empty))
                .collect();
            let profile = classify_column(name, &values);
            categories.push(profile.bucket, name);
            profile
        })
        .collect();

    let data_rows = body.iter()
        .map(|row| {
            kept.iter().zip(&columns)
                .map(|(&idx, name)| {
                    let value = row.get(idx).map(cell_to_json).unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect::<Row>()
        })
        .collect();

    Some(SheetData {
        name: sheet_name.to_string(),
        columns,
        rows: data_rows,
        categories,
        profiles,
        truncated,
    })
}

pub fn cell_to_json(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Number((*i).into()),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        _ => Value::String(cell_to_string(cell)),
    }
}
