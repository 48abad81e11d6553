use std::collections::HashSet;
use std::cmp::Ordering;
use bytes::Bytes;
use reqwest::Client;
use crate::error::AppError;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use calamine::Data;

/// Header name as shown to the user: trimmed, never blank, unique within the sheet.
pub fn unique_column_name(raw: &str, position: usize, existing_names: &mut HashSet<String>) -> String {
    let trimmed = raw.trim();
    let base_name = if trimmed.is_empty() {
        format!("column_{}", position + 1)
    } else {
        trimmed.to_string()
    };

    // If the name already exists, add a numeric suffix
    let mut cleaned = base_name.clone();
    let mut counter = 2;
    while !existing_names.insert(cleaned.clone()) {
        cleaned = format!("{}_{}", base_name, counter);
        counter += 1;
    }

    cleaned
}

pub async fn load_file_from_url(url: &str, max_size: usize) -> Result<Bytes, AppError> {
    let client = Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::FileProcessingError(
            format!("Failed to fetch file. Status: {}", response.status())
        ));
    }

    if let Some(len) = response.content_length() {
        if len as usize > max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "File is {} bytes, limit is {} bytes", len, max_size
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to read response bytes: {}", e)))?;

    ensure_within_limit(bytes.len(), max_size)?;
    Ok(bytes)
}

pub fn ensure_within_limit(len: usize, max_size: usize) -> Result<(), AppError> {
    if len > max_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File is {} bytes, limit is {} bytes", len, max_size
        )));
    }
    Ok(())
}

pub fn is_date_string(s: &str) -> bool {
    let s = s.trim();
    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ];
    let date_formats = [
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%m/%d/%Y",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%Y年%m月%d日",
    ];

    datetime_formats
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(s, format).is_ok())
        || date_formats
            .iter()
            .any(|format| NaiveDate::parse_from_str(s, format).is_ok())
}

/// Convert an Excel serial date (1900 system) to an ISO-8601 string.
pub fn excel_serial_to_iso(serial: f64) -> Option<String> {
    // 2958465 is 9999-12-31
    if !serial.is_finite() || !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let value = epoch.checked_add_signed(Duration::milliseconds(millis))?;

    if serial.fract() == 0.0 {
        Some(value.format("%Y-%m-%d").to_string())
    } else {
        Some(value.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

pub fn cell_to_string(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::DateTime(d) => excel_serial_to_iso(d.as_f64()).unwrap_or_else(|| value.to_string()),
        _ => value.to_string(),
    }
}

pub fn cell_as_f64(value: &Data) -> Option<f64> {
    match value {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        _ => None,
    }
}

/// Running min/max where values are compared with `cmp`.
pub fn update_min_max<T, F>(min_max: &mut (Option<T>, Option<T>), value: T, cmp: F)
where
    T: Clone,
    F: Fn(&T, &T) -> Ordering,
{
    match &min_max.0 {
        Some(min_val) if cmp(&value, min_val) == Ordering::Less => min_max.0 = Some(value.clone()),
        None => min_max.0 = Some(value.clone()),
        _ => {}
    }

    match &min_max.1 {
        Some(max_val) if cmp(&value, max_val) == Ordering::Greater => min_max.1 = Some(value),
        None => min_max.1 = Some(value),
        _ => {}
    }
}

pub fn merge_min_max<T, F>(
    a: (Option<T>, Option<T>),
    b: (Option<T>, Option<T>),
    cmp: F,
) -> (Option<T>, Option<T>)
where
    F: Fn(&T, &T) -> Ordering,
{
    let min = match (a.0, b.0) {
        (None, None) => None,
        (Some(v), None) | (None, Some(v)) => Some(v),
        (Some(v1), Some(v2)) => Some(if cmp(&v1, &v2) != Ordering::Greater { v1 } else { v2 }),
    };
    let max = match (a.1, b.1) {
        (None, None) => None,
        (Some(v), None) | (None, Some(v)) => Some(v),
        (Some(v1), Some(v2)) => Some(if cmp(&v1, &v2) != Ordering::Less { v1 } else { v2 }),
    };
    (min, max)
}
