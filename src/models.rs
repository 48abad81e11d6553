use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt;

pub const SAMPLE_SIZE: usize = 3;

/// One data row: column name to cell value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Serialize)]
pub struct FileData {
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub sheets: Vec<SheetData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetData {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub categories: ColumnCategories,
    pub profiles: Vec<ColumnProfile>,
    pub truncated: bool,
}

/// Semantic bucket a column is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnBucket {
    Id,
    Content,
    Category,
    Time,
    Numeric,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnCategories {
    pub id: Vec<String>,
    pub content: Vec<String>,
    pub category: Vec<String>,
    pub time: Vec<String>,
    pub numeric: Vec<String>,
    pub other: Vec<String>,
}

impl ColumnCategories {
    pub fn push(&mut self, bucket: ColumnBucket, column: &str) {
        let target = match bucket {
            ColumnBucket::Id => &mut self.id,
            ColumnBucket::Content => &mut self.content,
            ColumnBucket::Category => &mut self.category,
            ColumnBucket::Time => &mut self.time,
            ColumnBucket::Numeric => &mut self.numeric,
            ColumnBucket::Other => &mut self.other,
        };
        target.push(column.to_string());
    }

    pub fn bucket(&self, bucket: ColumnBucket) -> &[String] {
        match bucket {
            ColumnBucket::Id => &self.id,
            ColumnBucket::Content => &self.content,
            ColumnBucket::Category => &self.category,
            ColumnBucket::Time => &self.time,
            ColumnBucket::Numeric => &self.numeric,
            ColumnBucket::Other => &self.other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Numeric,
    Date,
    Boolean,
    String,
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub data_type: DataKind,
    pub bucket: ColumnBucket,
    pub sample_values: SmallVec<[String; SAMPLE_SIZE]>,
    pub null_count: usize,
    pub unique_count: usize,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub has_duplicates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Analyzing,
    Done,
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Analyzing => "analyzing",
            StepStatus::Done => "done",
            StepStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Area,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(alias = "type")]
    pub chart_type: ChartType,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "x")]
    pub x_field: String,
    #[serde(default, alias = "y", skip_serializing_if = "Option::is_none")]
    pub y_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub summary: String,
    pub insights: Vec<String>,
    pub charts: Vec<ChartConfig>,
}

/// Title and description of a step to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl StepSpec {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepAnalysis {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
    pub result: Option<StepResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepAnalysis {
    pub fn pending(id: String, spec: StepSpec) -> Self {
        Self {
            id,
            title: spec.title,
            description: spec.description,
            status: StepStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn spec(&self) -> StepSpec {
        StepSpec::new(self.title.clone(), self.description.clone())
    }
}

/// Result of an earlier step, handed to later steps as context.
#[derive(Debug, Clone, Serialize)]
pub struct PriorFinding {
    pub title: String,
    pub summary: String,
    pub insights: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_config_deserializes_with_optional_fields() {
        let chart: ChartConfig = serde_json::from_str(
            r#"{"chart_type": "bar", "title": "Sales by region", "x_field": "region"}"#,
        )
        .unwrap();
        assert_eq!(chart.chart_type, ChartType::Bar);
        assert!(chart.y_field.is_none());
        assert!(chart.aggregation.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&StepStatus::Analyzing).unwrap();
        assert_eq!(json, "\"analyzing\"");
        assert_eq!(StepStatus::Done.to_string(), "done");
    }

    #[test]
    fn test_categories_push_and_read_back() {
        let mut cats = ColumnCategories::default();
        cats.push(ColumnBucket::Time, "order_date");
        cats.push(ColumnBucket::Numeric, "amount");
        assert_eq!(cats.bucket(ColumnBucket::Time), ["order_date".to_string()]);
        assert!(cats.bucket(ColumnBucket::Id).is_empty());
    }
}
