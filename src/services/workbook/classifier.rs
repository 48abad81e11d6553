use super::utils::*;
use calamine::Data;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashSet;
use crate::models::{ColumnBucket, ColumnProfile, DataKind, SAMPLE_SIZE};

const TYPE_DETECTION_ROWS: usize = 100;
const TYPE_THRESHOLD: f64 = 0.8;
const CATEGORY_MAX_DISTINCT: usize = 20;
const CATEGORY_MAX_RATIO: f64 = 0.5;
const CONTENT_MIN_AVG_LEN: f64 = 20.0;

const ID_TOKENS: &[&str] = &["id", "uuid", "guid", "key", "code", "sku", "ref"];
const ID_HINTS: &[&str] = &["编号", "序号", "工号", "单号"];
const TIME_TOKENS: &[&str] = &[
    "date", "time", "datetime", "timestamp", "year", "month", "day", "week", "quarter",
    "created", "updated", "modified",
];
const TIME_HINTS: &[&str] = &["日期", "时间", "年份", "月份"];
/// Words that make a time-hinted header a measure, as in `month_total`.
const MEASURE_TOKENS: &[&str] = &[
    "total", "sum", "amount", "count", "avg", "average", "revenue", "sales", "qty", "quantity",
    "price", "cost",
];

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern is valid")
});

#[derive(Debug, Default)]
struct ColumnStats {
    null_count: usize,
    seen: HashSet<String>,
    text_min_max: (Option<String>, Option<String>),
    numeric_min_max: (Option<f64>, Option<f64>),
    total_len: usize,
}

impl ColumnStats {
    fn observe(mut self, value: &Data) -> Self {
        if matches!(value, Data::Empty) {
            self.null_count += 1;
            return self;
        }
        let str_value = cell_to_string(value);
        if str_value.trim().is_empty() {
            self.null_count += 1;
            return self;
        }
        self.total_len += str_value.chars().count();
        if let Some(n) = cell_as_f64(value) {
            update_min_max(&mut self.numeric_min_max, n, cmp_f64);
        }
        update_min_max(&mut self.text_min_max, str_value.clone(), String::cmp);
        self.seen.insert(str_value);
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.null_count += other.null_count;
        self.total_len += other.total_len;
        self.seen.extend(other.seen);
        self.text_min_max = merge_min_max(self.text_min_max, other.text_min_max, String::cmp);
        self.numeric_min_max = merge_min_max(self.numeric_min_max, other.numeric_min_max, cmp_f64);
        self
    }
}

fn cmp_f64(a: &f64, b: &f64) -> std::cmp::Ordering {
    a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub fn detect_column_type(values: &[Data]) -> DataKind {
    let (numeric_count, date_count, bool_count, total) = values.par_iter()
        .take(TYPE_DETECTION_ROWS)
        .filter(|v| !matches!(v, Data::Empty))
        .fold(
            || (0usize, 0usize, 0usize, 0usize),
            |(mut num, mut date, mut boolean, mut total), value| {
                total += 1;
                match value {
                    Data::Float(_) | Data::Int(_) => num += 1,
                    Data::DateTime(_) | Data::DateTimeIso(_) => date += 1,
                    Data::String(s) if is_date_string(s) => date += 1,
                    Data::Bool(_) => boolean += 1,
                    _ => {}
                }
                (num, date, boolean, total)
            }
        )
        .reduce(|| (0, 0, 0, 0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2, a.3 + b.3)
        );

    if total == 0 {
        return DataKind::Empty;
    }

    let threshold = total as f64 * TYPE_THRESHOLD;
    match () {
        _ if numeric_count as f64 >= threshold => DataKind::Numeric,
        _ if date_count as f64 >= threshold => DataKind::Date,
        _ if bool_count as f64 >= threshold => DataKind::Boolean,
        _ => DataKind::String,
    }
}

fn name_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// `userId`, `orderID`
fn ends_with_camel_id(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let n = chars.len();
    n > 2
        && chars[n - 2] == 'I'
        && (chars[n - 1] == 'd' || chars[n - 1] == 'D')
        && chars[n - 3].is_lowercase()
}

pub fn looks_like_id_name(name: &str) -> bool {
    name_tokens(name).iter().any(|t| ID_TOKENS.contains(&t.as_str()))
        || ends_with_camel_id(name)
        || ID_HINTS.iter().any(|h| name.contains(h))
}

pub fn looks_like_time_name(name: &str) -> bool {
    name_tokens(name).iter().any(|t| TIME_TOKENS.contains(&t.as_str()))
        || name.ends_with("At")
        || TIME_HINTS.iter().any(|h| name.contains(h))
}

fn looks_like_measure_name(name: &str) -> bool {
    name_tokens(name).iter().any(|t| MEASURE_TOKENS.contains(&t.as_str()))
}

fn all_uuids(values: &[Data]) -> bool {
    let mut strings = values.iter()
        .filter_map(|v| match v {
            Data::String(s) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        })
        .peekable();
    strings.peek().is_some() && strings.all(|s| UUID_RE.is_match(s))
}

fn assign_bucket(name: &str, kind: DataKind, stats: &ColumnStats, values: &[Data]) -> ColumnBucket {
    if kind == DataKind::Empty {
        return ColumnBucket::Other;
    }
    if looks_like_id_name(name) || (kind == DataKind::String && all_uuids(values)) {
        return ColumnBucket::Id;
    }
    if kind == DataKind::Date {
        return ColumnBucket::Time;
    }
    if looks_like_time_name(name) {
        match kind {
            DataKind::String => return ColumnBucket::Time,
            DataKind::Numeric if !looks_like_measure_name(name) => return ColumnBucket::Time,
            _ => {}
        }
    }

    match kind {
        DataKind::Numeric => ColumnBucket::Numeric,
        DataKind::Boolean => ColumnBucket::Category,
        DataKind::String => {
            let distinct = stats.seen.len();
            let filled = (values.len() - stats.null_count).max(1);
            let distinct_ratio = distinct as f64 / filled as f64;
            let avg_len = stats.total_len as f64 / filled as f64;

            if distinct <= CATEGORY_MAX_DISTINCT && distinct_ratio <= CATEGORY_MAX_RATIO {
                ColumnBucket::Category
            } else if avg_len >= CONTENT_MIN_AVG_LEN || distinct_ratio > CATEGORY_MAX_RATIO {
                ColumnBucket::Content
            } else {
                ColumnBucket::Other
            }
        }
        _ => ColumnBucket::Other,
    }
}

/// Profile one column's values (header excluded) and sort it into a bucket.
pub fn classify_column(name: &str, values: &[Data]) -> ColumnProfile {
    let stats = values.par_iter()
        .fold(ColumnStats::default, |stats, value| stats.observe(value))
        .reduce(ColumnStats::default, ColumnStats::merge);

    let data_type = detect_column_type(values);
    let bucket = assign_bucket(name, data_type, &stats, values);

    let sample_values: SmallVec<[String; SAMPLE_SIZE]> = values.iter()
        .filter(|v| !matches!(v, Data::Empty))
        .take(SAMPLE_SIZE)
        .map(cell_to_string)
        .collect();

    let (min_value, max_value) = if data_type == DataKind::Numeric {
        (
            stats.numeric_min_max.0.map(format_number),
            stats.numeric_min_max.1.map(format_number),
        )
    } else {
        stats.text_min_max.clone()
    };

    let filled = values.len() - stats.null_count;
    ColumnProfile {
        name: name.to_string(),
        data_type,
        bucket,
        sample_values,
        null_count: stats.null_count,
        unique_count: stats.seen.len(),
        min_value,
        max_value,
        has_duplicates: stats.seen.len() < filled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<Data> {
        values.iter().map(|s| Data::String(s.to_string())).collect()
    }

    #[test]
    fn test_detect_column_type() {
        let nums = vec![Data::Int(1), Data::Float(2.5), Data::Empty, Data::Int(3)];
        assert_eq!(detect_column_type(&nums), DataKind::Numeric);
        assert_eq!(detect_column_type(&strings(&["2024-01-01", "2024-02-01"])), DataKind::Date);
        assert_eq!(detect_column_type(&[Data::Bool(true), Data::Bool(false)]), DataKind::Boolean);
        assert_eq!(detect_column_type(&[Data::Empty, Data::Empty]), DataKind::Empty);
        assert_eq!(detect_column_type(&strings(&["a", "b"])), DataKind::String);
    }

    #[test]
    fn test_id_column_by_name() {
        let values = vec![Data::Int(1), Data::Int(2), Data::Int(3)];
        assert_eq!(classify_column("order_id", &values).bucket, ColumnBucket::Id);
        assert_eq!(classify_column("customerId", &values).bucket, ColumnBucket::Id);
        assert_eq!(classify_column("编号", &values).bucket, ColumnBucket::Id);
        assert_eq!(classify_column("key", &strings(&["a1x", "b2y", "c3z", "d4w"])).bucket, ColumnBucket::Id);
        assert!(!looks_like_id_name("monkey"));
        assert!(!looks_like_id_name("Paid Amount"));
        assert!(!looks_like_id_name("Video"));
    }

    #[test]
    fn test_id_column_by_uuid_values() {
        let values = strings(&[
            "123e4567-e89b-12d3-a456-426614174000",
            "123e4567-e89b-12d3-a456-426614174001",
        ]);
        assert_eq!(classify_column("ref_value", &values).bucket, ColumnBucket::Id);
        assert_eq!(classify_column("token", &values).bucket, ColumnBucket::Id);
    }

    #[test]
    fn test_time_columns() {
        let dates = strings(&["2024-01-01", "2024-01-02", "2024-01-03"]);
        assert_eq!(classify_column("when", &dates).bucket, ColumnBucket::Time);

        let years = vec![Data::Int(2021), Data::Int(2022), Data::Int(2023)];
        assert_eq!(classify_column("Year", &years).bucket, ColumnBucket::Time);

        let totals = vec![Data::Float(1520.5), Data::Float(980.0)];
        assert_eq!(classify_column("month_total", &totals).bucket, ColumnBucket::Numeric);

        let epochs = vec![Data::Int(1_700_000_000), Data::Int(1_700_086_400), Data::Int(1_700_172_800)];
        assert_eq!(classify_column("timestamp", &epochs).bucket, ColumnBucket::Time);
        assert_eq!(classify_column("created", &epochs).bucket, ColumnBucket::Time);
    }

    #[test]
    fn test_repeated_long_labels_are_categories() {
        let mut labels = Vec::new();
        for _ in 0..3 {
            labels.push("Awaiting customer confirmation");
            labels.push("Shipped to the regional warehouse");
        }
        let profile = classify_column("status", &strings(&labels));
        assert_eq!(profile.unique_count, 2);
        assert_eq!(profile.bucket, ColumnBucket::Category);
    }

    #[test]
    fn test_bucket_rule_order() {
        let ints = vec![Data::Int(3), Data::Int(1_700_000_000), Data::Int(42), Data::Int(7)];
        let dates = strings(&["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"]);
        let short_labels = strings(&["a", "b", "a", "b", "a", "b"]);
        let long_labels = strings(&[
            "Awaiting customer confirmation",
            "Awaiting customer confirmation",
            "Shipped to the regional warehouse",
            "Shipped to the regional warehouse",
        ]);
        let free_text = strings(&["x1", "y2", "z3", "w4"]);
        let blank = vec![Data::Empty];
        let uuids = strings(&[
            "123e4567-e89b-12d3-a456-426614174000",
            "123e4567-e89b-12d3-a456-426614174001",
        ]);

        let cases: Vec<(&str, &[Data], ColumnBucket)> = vec![
            // id wins over every later rule
            ("id", &ints[..], ColumnBucket::Id),
            ("order_id", &dates[..], ColumnBucket::Id),
            ("uuid", &short_labels[..], ColumnBucket::Id),
            ("key", &free_text[..], ColumnBucket::Id),
            ("code", &long_labels[..], ColumnBucket::Id),
            ("payload", &uuids[..], ColumnBucket::Id),
            // time wins over numeric, category and content
            ("shipped", &dates[..], ColumnBucket::Time),
            ("date", &ints[..], ColumnBucket::Time),
            ("time", &ints[..], ColumnBucket::Time),
            ("year", &ints[..], ColumnBucket::Time),
            ("month", &ints[..], ColumnBucket::Time),
            ("created", &ints[..], ColumnBucket::Time),
            ("timestamp", &short_labels[..], ColumnBucket::Time),
            ("日期", &ints[..], ColumnBucket::Time),
            ("时间", &free_text[..], ColumnBucket::Time),
            ("quarter_sales", &ints[..], ColumnBucket::Numeric),
            // numeric, then category before content
            ("amount", &ints[..], ColumnBucket::Numeric),
            ("segment", &short_labels[..], ColumnBucket::Category),
            ("status", &long_labels[..], ColumnBucket::Category),
            ("comment", &free_text[..], ColumnBucket::Content),
            ("blank", &blank[..], ColumnBucket::Other),
        ];

        for (name, values, expected) in cases {
            assert_eq!(classify_column(name, values).bucket, expected, "column {}", name);
        }
    }

    #[test]
    fn test_numeric_profile_uses_numeric_order() {
        let values = vec![Data::Int(9), Data::Int(10), Data::Int(100), Data::Int(9)];
        let profile = classify_column("amount", &values);
        assert_eq!(profile.bucket, ColumnBucket::Numeric);
        assert_eq!(profile.min_value.as_deref(), Some("9"));
        assert_eq!(profile.max_value.as_deref(), Some("100"));
        assert_eq!(profile.unique_count, 3);
        assert!(profile.has_duplicates);
    }

    #[test]
    fn test_category_content_and_other() {
        let regions = strings(&["North", "South", "North", "East", "South", "North"]);
        let profile = classify_column("region", &regions);
        assert_eq!(profile.bucket, ColumnBucket::Category);
        assert_eq!(profile.sample_values.as_slice(), ["North", "South", "North"]);

        let comments = strings(&[
            "The delivery arrived late but the product was fine",
            "Great support experience, would buy again",
        ]);
        assert_eq!(classify_column("feedback", &comments).bucket, ColumnBucket::Content);

        let flags = vec![Data::Bool(true), Data::Bool(false), Data::Bool(true)];
        assert_eq!(classify_column("active", &flags).bucket, ColumnBucket::Category);

        let empty = vec![Data::Empty, Data::Empty];
        let profile = classify_column("notes", &empty);
        assert_eq!(profile.bucket, ColumnBucket::Other);
        assert_eq!(profile.null_count, 2);
        assert_eq!(profile.data_type, DataKind::Empty);
    }
}
