//! Normalizes uploaded CSVs and Google Sheets rows into canonical fact
//! records.
//!
//! Every ingestion path produces the same record shape so the context
//! builder and enrichment prompt never care where the data came from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::sheets::SheetPersona;

/// One canonical audience data point
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawRecord {
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Source")]
    pub source: String,
}

/// Sheet columns that each become a category of preference records
const SHEET_CATEGORIES: [(&str, fn(&SheetPersona) -> &Vec<String>); 10] = [
    ("Online Topics", |p| &p.online_topics),
    ("Social Media", |p| &p.social_media),
    ("Media Preferences", |p| &p.media_preferences),
    ("Influencers", |p| &p.influencers),
    ("Brand Preferences", |p| &p.brand_preferences),
    ("Job Titles", |p| &p.job_titles),
    ("Locations", |p| &p.locations),
    ("Bio Keywords", |p| &p.bio_keywords),
    ("YouTube Channels", |p| &p.youtube_channels),
    ("Insights", |p| &p.insights),
];

/// Parse CSV text into header-keyed row maps. The first line is the header
/// row; each later non-blank line becomes one map, with missing trailing
/// fields defaulting to empty strings.
pub fn parse_csv_rows(text: &str) -> Vec<HashMap<String, String>> {
    let mut lines = text.lines();
    let headers: Vec<String> = match lines.next() {
        Some(line) => line.split(',').map(|h| h.trim().to_string()).collect(),
        None => return Vec::new(),
    };

    lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let values: Vec<&str> = line.split(',').collect();
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = values.get(i).map(|v| v.trim()).unwrap_or("");
                    (header.clone(), value.to_string())
                })
                .collect()
        })
        .collect()
}

/// Normalize CSV text into canonical records, one per data row.
///
/// Rows carrying the canonical Category/Type/Value/Source headers map
/// field-for-field (header match is case-insensitive). Anything else is
/// preserved wholesale: the row's pairs are joined into the Value field and
/// the uploaded file name becomes the Source.
pub fn normalize_csv(text: &str, file_name: &str) -> Vec<RawRecord> {
    parse_csv_rows(text)
        .into_iter()
        .map(|row| canonicalize_row(&row, file_name))
        .collect()
}

fn canonicalize_row(row: &HashMap<String, String>, file_name: &str) -> RawRecord {
    let field = |name: &str| -> Option<String> {
        row.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };

    let category = field("Category");
    let record_type = field("Type");
    let value = field("Value");
    let source = field("Source");

    if let Some(value) = value {
        return RawRecord {
            category: category.unwrap_or_else(|| "Other".to_string()),
            record_type: record_type.unwrap_or_else(|| "CSV Row".to_string()),
            value,
            source: source.unwrap_or_else(|| file_name.to_string()),
        };
    }

    // No recognizable Value column: keep the whole row as one record
    let mut pairs: Vec<String> = row
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    pairs.sort();

    RawRecord {
        category: category.unwrap_or_else(|| "Other".to_string()),
        record_type: record_type.unwrap_or_else(|| "CSV Row".to_string()),
        value: pairs.join("; "),
        source: source.unwrap_or_else(|| file_name.to_string()),
    }
}

/// Convert a sheet persona into canonical records: two demographics records
/// first, then one preference record per item across the tracked categories.
pub fn sheet_to_records(persona: &SheetPersona) -> Vec<RawRecord> {
    let mut records = vec![
        RawRecord {
            category: "Demographics".to_string(),
            record_type: "Gender Split".to_string(),
            value: persona.gender_split.clone(),
            source: "Google Sheets".to_string(),
        },
        RawRecord {
            category: "Demographics".to_string(),
            record_type: "Device Preference".to_string(),
            value: persona.device_preference.clone(),
            source: "Google Sheets".to_string(),
        },
    ];

    for (label, accessor) in SHEET_CATEGORIES {
        for item in accessor(persona) {
            records.push(RawRecord {
                category: label.to_string(),
                record_type: "Preference".to_string(),
                value: item.clone(),
                source: "Google Sheets".to_string(),
            });
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::SheetsClient;

    #[test]
    fn test_parse_csv_rows_one_map_per_data_line() {
        let csv = "Category,Type,Value,Source\n\
                   Social Media,Preference,Instagram,survey\n\
                   \n\
                   Brand Preferences,Preference,Nike";
        let rows = parse_csv_rows(csv);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Value"], "Instagram");
        // missing trailing field defaults to empty
        assert_eq!(rows[1]["Source"], "");
    }

    #[test]
    fn test_normalize_csv_produces_one_record_per_row() {
        let csv = "Category,Type,Value,Source\n\
                   Social Media,Preference,Instagram,survey\n\
                   Media Preferences,Preference,Guardian,survey\n\
                   Locations,Preference,London,survey";
        let records = normalize_csv(csv, "audience.csv");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].category, "Media Preferences");
        assert_eq!(records[1].value, "Guardian");
    }

    #[test]
    fn test_normalize_csv_case_insensitive_headers() {
        let csv = "category,type,value,source\nInsights,Preference,Early adopters,panel";
        let records = normalize_csv(csv, "audience.csv");
        assert_eq!(records[0].category, "Insights");
        assert_eq!(records[0].source, "panel");
    }

    #[test]
    fn test_normalize_csv_unrecognized_headers_fall_back() {
        let csv = "Topic,Score\nSustainability,9";
        let records = normalize_csv(csv, "scores.csv");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "Other");
        assert_eq!(records[0].record_type, "CSV Row");
        assert!(records[0].value.contains("Topic: Sustainability"));
        assert!(records[0].value.contains("Score: 9"));
        assert_eq!(records[0].source, "scores.csv");
    }

    #[test]
    fn test_normalize_csv_missing_value_defaults_source_to_file() {
        let csv = "Category,Type,Value\nSocial Media,Preference,TikTok";
        let records = normalize_csv(csv, "upload.csv");
        assert_eq!(records[0].source, "upload.csv");
    }

    #[test]
    fn test_empty_csv_yields_no_records() {
        assert!(normalize_csv("", "empty.csv").is_empty());
        assert!(normalize_csv("Category,Type,Value,Source\n", "empty.csv").is_empty());
    }

    #[test]
    fn test_sheet_records_count_and_shape() {
        let persona = SheetsClient::mock_data();
        let records = sheet_to_records(&persona);

        let item_count: usize = SHEET_CATEGORIES
            .iter()
            .map(|(_, accessor)| accessor(&persona).len())
            .sum();
        assert_eq!(records.len(), 2 + item_count);

        assert_eq!(records[0].category, "Demographics");
        assert_eq!(records[0].record_type, "Gender Split");
        assert_eq!(records[1].record_type, "Device Preference");
        assert!(records[2..]
            .iter()
            .all(|r| r.record_type == "Preference" && r.source == "Google Sheets"));
    }

    #[test]
    fn test_record_serializes_with_canonical_keys() {
        let record = RawRecord {
            category: "Social Media".to_string(),
            record_type: "Preference".to_string(),
            value: "Instagram".to_string(),
            source: "Google Sheets".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Category"], "Social Media");
        assert_eq!(json["Type"], "Preference");
        assert_eq!(json["Value"], "Instagram");
        assert_eq!(json["Source"], "Google Sheets");
    }
}
