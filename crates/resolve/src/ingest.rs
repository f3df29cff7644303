//! Source adapters: map each source's own CSV columns or JSON fields onto
//! [`Record`] via its configured [`FieldMapping`].

use std::collections::HashMap;

use crate::config::{FieldMapping, SourceConfig, SourceFormat};
use crate::error::ResolveError;
use crate::model::{Record, SourceTag};

/// Per-source ingestion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub rows: usize,
    pub loaded: usize,
    pub skipped_no_id: usize,
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_text(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_coord(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Field values for one input row, already pulled out by name.
struct RawRow<'a> {
    id: Option<&'a str>,
    name: Option<&'a str>,
    lat: Option<&'a str>,
    lon: Option<&'a str>,
    address: Option<&'a str>,
    category: Option<&'a str>,
    region: Option<&'a str>,
}

fn build_record(tag: &SourceTag, source: &SourceConfig, row: RawRow<'_>) -> Option<Record> {
    let id = row.id.map(str::trim).filter(|s| !s.is_empty())?;
    let text = |value: Option<&str>| -> String {
        let value = value.unwrap_or("");
        if source.normalize {
            normalize_text(value)
        } else {
            value.trim().to_string()
        }
    };
    let address = text(row.address);
    let region = row.region.map(str::trim).filter(|s| !s.is_empty());

    Some(Record {
        id: format!("{}{id}", source.id_prefix.as_deref().unwrap_or("")),
        source: tag.clone(),
        name_norm: text(row.name),
        address_norm: (!address.is_empty()).then_some(address),
        lat: parse_coord(row.lat),
        lon: parse_coord(row.lon),
        category: row.category.unwrap_or("").trim().to_string(),
        region: region.map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Load CSV rows for one source. Every mapped column must exist in the header.
pub fn load_csv_records(
    tag: &SourceTag,
    csv_data: &str,
    source: &SourceConfig,
) -> Result<(Vec<Record>, IngestStats), ResolveError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ResolveError::Io(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let fields = &source.fields;
    let idx = |name: &str| -> Result<usize, ResolveError> {
        headers.iter().position(|h| h == name).ok_or_else(|| ResolveError::MissingField {
            source: tag.to_string(),
            field: name.into(),
        })
    };
    let optional_idx = |name: &Option<String>| -> Result<Option<usize>, ResolveError> {
        name.as_deref().map(idx).transpose()
    };

    let id_idx = idx(&fields.id)?;
    let name_idx = idx(&fields.name)?;
    let lat_idx = idx(&fields.lat)?;
    let lon_idx = idx(&fields.lon)?;
    let address_idx = optional_idx(&fields.address)?;
    let category_idx = optional_idx(&fields.category)?;
    let region_idx = optional_idx(&fields.region)?;

    let mut stats = IngestStats::default();
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row.map_err(|e| ResolveError::Io(format!("source '{tag}': {e}")))?;
        stats.rows += 1;
        let get = |i: Option<usize>| i.and_then(|i| row.get(i));
        let raw = RawRow {
            id: row.get(id_idx),
            name: row.get(name_idx),
            lat: row.get(lat_idx),
            lon: row.get(lon_idx),
            address: get(address_idx),
            category: get(category_idx),
            region: get(region_idx),
        };
        match build_record(tag, source, raw) {
            Some(record) => records.push(record),
            None => stats.skipped_no_id += 1,
        }
    }

    stats.loaded = records.len();
    Ok((records, stats))
}

// ---------------------------------------------------------------------------
// JSON Lines
// ---------------------------------------------------------------------------

fn json_text(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(json_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => None,
    }
}

/// Load one JSON object per line. Missing fields read as absent, not errors.
pub fn load_jsonl_records(
    tag: &SourceTag,
    data: &str,
    source: &SourceConfig,
) -> Result<(Vec<Record>, IngestStats), ResolveError> {
    let fields: &FieldMapping = &source.fields;
    let mut stats = IngestStats::default();
    let mut records = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        stats.rows += 1;
        let object: HashMap<String, serde_json::Value> = serde_json::from_str(line)
            .map_err(|e| ResolveError::Io(format!("source '{tag}' line {}: {e}", line_no + 1)))?;

        let text = |field: Option<&String>| -> Option<String> {
            field.and_then(|f| object.get(f.as_str())).and_then(json_text)
        };
        let id = text(Some(&fields.id));
        let name = text(Some(&fields.name));
        let lat = text(Some(&fields.lat));
        let lon = text(Some(&fields.lon));
        let address = text(fields.address.as_ref());
        let category = text(fields.category.as_ref());
        let region = text(fields.region.as_ref());

        let raw = RawRow {
            id: id.as_deref(),
            name: name.as_deref(),
            lat: lat.as_deref(),
            lon: lon.as_deref(),
            address: address.as_deref(),
            category: category.as_deref(),
            region: region.as_deref(),
        };
        match build_record(tag, source, raw) {
            Some(record) => records.push(record),
            None => stats.skipped_no_id += 1,
        }
    }

    stats.loaded = records.len();
    Ok((records, stats))
}

/// Dispatch on the configured format and log what was loaded.
pub fn load_source(
    tag: &SourceTag,
    data: &str,
    source: &SourceConfig,
) -> Result<Vec<Record>, ResolveError> {
    let (records, stats) = match source.format {
        SourceFormat::Csv => load_csv_records(tag, data, source)?,
        SourceFormat::Jsonl => load_jsonl_records(tag, data, source)?,
    };
    if stats.skipped_no_id > 0 {
        log::warn!("source '{tag}': skipped {} row(s) without an id", stats.skipped_no_id);
    }
    log::info!("source '{tag}': loaded {} of {} rows", stats.loaded, stats.rows);
    Ok(records)
}

/// Fail on the first id that appears twice across all sources.
pub fn check_unique_ids(records: &[Record]) -> Result<(), ResolveError> {
    let mut seen: HashMap<&str, &SourceTag> = HashMap::with_capacity(records.len());
    for record in records {
        if let Some(first) = seen.insert(&record.id, &record.source) {
            return Err(ResolveError::DuplicateId {
                id: record.id.clone(),
                first_source: first.to_string(),
                second_source: record.source.to_string(),
            });
        }
    }
    Ok(())
}
