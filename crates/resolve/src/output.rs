//! Streaming writers for golden records, the review queue and training sets.

use std::collections::HashMap;
use std::io::Write;

use serde::Serialize;

use crate::error::ResolveError;
use crate::model::{CandidatePair, GoldenRecord, Record};

fn json_err(e: serde_json::Error) -> ResolveError {
    ResolveError::Io(e.to_string())
}

/// One golden record per line (JSON Lines).
pub struct GoldenRecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> GoldenRecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write(&mut self, record: &GoldenRecord) -> Result<(), ResolveError> {
        serde_json::to_writer(&mut self.inner, record).map_err(json_err)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a GoldenRecord>,
    ) -> Result<(), ResolveError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ResolveError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Records by id, so pair exports can show what was compared.
pub struct RecordLookup<'a> {
    by_id: HashMap<&'a str, &'a Record>,
}

impl<'a> RecordLookup<'a> {
    pub fn new(records: &'a [Record]) -> Self {
        Self {
            by_id: records.iter().map(|r| (r.id.as_str(), r)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&'a Record> {
        self.by_id.get(id).copied()
    }
}

/// A pair plus both sides' names, addresses and coordinates.
#[derive(Serialize)]
struct PairWithContext<'a> {
    #[serde(flatten)]
    pair: &'a CandidatePair,
    left_name: Option<&'a str>,
    right_name: Option<&'a str>,
    left_address: Option<&'a str>,
    right_address: Option<&'a str>,
    left_lat: Option<f64>,
    left_lon: Option<f64>,
    right_lat: Option<f64>,
    right_lon: Option<f64>,
}

impl<'a> PairWithContext<'a> {
    fn new(pair: &'a CandidatePair, records: &RecordLookup<'a>) -> Self {
        let left = records.get(&pair.left_id);
        let right = records.get(&pair.right_id);
        Self {
            pair,
            left_name: left.map(|r| r.name_norm.as_str()),
            right_name: right.map(|r| r.name_norm.as_str()),
            left_address: left.and_then(Record::address),
            right_address: right.and_then(Record::address),
            left_lat: left.and_then(|r| r.lat),
            left_lon: left.and_then(|r| r.lon),
            right_lat: right.and_then(|r| r.lat),
            right_lon: right.and_then(|r| r.lon),
        }
    }
}

fn coord_cell(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Review queue as CSV with an empty `label` column for the reviewer to
/// fill in; the file loads back as manual overrides.
pub fn write_review_csv<W: Write>(
    writer: W,
    pairs: &[CandidatePair],
    records: &RecordLookup<'_>,
) -> Result<(), ResolveError> {
    let mut out = csv::Writer::from_writer(writer);
    let io = |e: csv::Error| ResolveError::Io(e.to_string());
    out.write_record([
        "left_id",
        "right_id",
        "left_source",
        "right_source",
        "left_name",
        "right_name",
        "left_address",
        "right_address",
        "left_lat",
        "left_lon",
        "right_lat",
        "right_lon",
        "geo_distance_m",
        "name_score",
        "address_score",
        "label",
    ])
    .map_err(io)?;
    for pair in pairs {
        let row = PairWithContext::new(pair, records);
        let f = &pair.features;
        let distance = format!("{:.2}", f.geo_distance_m);
        let name = format!("{:.4}", f.name_score);
        let address = format!("{:.4}", f.address_score);
        let coords = [row.left_lat, row.left_lon, row.right_lat, row.right_lon].map(coord_cell);
        out.write_record([
            pair.left_id.as_str(),
            pair.right_id.as_str(),
            pair.left_source.as_str(),
            pair.right_source.as_str(),
            row.left_name.unwrap_or(""),
            row.right_name.unwrap_or(""),
            row.left_address.unwrap_or(""),
            row.right_address.unwrap_or(""),
            coords[0].as_str(),
            coords[1].as_str(),
            coords[2].as_str(),
            coords[3].as_str(),
            distance.as_str(),
            name.as_str(),
            address.as_str(),
            "",
        ])
        .map_err(io)?;
    }
    out.flush()?;
    Ok(())
}

/// Labeled pairs with record context as JSON Lines, one pair per line.
pub fn write_pairs_jsonl<W: Write>(
    mut writer: W,
    pairs: &[CandidatePair],
    records: &RecordLookup<'_>,
) -> Result<(), ResolveError> {
    for pair in pairs {
        serde_json::to_writer(&mut writer, &PairWithContext::new(pair, records))
            .map_err(json_err)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::ManualOverrides;
    use crate::model::{FeatureVector, GeoPoint, PairLabel, Provenance, SourceTag};

    fn golden(id: &str) -> GoldenRecord {
        GoldenRecord {
            golden_id: id.into(),
            primary_name: Some("joes pizza".into()),
            primary_address: None,
            coordinates: Some(GeoPoint::new(40.01005, -75.00995)),
            provenance: Provenance {
                name_reason: "priority:yelp".into(),
                address_reason: "none".into(),
                coords_reason: "median".into(),
            },
            member_ids: vec!["o1".into(), "y1".into()],
            cluster_size: 2,
            sources: vec![SourceTag::from("omf"), SourceTag::from("yelp")],
            source_count: 2,
            avg_match_confidence: Some(0.93),
        }
    }

    #[test]
    fn golden_records_one_per_line() {
        let mut writer = GoldenRecordWriter::new(Vec::new());
        writer.write_all([&golden("place_a"), &golden("place_b")]).unwrap();
        assert_eq!(writer.written(), 2);
        let bytes = writer.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["golden_id"], "place_a");
        assert_eq!(first["primary_address"], serde_json::Value::Null);
        assert_eq!(first["provenance"]["name_reason"], "priority:yelp");
        assert_eq!(first["source_count"], 2);
    }

    fn rec(id: &str, source: &str, name: &str, address: Option<&str>, lat: f64, lon: f64) -> Record {
        Record {
            id: id.into(),
            source: SourceTag::from(source),
            name_norm: name.into(),
            address_norm: address.map(String::from),
            lat: Some(lat),
            lon: Some(lon),
            category: String::new(),
            region: None,
        }
    }

    fn ambiguous_pair() -> CandidatePair {
        CandidatePair {
            left_id: "y1".into(),
            right_id: "o1".into(),
            left_source: SourceTag::from("yelp"),
            right_source: SourceTag::from("omf"),
            features: FeatureVector {
                geo_distance_m: 120.0,
                name_score: 0.7,
                address_score: 0.5,
            },
            label: PairLabel::Ambiguous,
            confidence: None,
        }
    }

    fn records() -> Vec<Record> {
        vec![
            rec("y1", "yelp", "joes pizza", None, 40.01, -75.01),
            rec("o1", "omf", "joes pizza llc", Some("12 n main street"), 40.0101, -75.0099),
        ]
    }

    #[test]
    fn review_csv_loads_back_as_overrides() {
        let records = records();
        let mut buf = Vec::new();
        write_review_csv(&mut buf, &[ambiguous_pair()], &RecordLookup::new(&records)).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        let row = reader.records().next().unwrap().unwrap();
        let cell = |name: &str| {
            let idx = headers.iter().position(|h| h == name).unwrap();
            row.get(idx).unwrap().to_string()
        };
        assert_eq!(cell("left_id"), "y1");
        assert_eq!(cell("left_name"), "joes pizza");
        assert_eq!(cell("right_name"), "joes pizza llc");
        assert_eq!(cell("left_address"), "");
        assert_eq!(cell("right_address"), "12 n main street");
        assert_eq!(cell("left_lat"), "40.01");
        assert_eq!(cell("right_lon"), "-75.0099");
        assert_eq!(cell("geo_distance_m"), "120.00");
        assert_eq!(cell("name_score"), "0.7000");
        assert_eq!(cell("label"), "");

        // unreviewed rows carry no label yet
        let overrides = ManualOverrides::from_csv(text.as_bytes()).unwrap();
        assert!(overrides.is_empty());
        assert_eq!(overrides.rejected_rows, 1);

        let reviewed = text.replace("0.5000,\n", "0.5000,1\n");
        let overrides = ManualOverrides::from_csv(reviewed.as_bytes()).unwrap();
        assert_eq!(overrides.get("y1", "o1"), Some(PairLabel::Positive));
    }

    #[test]
    fn training_pairs_carry_record_context() {
        let records = records();
        let mut buf = Vec::new();
        write_pairs_jsonl(&mut buf, &[ambiguous_pair()], &RecordLookup::new(&records)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["left_id"], "y1");
        assert_eq!(value["label"], serde_json::to_value(PairLabel::Ambiguous).unwrap());
        assert_eq!(value["features"]["name_score"], 0.7);
        assert_eq!(value["left_name"], "joes pizza");
        assert_eq!(value["right_address"], "12 n main street");
        assert_eq!(value["left_address"], serde_json::Value::Null);
        assert_eq!(value["right_lat"], 40.0101);

        // a pair whose record is unknown still writes, without context
        let mut buf = Vec::new();
        write_pairs_jsonl(&mut buf, &[ambiguous_pair()], &RecordLookup::new(&[])).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(String::from_utf8(buf).unwrap().trim_end()).unwrap();
        assert_eq!(value["left_name"], serde_json::Value::Null);
    }
}
