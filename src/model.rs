// src/model.rs
//! Normalized record shapes shared by the adapters, the writer and the store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observation: (entity, timestamp, field) -> value.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub entity_name: String,
    pub timestamp: NaiveDateTime, // naive UTC wall time
    pub field_name: String,
    pub value: f64,
}

/// All records of a single (entity, field) pair produced by one sub-source fetch.
///
/// Records are kept sorted ascending by time; `new` does the sort so the
/// writer never has to. Non-finite values are dropped there too.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub entity: String,
    pub field: String,
    pub units: String,
    points: Vec<(NaiveDateTime, f64)>,
}

impl RecordBatch {
    pub fn new(
        entity: impl Into<String>,
        field: impl Into<String>,
        units: impl Into<String>,
        mut points: Vec<(NaiveDateTime, f64)>,
    ) -> Self {
        points.retain(|(_, v)| v.is_finite());
        // stable: equal timestamps keep upstream order
        points.sort_by_key(|(t, _)| *t);
        Self {
            entity: entity.into(),
            field: field.into(),
            units: units.into(),
            points,
        }
    }

    pub fn points(&self) -> &[(NaiveDateTime, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<(NaiveDateTime, f64)> {
        self.points.last().copied()
    }

    pub fn records(&self) -> impl Iterator<Item = NormalizedRecord> + '_ {
        self.points.iter().map(|(t, v)| NormalizedRecord {
            entity_name: self.entity.clone(),
            timestamp: *t,
            field_name: self.field.clone(),
            value: *v,
        })
    }

    /// Records strictly newer than `after` (all of them when `after` is None),
    /// in batch order.
    pub fn newer_than(&self, after: Option<NaiveDateTime>) -> Vec<(NaiveDateTime, f64)> {
        match after {
            None => self.points.clone(),
            Some(last) => self
                .points
                .iter()
                .filter(|(t, _)| *t > last)
                .copied()
                .collect(),
        }
    }
}

/// Persisted reading document. Sparse: only the fields one adapter produced.
///
/// Serialized flat, e.g. `{"name":"Site","time":"2024-01-01T00:10:00","rainfall":2.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub name: String,
    pub time: NaiveDateTime,
    #[serde(flatten)]
    pub fields: BTreeMap<String, f64>,
}

impl StoredReading {
    pub fn single(name: &str, time: NaiveDateTime, field: &str, value: f64) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), value);
        Self {
            name: name.to_string(),
            time,
            fields,
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

/// Latest known state of one field of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub units: String,
    pub last_updated: NaiveDateTime,
    pub last_value: f64,
}

/// Per-entity summary document: `{"name": ..., "<field>": FieldSummary, ...}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSummary {
    pub name: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldSummary>,
}

impl SensorSummary {
    pub fn field(&self, field: &str) -> Option<&FieldSummary> {
        self.fields.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn batch_is_sorted_on_construction() {
        let b = RecordBatch::new(
            "Site",
            "rainfall",
            "mm",
            vec![(at(0, 20), 4.0), (at(0, 5), 1.0), (at(0, 10), 2.0)],
        );
        let times: Vec<_> = b.points().iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![at(0, 5), at(0, 10), at(0, 20)]);
        assert_eq!(b.last(), Some((at(0, 20), 4.0)));
    }

    #[test]
    fn non_finite_points_are_dropped() {
        let b = RecordBatch::new(
            "S",
            "f",
            "u",
            vec![(at(0, 5), f64::NAN), (at(0, 10), 2.0), (at(0, 15), f64::INFINITY)],
        );
        assert_eq!(b.points(), &[(at(0, 10), 2.0)]);
    }

    #[test]
    fn newer_than_is_strict() {
        let b = RecordBatch::new("S", "f", "u", vec![(at(0, 5), 1.0), (at(0, 10), 2.0)]);
        assert!(b.newer_than(Some(at(0, 10))).is_empty());
        assert_eq!(b.newer_than(Some(at(0, 5))), vec![(at(0, 10), 2.0)]);
        assert_eq!(b.newer_than(None).len(), 2);
    }

    #[test]
    fn stored_reading_serializes_flat() {
        let r = StoredReading::single("Site", at(0, 10), "rainfall", 2.0);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["name"], "Site");
        assert_eq!(v["time"], "2024-01-01T00:10:00");
        assert_eq!(v["rainfall"], 2.0);

        let back: StoredReading = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn summary_nests_fields_under_their_name() {
        let mut s = SensorSummary {
            name: "Site".into(),
            ..Default::default()
        };
        s.fields.insert(
            "rainfall".into(),
            FieldSummary {
                units: "mm".into(),
                last_updated: at(0, 20),
                last_value: 4.0,
            },
        );
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["rainfall"]["units"], "mm");
        assert_eq!(v["rainfall"]["last_value"], 4.0);
    }
}
