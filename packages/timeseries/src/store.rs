//! In-memory time-series storage.
//!
//! Points are partitioned by `(tenant, patient, metric)` and kept
//! time-ordered, mirroring a hypertable partition on the time column.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One measured value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

type SeriesKey = (String, String, String);

/// Partitioned metric store.
pub struct TimeSeriesStore {
    series: RwLock<HashMap<SeriesKey, Vec<MetricPoint>>>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a point, keeping the partition time-ordered.
    pub fn insert(
        &self,
        tenant_id: &str,
        patient_id: &str,
        metric: &str,
        point: MetricPoint,
    ) {
        let key = (
            tenant_id.to_string(),
            patient_id.to_string(),
            metric.to_string(),
        );
        let mut series = self.series.write();
        let partition = series.entry(key).or_default();
        let position = partition
            .binary_search_by(|p| p.time.cmp(&point.time))
            .unwrap_or_else(|e| e);
        partition.insert(position, point);
    }

    /// Points within `[start, end]`, time-ascending.
    pub fn query(
        &self,
        tenant_id: &str,
        patient_id: &str,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<MetricPoint> {
        let key = (
            tenant_id.to_string(),
            patient_id.to_string(),
            metric.to_string(),
        );
        self.series
            .read()
            .get(&key)
            .map(|partition| {
                partition
                    .iter()
                    .filter(|p| p.time >= start && p.time <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent point for a metric.
    pub fn latest(&self, tenant_id: &str, patient_id: &str, metric: &str) -> Option<MetricPoint> {
        let key = (
            tenant_id.to_string(),
            patient_id.to_string(),
            metric.to_string(),
        );
        self.series.read().get(&key).and_then(|p| p.last().copied())
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_insert_keeps_order() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();
        for offset in [3i64, 1, 2] {
            store.insert(
                "t",
                "Patient/1",
                "heart_rate",
                MetricPoint {
                    time: now + Duration::hours(offset),
                    value: offset as f64,
                },
            );
        }

        let points = store.query("t", "Patient/1", "heart_rate", now, now + Duration::hours(4));
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_partitions_are_isolated() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();
        store.insert("tenant-a", "Patient/1", "spo2", MetricPoint { time: now, value: 97.0 });

        assert!(store
            .query("tenant-b", "Patient/1", "spo2", now - Duration::hours(1), now)
            .is_empty());
        assert!(store.latest("tenant-a", "Patient/1", "spo2").is_some());
        assert!(store.latest("tenant-a", "Patient/1", "heart_rate").is_none());
    }
}
