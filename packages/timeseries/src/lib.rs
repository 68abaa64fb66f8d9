//! Aegis-Timeseries: Clinical Trend Engine
//!
//! Rolling analytics over vitals and labs:
//! - least-squares trend slope with direction classification
//! - per-metric threshold alerts (warning and critical bands)
//! - composite deterioration detection over the last 24 hours
//!
//! Storage is a hypertable-style in-memory store partitioned by
//! `(tenant, patient, metric)`; production deployments point the same
//! interface at a time-series database.

pub mod store;
pub mod trends;

pub use store::{MetricPoint, TimeSeriesStore};
pub use trends::{
    AlertSeverity, ClinicalAlert, TrendAnalyzer, TrendDirection, TrendResult,
};
