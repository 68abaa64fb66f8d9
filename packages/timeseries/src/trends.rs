//! Trend analysis and clinical alerts.
//!
//! Slope is a least-squares fit over `(index, value)` pairs. Direction is
//! stable when the end-to-end percent change stays under 5%, otherwise the
//! slope sign decides. Deterioration is a composite: two or more adverse
//! vital trends (SpO2 falling, heart rate rising, respiratory rate rising)
//! inside the last 24 hours.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::TimeSeriesStore;

/// Percent change under which a series counts as stable.
const STABLE_BAND_PCT: f64 = 5.0;

/// Adverse trends required for a composite deterioration alert.
const DETERIORATION_THRESHOLD: usize = 2;

/// Trend direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Result of a trend fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub metric: String,
    pub direction: TrendDirection,
    pub slope: f64,
    pub start_value: f64,
    pub end_value: f64,
    pub percent_change: f64,
    pub data_points: usize,
}

/// A threshold or composite alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalAlert {
    pub patient_id: String,
    pub metric: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub current_value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-metric alert thresholds.
#[derive(Debug, Clone, Copy, Default)]
struct Thresholds {
    low: Option<f64>,
    high: Option<f64>,
    critical_low: Option<f64>,
    critical_high: Option<f64>,
}

fn thresholds_for(metric: &str) -> Option<Thresholds> {
    let t = |low: Option<f64>, high: Option<f64>, clow: Option<f64>, chigh: Option<f64>| {
        Some(Thresholds {
            low,
            high,
            critical_low: clow,
            critical_high: chigh,
        })
    };
    match metric {
        "heart_rate" => t(Some(50.0), Some(100.0), Some(40.0), Some(120.0)),
        "bp_systolic" => t(Some(90.0), Some(140.0), Some(80.0), Some(180.0)),
        "bp_diastolic" => t(Some(60.0), Some(90.0), Some(50.0), Some(120.0)),
        "spo2" => t(Some(92.0), None, Some(88.0), None),
        "temperature" => t(Some(36.0), Some(38.0), None, Some(39.5)),
        "respiratory_rate" => t(Some(12.0), Some(20.0), None, Some(30.0)),
        "creatinine" => t(None, Some(1.2), None, Some(4.0)),
        "potassium" => t(Some(3.5), Some(5.0), Some(3.0), Some(6.0)),
        "glucose" => t(Some(70.0), Some(200.0), Some(50.0), Some(400.0)),
        "hemoglobin" => t(Some(12.0), None, Some(7.0), None),
        _ => None,
    }
}

/// Trend analyzer over a metric store.
pub struct TrendAnalyzer<'a> {
    store: &'a TimeSeriesStore,
}

impl<'a> TrendAnalyzer<'a> {
    pub fn new(store: &'a TimeSeriesStore) -> Self {
        Self { store }
    }

    /// Fit a trend over `[start, end]`. Needs at least two points.
    pub fn analyze_trend(
        &self,
        tenant_id: &str,
        patient_id: &str,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<TrendResult> {
        let points = self.store.query(tenant_id, patient_id, metric, start, end);
        if points.len() < 2 {
            return None;
        }

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let slope = least_squares_slope(&values);
        let start_value = values[0];
        let end_value = values[values.len() - 1];
        let percent_change = if start_value != 0.0 {
            (end_value - start_value) / start_value * 100.0
        } else {
            0.0
        };

        let direction = if percent_change.abs() < STABLE_BAND_PCT {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        Some(TrendResult {
            metric: metric.to_string(),
            direction,
            slope,
            start_value,
            end_value,
            percent_change,
            data_points: values.len(),
        })
    }

    /// Threshold alerts for a single reading.
    pub fn check_alerts(&self, patient_id: &str, metric: &str, value: f64) -> Vec<ClinicalAlert> {
        let Some(thresholds) = thresholds_for(metric) else {
            return Vec::new();
        };
        let now = Utc::now();
        let alert = |severity: AlertSeverity, message: String, threshold: f64| ClinicalAlert {
            patient_id: patient_id.to_string(),
            metric: metric.to_string(),
            severity,
            message,
            current_value: value,
            threshold,
            timestamp: now,
        };

        if let Some(critical_high) = thresholds.critical_high {
            if value >= critical_high {
                return vec![alert(
                    AlertSeverity::Critical,
                    format!("CRITICAL: {metric} is critically high at {value}"),
                    critical_high,
                )];
            }
        }
        if let Some(critical_low) = thresholds.critical_low {
            if value <= critical_low {
                return vec![alert(
                    AlertSeverity::Critical,
                    format!("CRITICAL: {metric} is critically low at {value}"),
                    critical_low,
                )];
            }
        }
        if let Some(high) = thresholds.high {
            if value >= high {
                return vec![alert(
                    AlertSeverity::Warning,
                    format!("WARNING: {metric} is elevated at {value}"),
                    high,
                )];
            }
        }
        if let Some(low) = thresholds.low {
            if value <= low {
                return vec![alert(
                    AlertSeverity::Warning,
                    format!("WARNING: {metric} is low at {value}"),
                    low,
                )];
            }
        }
        Vec::new()
    }

    /// Composite deterioration detection over the trailing window.
    pub fn detect_deterioration(
        &self,
        tenant_id: &str,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<ClinicalAlert> {
        let start = now - Duration::hours(24);
        let mut adverse = 0usize;

        let checks: [(&str, TrendDirection); 3] = [
            ("spo2", TrendDirection::Decreasing),
            ("heart_rate", TrendDirection::Increasing),
            ("respiratory_rate", TrendDirection::Increasing),
        ];
        for (metric, adverse_direction) in checks {
            if let Some(trend) = self.analyze_trend(tenant_id, patient_id, metric, start, now) {
                if trend.direction == adverse_direction {
                    adverse += 1;
                }
            }
        }

        if adverse >= DETERIORATION_THRESHOLD {
            tracing::warn!(
                patient_id = %patient_id,
                adverse_trends = adverse,
                "Possible clinical deterioration"
            );
            vec![ClinicalAlert {
                patient_id: patient_id.to_string(),
                metric: "composite".to_string(),
                severity: AlertSeverity::Warning,
                message: format!(
                    "Possible clinical deterioration: {adverse} vital signs trending adversely"
                ),
                current_value: adverse as f64,
                threshold: DETERIORATION_THRESHOLD as f64,
                timestamp: now,
            }]
        } else {
            Vec::new()
        }
    }
}

/// Least-squares slope over `(index, value)`.
fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let numerator: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64 - x_mean) * (v - y_mean))
        .sum();
    let denominator: f64 = (0..values.len())
        .map(|i| (i as f64 - x_mean).powi(2))
        .sum();

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MetricPoint;

    fn seed(store: &TimeSeriesStore, metric: &str, values: &[f64], now: DateTime<Utc>) {
        let n = values.len() as i64;
        for (i, value) in values.iter().enumerate() {
            store.insert(
                "t",
                "Patient/1",
                metric,
                MetricPoint {
                    time: now - Duration::hours(n - i as i64),
                    value: *value,
                },
            );
        }
    }

    #[test]
    fn test_increasing_trend() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();
        seed(&store, "heart_rate", &[70.0, 78.0, 85.0, 95.0], now);

        let trend = TrendAnalyzer::new(&store)
            .analyze_trend("t", "Patient/1", "heart_rate", now - Duration::hours(24), now)
            .unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.slope > 0.0);
        assert_eq!(trend.data_points, 4);
    }

    #[test]
    fn test_stable_band() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();
        seed(&store, "heart_rate", &[70.0, 71.0, 70.5, 72.0], now);

        let trend = TrendAnalyzer::new(&store)
            .analyze_trend("t", "Patient/1", "heart_rate", now - Duration::hours(24), now)
            .unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_threshold_alerts() {
        let store = TimeSeriesStore::new();
        let analyzer = TrendAnalyzer::new(&store);

        let critical = analyzer.check_alerts("Patient/1", "heart_rate", 130.0);
        assert_eq!(critical[0].severity, AlertSeverity::Critical);

        let warning = analyzer.check_alerts("Patient/1", "spo2", 91.0);
        assert_eq!(warning[0].severity, AlertSeverity::Warning);

        assert!(analyzer.check_alerts("Patient/1", "heart_rate", 75.0).is_empty());
        assert!(analyzer.check_alerts("Patient/1", "shoe_size", 12.0).is_empty());
    }

    #[test]
    fn test_deterioration_composite() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();
        // SpO2 falling and heart rate rising inside 24h
        seed(&store, "spo2", &[97.0, 95.0, 93.0, 90.0], now);
        seed(&store, "heart_rate", &[72.0, 80.0, 92.0, 104.0], now);
        seed(&store, "respiratory_rate", &[16.0, 16.0, 16.2, 16.1], now);

        let alerts = TrendAnalyzer::new(&store).detect_deterioration("t", "Patient/1", now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[0].metric, "composite");
        assert_eq!(alerts[0].current_value, 2.0);
    }

    #[test]
    fn test_single_adverse_trend_is_quiet() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();
        seed(&store, "spo2", &[97.0, 95.0, 93.0, 90.0], now);

        assert!(TrendAnalyzer::new(&store)
            .detect_deterioration("t", "Patient/1", now)
            .is_empty());
    }

    #[test]
    fn test_slope_fit() {
        assert!((least_squares_slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-9);
        assert!(least_squares_slope(&[5.0, 5.0, 5.0]).abs() < 1e-9);
        assert!(least_squares_slope(&[4.0, 3.0, 2.0]) < 0.0);
    }
}
