//! # Metrics Exporter (C6)
//!
//! A process-global registry of counters, histograms and gauges, rendered
//! on demand as Prometheus text exposition format. Every metric name and
//! label schema here is part of the external contract (§4.6) and must
//! match exactly — dashboards are built against these literal names.
//!
//! Label cardinality is bounded by the static set of backends, intents
//! and error kinds, so plain concurrent maps (no eviction) are safe for
//! the lifetime of the process, matching the "process-wide singleton"
//! design note in §9.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

const LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];
const CLASSIFICATION_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Confidence bucket label used by `intent_classification_total` (§4.5
/// step 2): high if confidence >= 0.7, medium if >= 0.4, else low.
pub fn confidence_bucket(confidence: f64) -> &'static str {
    if confidence >= 0.7 {
        "high"
    } else if confidence >= 0.4 {
        "medium"
    } else {
        "low"
    }
}

struct Histogram {
    bucket_bounds: &'static [f64],
    bucket_counts: Vec<AtomicU64>,
    sum: Mutex<f64>,
    count: AtomicU64,
}

impl Histogram {
    fn new(bucket_bounds: &'static [f64]) -> Self {
        Self {
            bucket_bounds,
            bucket_counts: (0..bucket_bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            sum: Mutex::new(0.0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value: f64) {
        for (i, bound) in self.bucket_bounds.iter().enumerate() {
            if value <= *bound {
                self.bucket_counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.sum.lock().expect("histogram sum lock poisoned") += value;
    }

    fn render(&self, name: &str, labels: &str, out: &mut String) {
        for (i, bound) in self.bucket_bounds.iter().enumerate() {
            let le_labels = merge_label(labels, "le", &bound.to_string());
            out.push_str(&format!(
                "{name}_bucket{le_labels} {}\n",
                self.bucket_counts[i].load(Ordering::Relaxed)
            ));
        }
        let inf_labels = merge_label(labels, "le", "+Inf");
        out.push_str(&format!(
            "{name}_bucket{inf_labels} {}\n",
            self.count.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "{name}_sum{labels} {}\n",
            *self.sum.lock().expect("histogram sum lock poisoned")
        ));
        out.push_str(&format!("{name}_count{labels} {}\n", self.count.load(Ordering::Relaxed)));
    }
}

fn merge_label(existing: &str, key: &str, value: &str) -> String {
    if existing.is_empty() {
        format!("{{{key}=\"{value}\"}}")
    } else {
        // existing looks like {a="b",c="d"}; splice the new label in before the closing brace.
        let trimmed = &existing[..existing.len() - 1];
        format!("{trimmed},{key}=\"{value}\"}}")
    }
}

fn render_labels(pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let body = pairs
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{body}}}")
}

/// The metrics surface described in §4.6, one field per metric family.
pub struct MetricsRegistry {
    requests_total: DashMap<(String, String, String), AtomicU64>,
    model_requests_total: DashMap<String, AtomicU64>,
    fallback_requests_total: DashMap<(String, String), AtomicU64>,
    model_fallbacks_total: DashMap<(String, String), AtomicU64>,
    errors_total: DashMap<(String, String), AtomicU64>,
    latency_seconds: DashMap<(String, String), Histogram>,
    classification_latency_seconds: Histogram,
    intent_classification_total: DashMap<(String, String), AtomicU64>,
    model_health: DashMap<String, Mutex<f64>>,
    fallback_rate: DashMap<String, Mutex<f64>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self {
            requests_total: DashMap::new(),
            model_requests_total: DashMap::new(),
            fallback_requests_total: DashMap::new(),
            model_fallbacks_total: DashMap::new(),
            errors_total: DashMap::new(),
            latency_seconds: DashMap::new(),
            classification_latency_seconds: Histogram::new(CLASSIFICATION_LATENCY_BUCKETS),
            intent_classification_total: DashMap::new(),
            model_health: DashMap::new(),
            fallback_rate: DashMap::new(),
        }
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, model: &str, intent: &str, status: &str) {
        self.requests_total
            .entry((model.to_string(), intent.to_string(), status.to_string()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_request(&self, model: &str) {
        self.model_requests_total
            .entry(model.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_request(&self, from_model: &str, to_model: &str) {
        self.fallback_requests_total
            .entry((from_model.to_string(), to_model.to_string()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_fallback(&self, model: &str, role: &str) {
        self.model_fallbacks_total
            .entry((model.to_string(), role.to_string()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, model: &str, error_type: &str) {
        self.errors_total
            .entry((model.to_string(), error_type.to_string()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, model: &str, intent: &str, seconds: f64) {
        self.latency_seconds
            .entry((model.to_string(), intent.to_string()))
            .or_insert_with(|| Histogram::new(LATENCY_BUCKETS))
            .observe(seconds);
    }

    pub fn observe_classification_latency(&self, seconds: f64) {
        self.classification_latency_seconds.observe(seconds);
    }

    pub fn record_intent_classification(&self, intent: &str, confidence: f64) {
        let bucket = confidence_bucket(confidence);
        self.intent_classification_total
            .entry((intent.to_string(), bucket.to_string()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_model_health(&self, model: &str, healthy: bool) {
        let value = if healthy { 1.0 } else { 0.0 };
        self.model_health
            .entry(model.to_string())
            .or_insert_with(|| Mutex::new(value))
            .lock()
            .map(|mut guard| *guard = value)
            .ok();
    }

    pub fn set_fallback_rate(&self, model: &str, rate: f64) {
        self.fallback_rate
            .entry(model.to_string())
            .or_insert_with(|| Mutex::new(rate))
            .lock()
            .map(|mut guard| *guard = rate)
            .ok();
    }

    pub fn fallback_rate(&self, model: &str) -> Option<f64> {
        self.fallback_rate.get(model).map(|guard| *guard.lock().expect("fallback_rate lock poisoned"))
    }

    /// Render the full registry as Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        for entry in self.requests_total.iter() {
            let (model, intent, status) = entry.key();
            let labels = render_labels(&[("model", model), ("intent", intent), ("status", status)]);
            out.push_str(&format!("requests_total{labels} {}\n", entry.value().load(Ordering::Relaxed)));
        }

        for entry in self.model_requests_total.iter() {
            let labels = render_labels(&[("model", entry.key())]);
            out.push_str(&format!(
                "model_requests_total{labels} {}\n",
                entry.value().load(Ordering::Relaxed)
            ));
        }

        for entry in self.fallback_requests_total.iter() {
            let (from_model, to_model) = entry.key();
            let labels = render_labels(&[("from_model", from_model), ("to_model", to_model)]);
            out.push_str(&format!(
                "fallback_requests_total{labels} {}\n",
                entry.value().load(Ordering::Relaxed)
            ));
        }

        for entry in self.model_fallbacks_total.iter() {
            let (model, role) = entry.key();
            let labels = render_labels(&[("model", model), ("role", role)]);
            out.push_str(&format!(
                "model_fallbacks_total{labels} {}\n",
                entry.value().load(Ordering::Relaxed)
            ));
        }

        for entry in self.errors_total.iter() {
            let (model, error_type) = entry.key();
            let labels = render_labels(&[("model", model), ("error_type", error_type)]);
            out.push_str(&format!(
                "errors_total{labels} {}\n",
                entry.value().load(Ordering::Relaxed)
            ));
        }

        for entry in self.latency_seconds.iter() {
            let (model, intent) = entry.key();
            let labels = render_labels(&[("model", model), ("intent", intent)]);
            entry.value().render("latency_seconds", &labels, &mut out);
        }

        self.classification_latency_seconds
            .render("classification_latency_seconds", "", &mut out);

        for entry in self.intent_classification_total.iter() {
            let (intent, confidence) = entry.key();
            let labels = render_labels(&[("intent", intent), ("confidence", confidence)]);
            out.push_str(&format!(
                "intent_classification_total{labels} {}\n",
                entry.value().load(Ordering::Relaxed)
            ));
        }

        for entry in self.model_health.iter() {
            let labels = render_labels(&[("model", entry.key())]);
            let value = *entry.value().lock().expect("model_health lock poisoned");
            out.push_str(&format!("model_health{labels} {value}\n"));
        }

        for entry in self.fallback_rate.iter() {
            let labels = render_labels(&[("model", entry.key())]);
            let value = *entry.value().lock().expect("fallback_rate lock poisoned");
            out.push_str(&format!("fallback_rate{labels} {value}\n"));
        }

        out
    }
}

static GLOBAL: OnceLock<MetricsRegistry> = OnceLock::new();

/// The process-global metrics registry every component writes through.
pub fn global() -> &'static MetricsRegistry {
    GLOBAL.get_or_init(MetricsRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_bucket_thresholds() {
        assert_eq!(confidence_bucket(0.9), "high");
        assert_eq!(confidence_bucket(0.7), "high");
        assert_eq!(confidence_bucket(0.5), "medium");
        assert_eq!(confidence_bucket(0.4), "medium");
        assert_eq!(confidence_bucket(0.1), "low");
    }

    #[test]
    fn counters_accumulate_per_label_combination() {
        let registry = MetricsRegistry::new();
        registry.record_request("a", "code", "success");
        registry.record_request("a", "code", "success");
        registry.record_request("a", "code", "failed");
        let rendered = registry.render();
        assert!(rendered.contains("requests_total{model=\"a\",intent=\"code\",status=\"success\"} 2"));
        assert!(rendered.contains("requests_total{model=\"a\",intent=\"code\",status=\"failed\"} 1"));
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let registry = MetricsRegistry::new();
        registry.observe_latency("a", "code", 0.05);
        registry.observe_latency("a", "code", 4.0);
        let rendered = registry.render();
        assert!(rendered.contains("latency_seconds_bucket{model=\"a\",intent=\"code\",le=\"0.1\"} 1"));
        assert!(rendered.contains("latency_seconds_bucket{model=\"a\",intent=\"code\",le=\"5\"} 2"));
        assert!(rendered.contains("latency_seconds_count{model=\"a\",intent=\"code\"} 2"));
    }

    #[test]
    fn gauges_overwrite_rather_than_accumulate() {
        let registry = MetricsRegistry::new();
        registry.set_model_health("a", true);
        registry.set_model_health("a", false);
        let rendered = registry.render();
        assert!(rendered.contains("model_health{model=\"a\"} 0"));
        assert!(!rendered.contains("model_health{model=\"a\"} 1"));
    }
}
