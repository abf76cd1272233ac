// elfwatch/src/metrics.rs
//
// Process counters exposed at GET /metrics in Prometheus text format.
//
//   elfwatch_requests_total                  Counter — HTTP requests served
//   elfwatch_profiles_total{level}           Counter — profiles built by risk level
//   elfwatch_not_found_total                 Counter — lookups with no behavior data
//   elfwatch_insight_total{outcome}          Counter — insight calls by outcome
//   elfwatch_reloads_total                   Counter — explicit table reloads
//   elfwatch_load_failures_total             Counter — per-request data load failures

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::records::{Analysis, RiskTier};

#[derive(Debug, Default)]
pub struct DashboardMetrics {
    pub requests:          AtomicU64,
    pub profiles_low:      AtomicU64,
    pub profiles_medium:   AtomicU64,
    pub profiles_high:     AtomicU64,
    pub profiles_critical: AtomicU64,
    pub not_found:         AtomicU64,
    pub insight_ok:        AtomicU64,
    pub insight_failed:    AtomicU64,
    pub reloads:           AtomicU64,
    pub load_failures:     AtomicU64,
}

impl DashboardMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis(&self, analysis: &Analysis) {
        match analysis {
            Analysis::NotFound(_) => { self.not_found.fetch_add(1, Ordering::Relaxed); }
            Analysis::Profile(p) => {
                match p.assessment.tier {
                    RiskTier::Critical => self.profiles_critical.fetch_add(1, Ordering::Relaxed),
                    RiskTier::High => self.profiles_high.fetch_add(1, Ordering::Relaxed),
                    RiskTier::Medium => self.profiles_medium.fetch_add(1, Ordering::Relaxed),
                    RiskTier::Low => self.profiles_low.fetch_add(1, Ordering::Relaxed),
                };
            }
        }
    }

    pub fn record_insight(&self, ok: bool) {
        if ok {
            self.insight_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.insight_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn prometheus_text(&self) -> String {
        let mut out = String::with_capacity(2048);

        macro_rules! counter {
            ($name:expr, $help:expr, $val:expr) => {
                out.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
                    $name, $help, $name, $name, $val
                ));
            };
        }

        counter!("elfwatch_requests_total", "HTTP requests served",
            self.requests.load(Ordering::Relaxed));

        out.push_str("# HELP elfwatch_profiles_total Profiles built by risk level\n");
        out.push_str("# TYPE elfwatch_profiles_total counter\n");
        for (level, v) in [
            ("critical", &self.profiles_critical),
            ("high",     &self.profiles_high),
            ("medium",   &self.profiles_medium),
            ("low",      &self.profiles_low),
        ] {
            out.push_str(&format!(
                "elfwatch_profiles_total{{level=\"{}\"}} {}\n", level, v.load(Ordering::Relaxed)
            ));
        }

        counter!("elfwatch_not_found_total", "Lookups with no behavior data",
            self.not_found.load(Ordering::Relaxed));

        out.push_str("# HELP elfwatch_insight_total Insight provider calls by outcome\n");
        out.push_str("# TYPE elfwatch_insight_total counter\n");
        out.push_str(&format!("elfwatch_insight_total{{outcome=\"ok\"}} {}\n",
            self.insight_ok.load(Ordering::Relaxed)));
        out.push_str(&format!("elfwatch_insight_total{{outcome=\"unavailable\"}} {}\n",
            self.insight_failed.load(Ordering::Relaxed)));

        counter!("elfwatch_reloads_total", "Explicit table reloads",
            self.reloads.load(Ordering::Relaxed));
        counter!("elfwatch_load_failures_total", "Per-request data load failures",
            self.load_failures.load(Ordering::Relaxed));

        out
    }
}
