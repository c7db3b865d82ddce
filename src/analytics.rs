// src/analytics.rs
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEvent {
    ScanStarted,
    ScanCompleted,
    ErrorOccurred,
    EmergencyCareAdvised,
    CacheHit,
    OfflineFallback,
}

impl AnalyticsEvent {
    pub const ALL: [AnalyticsEvent; 6] = [
        AnalyticsEvent::ScanStarted,
        AnalyticsEvent::ScanCompleted,
        AnalyticsEvent::ErrorOccurred,
        AnalyticsEvent::EmergencyCareAdvised,
        AnalyticsEvent::CacheHit,
        AnalyticsEvent::OfflineFallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsEvent::ScanStarted => "scan_started",
            AnalyticsEvent::ScanCompleted => "scan_completed",
            AnalyticsEvent::ErrorOccurred => "error_occurred",
            AnalyticsEvent::EmergencyCareAdvised => "emergency_care_advised",
            AnalyticsEvent::CacheHit => "cache_hit",
            AnalyticsEvent::OfflineFallback => "offline_fallback",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: AnalyticsEvent, metadata: &[(&str, String)]);
}

/// Metadata keys that identify a person or place and never leave the process.
const REDACTED_KEYS: &[&str] = &[
    "user_id",
    "userId",
    "email",
    "location",
    "location_string",
    "locationString",
    "coordinates",
];

pub fn redact<'a>(metadata: &'a [(&'a str, String)]) -> Vec<(&'a str, &'a str)> {
    metadata
        .iter()
        .filter(|(key, _)| !REDACTED_KEYS.contains(key))
        .map(|(key, value)| (*key, value.as_str()))
        .collect()
}

#[derive(Debug, Default)]
pub struct EventCounters {
    counts: [AtomicU64; 6],
}

impl EventCounters {
    pub fn increment(&self, event: AnalyticsEvent) {
        self.counts[event.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, event: AnalyticsEvent) -> u64 {
        self.counts[event.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        AnalyticsEvent::ALL
            .iter()
            .map(|event| (event.as_str(), self.get(*event)))
            .collect()
    }
}

/// Counts events and writes them to the log with identifying metadata removed.
#[derive(Debug, Default)]
pub struct LogAnalytics {
    counters: EventCounters,
}

impl LogAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &EventCounters {
        &self.counters
    }
}

impl AnalyticsSink for LogAnalytics {
    fn record(&self, event: AnalyticsEvent, metadata: &[(&str, String)]) {
        self.counters.increment(event);
        let safe = redact(metadata)
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!("analytics event: {} {}", event.as_str(), safe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_drops_identifying_keys() {
        let metadata = vec![
            ("user_id", "u-123".to_string()),
            ("danger_level", "7".to_string()),
            ("location", "Austin, TX".to_string()),
        ];
        assert_eq!(redact(&metadata), vec![("danger_level", "7")]);
    }

    #[test]
    fn log_analytics_counts_per_event() {
        let analytics = LogAnalytics::new();
        analytics.record(AnalyticsEvent::ScanStarted, &[]);
        analytics.record(AnalyticsEvent::ScanStarted, &[("kind", "bite".to_string())]);
        analytics.record(AnalyticsEvent::EmergencyCareAdvised, &[]);

        let counters = analytics.counters();
        assert_eq!(counters.get(AnalyticsEvent::ScanStarted), 2);
        assert_eq!(counters.get(AnalyticsEvent::EmergencyCareAdvised), 1);
        assert_eq!(counters.get(AnalyticsEvent::CacheHit), 0);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.len(), AnalyticsEvent::ALL.len());
        assert_eq!(snapshot["scan_started"], 2);
    }
}
