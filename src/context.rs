// src/context.rs
//! Environment around a scan: connectivity, reverse geocoding and the
//! calendar buckets used in prompts.
use crate::models::Coordinates;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long a reverse-geocoding lookup may take before the prompt is built
/// without location text.
pub const DEFAULT_GEOCODE_TIMEOUT: Duration = Duration::from_secs(2);

pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag flipped by whatever watches the network.
#[derive(Debug)]
pub struct ConnectivityFlag {
    online: AtomicBool,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placemark {
    pub locality: Option<String>,
    pub administrative_area: Option<String>,
    pub country: Option<String>,
}

impl Placemark {
    pub fn describe(&self) -> String {
        format!(
            "{}, {}, {}",
            self.locality.as_deref().unwrap_or("Unknown City"),
            self.administrative_area.as_deref().unwrap_or("Unknown State"),
            self.country.as_deref().unwrap_or("Unknown Country"),
        )
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, coordinates: Coordinates) -> Option<Placemark>;
}

/// Reverse-geocodes `coordinates`, giving up after `wait`.
pub async fn resolve_location(
    geocoder: &dyn Geocoder,
    coordinates: Coordinates,
    wait: Duration,
) -> Option<String> {
    match tokio::time::timeout(wait, geocoder.reverse_geocode(coordinates)).await {
        Ok(Some(placemark)) => Some(placemark.describe()),
        Ok(None) => {
            debug!("Reverse geocoding returned no placemark");
            None
        }
        Err(_) => {
            warn!(
                "Reverse geocoding timed out after {}ms, continuing without location",
                wait.as_millis()
            );
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// `month` is 1-based. Out-of-range values fall into Winter.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }

    pub fn at(now: NaiveDateTime) -> Self {
        Self::from_month(now.month())
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            18..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn at(now: NaiveDateTime) -> Self {
        Self::from_hour(now.hour())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        })
    }
}
