// src/testing.rs
//! Fakes shared by the unit tests.
use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::context::{Geocoder, Placemark};
use crate::models::Coordinates;
use crate::services::llm_service::{ChatRequest, EndpointReply, ModelEndpoint, SendFailure};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn chat_reply(content: &str) -> EndpointReply {
    let body = serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    });
    EndpointReply {
        status: 200,
        body: Bytes::from(body.to_string()),
    }
}

pub fn status_reply(status: u16) -> EndpointReply {
    EndpointReply {
        status,
        body: Bytes::new(),
    }
}

/// Replays a fixed script of outcomes, then answers every further call with
/// `fallback`.
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<EndpointReply, SendFailure>>>,
    fallback: EndpointReply,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedEndpoint {
    pub fn new(script: Vec<Result<EndpointReply, SendFailure>>, fallback: EndpointReply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelEndpoint for ScriptedEndpoint {
    async fn send(&self, request: &ChatRequest) -> Result<EndpointReply, SendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub struct FakeGeocoder {
    placemark: Option<Placemark>,
    delay: Duration,
}

impl FakeGeocoder {
    pub fn immediate(placemark: Placemark) -> Self {
        Self {
            placemark: Some(placemark),
            delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            placemark: Some(Placemark {
                locality: Some("Too Late".to_string()),
                ..Placemark::default()
            }),
            delay,
        }
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn reverse_geocode(&self, _coordinates: Coordinates) -> Option<Placemark> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.placemark.clone()
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<(AnalyticsEvent, Vec<(String, String)>)>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(event, _)| *event)
            .collect()
    }

    pub fn metadata_keys(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, metadata)| metadata.iter().map(|(key, _)| key.clone()))
            .collect()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn record(&self, event: AnalyticsEvent, metadata: &[(&str, String)]) {
        let metadata = metadata
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        self.events.lock().unwrap().push((event, metadata));
    }
}

pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut output = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut output), ImageOutputFormat::Png)
        .unwrap();
    output
}
