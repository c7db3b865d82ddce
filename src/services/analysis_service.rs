// src/services/analysis_service.rs
use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::clock::Clock;
use crate::context::{Connectivity, DEFAULT_GEOCODE_TIMEOUT, Geocoder, resolve_location};
use crate::errors::AnalysisError;
use crate::models::{AnalysisKind, AnalysisOutcome, AnalysisRequest};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::services::classifier::LocalClassifier;
use crate::services::image_processor::{ImageProcessor, PreparedImage};
use crate::services::llm_service::ModelEndpoint;
use crate::services::prompt_builder::PromptBuilder;
use crate::services::response_cache::{ImageDigest, ResponseCache};
use crate::services::response_parser;
use crate::services::transport::RetryingTransport;
use bytes::Bytes;
use chrono::Local;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Entry point for every scan: picks the offline, cached or online path and
/// reports progress and analytics along the way.
pub struct AnalysisService {
    prompts: PromptBuilder,
    transport: RetryingTransport,
    cache: ResponseCache,
    images: ImageProcessor,
    classifier: LocalClassifier,
    connectivity: Arc<dyn Connectivity>,
    geocoder: Option<Arc<dyn Geocoder>>,
    analytics: Arc<dyn AnalyticsSink>,
    clock: Arc<dyn Clock>,
    geocode_timeout: Duration,
}

impl AnalysisService {
    pub fn new(
        endpoint: Arc<dyn ModelEndpoint>,
        connectivity: Arc<dyn Connectivity>,
        analytics: Arc<dyn AnalyticsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            prompts: PromptBuilder::default(),
            transport: RetryingTransport::new(endpoint),
            cache: ResponseCache::new(clock.clone()),
            images: ImageProcessor::new(),
            classifier: LocalClassifier::new(),
            connectivity,
            geocoder: None,
            analytics,
            clock,
            geocode_timeout: DEFAULT_GEOCODE_TIMEOUT,
        }
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    /// Replaces the cache with an empty one using `ttl`.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = ResponseCache::with_ttl(self.clock.clone(), ttl);
        self
    }

    pub fn with_image_processor(mut self, images: ImageProcessor) -> Self {
        self.images = images;
        self
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_geocode_timeout(mut self, wait: Duration) -> Self {
        self.geocode_timeout = wait;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Response cache cleared");
    }

    /// Runs one analysis to completion. Exactly one terminal progress event
    /// (`Complete` or `Error`) is emitted per call, matching the returned value.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let progress = &progress.for_call();
        let analysis_id = Uuid::new_v4();
        let kind = request.kind();

        info!("[{}] Starting {} analysis", analysis_id, kind);
        progress.emit(ProgressEvent::Preparing);
        self.analytics.record(
            AnalyticsEvent::ScanStarted,
            &[
                ("analysis_id", analysis_id.to_string()),
                ("kind", kind.as_str().to_string()),
                ("has_notes", request.has_notes().to_string()),
                ("has_profile", request.profile().is_some().to_string()),
            ],
        );

        let result = self.run(analysis_id, request, progress, cancel).await;

        match &result {
            Ok(outcome) => {
                info!(
                    "[{}] {} analysis complete (confidence: {})",
                    analysis_id,
                    kind,
                    outcome.confidence()
                );
                progress.emit(ProgressEvent::Complete);

                let mut metadata = vec![
                    ("analysis_id", analysis_id.to_string()),
                    ("kind", kind.as_str().to_string()),
                    ("confidence", outcome.confidence().to_string()),
                ];
                if let Some(bite) = outcome.as_bite() {
                    metadata.push(("danger_level", bite.danger_level.to_string()));
                }
                self.analytics
                    .record(AnalyticsEvent::ScanCompleted, &metadata);

                if let Some(bite) = outcome.as_bite().filter(|bite| bite.is_emergency()) {
                    warn!(
                        "[{}] Danger level {} warrants emergency care",
                        analysis_id, bite.danger_level
                    );
                    self.analytics.record(
                        AnalyticsEvent::EmergencyCareAdvised,
                        &[
                            ("analysis_id", analysis_id.to_string()),
                            ("danger_level", bite.danger_level.to_string()),
                            ("cause", bite.insect_or_cause.clone()),
                        ],
                    );
                }
            }
            Err(err) => {
                warn!("[{}] {} analysis failed: {:?}", analysis_id, kind, err);
                progress.emit(ProgressEvent::failed(err));
                self.analytics.record(
                    AnalyticsEvent::ErrorOccurred,
                    &[
                        ("analysis_id", analysis_id.to_string()),
                        ("kind", kind.as_str().to_string()),
                        ("error_kind", err.kind().as_str().to_string()),
                        ("message", err.to_string()),
                    ],
                );
            }
        }

        result
    }

    async fn run(
        &self,
        analysis_id: Uuid,
        request: &AnalysisRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let kind = request.kind();

        if !self.connectivity.is_online() {
            return self.analyze_offline(analysis_id, request, progress);
        }

        let payloads: Vec<&[u8]> = request_images(request)
            .into_iter()
            .map(|image| &image[..])
            .collect();
        let digest = ImageDigest::for_request(kind, &payloads);
        if let Some(raw) = self.cache.get(&digest) {
            info!("[{}] Using cached response for {}", analysis_id, digest);
            self.analytics.record(
                AnalyticsEvent::CacheHit,
                &[
                    ("analysis_id", analysis_id.to_string()),
                    ("kind", kind.as_str().to_string()),
                ],
            );
            progress.emit(ProgressEvent::ProcessingResponse);
            return response_parser::parse(kind, &raw);
        }

        let images = self.prepare_images(request)?;
        let location = self.location_text(request).await;
        let now = self.clock.now().with_timezone(&Local).naive_local();
        let chat = self
            .prompts
            .build(request, &images, location.as_deref(), now);

        let raw = self
            .transport
            .send(&chat, kind.max_attempts(), progress, cancel)
            .await?;
        debug!("[{}] Raw model response: {}", analysis_id, raw);

        self.cache.put(digest, raw.as_str());
        progress.emit(ProgressEvent::ProcessingResponse);
        response_parser::parse(kind, &raw)
    }

    fn analyze_offline(
        &self,
        analysis_id: Uuid,
        request: &AnalysisRequest,
        progress: &ProgressReporter,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let kind = request.kind();
        info!("[{}] Offline, using local classifier", analysis_id);
        progress.emit(ProgressEvent::Analyzing);
        self.analytics.record(
            AnalyticsEvent::OfflineFallback,
            &[
                ("analysis_id", analysis_id.to_string()),
                ("kind", kind.as_str().to_string()),
            ],
        );

        let image = self.images.decode(request.image())?;
        Ok(self.classifier.classify(kind, &image))
    }

    fn prepare_images(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vec<PreparedImage>, AnalysisError> {
        request_images(request)
            .into_iter()
            .map(|image| self.images.prepare_for_upload(image))
            .collect()
    }

    /// Location text for the prompt: caller-resolved text wins, otherwise the
    /// coordinates are reverse-geocoded within the configured wait.
    async fn location_text(&self, request: &AnalysisRequest) -> Option<String> {
        let context = request.context()?;

        if let Some(location) = context
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            return Some(location.to_string());
        }

        let coordinates = context.coordinates?;
        let geocoder = self.geocoder.as_deref()?;
        resolve_location(geocoder, coordinates, self.geocode_timeout).await
    }
}

/// Images that identify a request, in prompt order.
fn request_images(request: &AnalysisRequest) -> Vec<&Bytes> {
    match (request.kind(), request.baseline()) {
        (AnalysisKind::HealingComparison, Some(baseline)) => {
            vec![&baseline.image, request.image()]
        }
        _ => vec![request.image()],
    }
}
