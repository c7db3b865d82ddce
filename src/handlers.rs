// src/handlers.rs
use crate::AppState;
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use bytes::Bytes;
use futures_util::TryStreamExt;
use insectiscan::models::{EnvironmentContext, UserProfile};
use insectiscan::{AnalysisError, AnalysisKind, AnalysisRequest, ProgressEvent, ProgressReporter};
use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Hard cap on a single multipart field. Images under it may still be resized
/// before upload.
const MAX_FIELD_BYTES: usize = 64 * 1024 * 1024;

/// Multipart fields accepted by the analyze endpoint.
#[derive(Debug, Default)]
struct ScanForm {
    image: Option<Bytes>,
    baseline: Option<Bytes>,
    days_since: Option<String>,
    notes: Option<String>,
    profile: Option<String>,
    context: Option<String>,
}

impl ScanForm {
    async fn read(payload: &mut Multipart) -> Result<Self, Error> {
        let mut form = ScanForm::default();

        while let Some(mut field) = payload.try_next().await? {
            let name = field
                .content_disposition()
                .get_name()
                .unwrap_or_default()
                .to_string();

            let mut data = Vec::new();
            while let Some(chunk) = field.try_next().await? {
                if data.len() + chunk.len() > MAX_FIELD_BYTES {
                    return Err(AnalysisError::ImageTooLarge.into());
                }
                data.extend_from_slice(&chunk);
            }

            match name.as_str() {
                "image" => form.image = Some(Bytes::from(data)),
                "baseline" => form.baseline = Some(Bytes::from(data)),
                "days_since" => form.days_since = Some(text(data)?),
                "notes" => form.notes = Some(text(data)?),
                "profile" => form.profile = Some(text(data)?),
                "context" => form.context = Some(text(data)?),
                other => debug!("Ignoring unknown form field {:?}", other),
            }
        }

        Ok(form)
    }

    fn into_request(self, kind: AnalysisKind) -> Result<AnalysisRequest, Error> {
        let image = self
            .image
            .ok_or_else(|| actix_web::error::ErrorBadRequest("An image field is required"))?;

        let mut request = match kind {
            AnalysisKind::Bite => AnalysisRequest::bite(image),
            AnalysisKind::Plant => AnalysisRequest::plant(image),
            AnalysisKind::Animal => AnalysisRequest::animal(image),
            AnalysisKind::HealingComparison => {
                let baseline = self.baseline.ok_or_else(|| {
                    actix_web::error::ErrorBadRequest("A baseline image is required")
                })?;
                let days_since = match self.days_since.as_deref().map(str::trim) {
                    Some(days) => days.parse::<u32>().map_err(|_| {
                        actix_web::error::ErrorBadRequest(format!("Invalid days_since: {days}"))
                    })?,
                    None => 1,
                };
                AnalysisRequest::healing_comparison(baseline, image, days_since)
            }
        };

        if let Some(notes) = self.notes {
            request = request.with_notes(notes);
        }
        if let Some(profile) = self.profile {
            let profile: UserProfile = serde_json::from_str(&profile)
                .map_err(|e| actix_web::error::ErrorBadRequest(format!("Invalid profile: {e}")))?;
            request = request.with_profile(profile);
        }
        if let Some(context) = self.context {
            let context: EnvironmentContext = serde_json::from_str(&context)
                .map_err(|e| actix_web::error::ErrorBadRequest(format!("Invalid context: {e}")))?;
            request = request.with_context(context);
        }

        Ok(request)
    }
}

fn text(data: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(data).map_err(actix_web::error::ErrorBadRequest)
}

async fn log_progress(scan_id: Uuid, mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        debug!("[scan {}] {}", scan_id, event.message());
        if event.is_terminal() {
            break;
        }
    }
}

pub async fn analyze(
    path: web::Path<String>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let kind: AnalysisKind = path
        .into_inner()
        .parse()
        .map_err(actix_web::error::ErrorNotFound)?;

    let request = ScanForm::read(&mut payload).await?.into_request(kind)?;

    // Dropping the handler future (client went away) cancels pending retries
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let (progress, rx) = ProgressReporter::channel();
    actix_web::rt::spawn(log_progress(Uuid::new_v4(), rx));

    let outcome = data.analysis.analyze(&request, &progress, &cancel).await?;

    Ok(HttpResponse::Ok().json(&outcome))
}

pub async fn clear_cache(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    data.analysis.clear_cache();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "cleared": true })))
}

pub async fn stats(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "events": data.analytics.counters().snapshot(),
        "cached_responses": data.analysis.cache().len()
    })))
}
