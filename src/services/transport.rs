// src/services/transport.rs
use crate::errors::AnalysisError;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::services::llm_service::{ChatRequest, ChatResponse, EndpointReply, ModelEndpoint};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt bookkeeping for one outstanding request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    retries: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts_made(&self) -> u32 {
        self.retries + 1
    }

    pub fn can_retry(&self, max_attempts: u32) -> bool {
        self.attempts_made() < max_attempts
    }

    /// Records a retry and returns how long to wait before it: 2s, 4s, 8s...
    pub fn advance(&mut self) -> Duration {
        self.retries += 1;
        backoff_delay(self.retries)
    }
}

pub fn backoff_delay(retry: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(retry))
}

enum StatusClass {
    Success,
    Transient(AnalysisError),
    Fatal(AnalysisError),
}

fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 => StatusClass::Fatal(AnalysisError::Unauthorized),
        429 => StatusClass::Fatal(AnalysisError::RateLimitExceeded),
        500..=599 => StatusClass::Transient(AnalysisError::ServerError(status)),
        code => StatusClass::Fatal(AnalysisError::InvalidResponse(code)),
    }
}

/// Pulls `choices[0].message.content` out of a successful reply.
pub fn extract_content(reply: &EndpointReply) -> Result<String, AnalysisError> {
    if reply.body.is_empty() {
        return Err(AnalysisError::NoData);
    }

    let response: ChatResponse = serde_json::from_slice(&reply.body)
        .map_err(|e| AnalysisError::Parsing(format!("Failed to decode response: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(AnalysisError::NoData)
}

#[derive(Clone)]
pub struct RetryingTransport {
    endpoint: Arc<dyn ModelEndpoint>,
}

impl RetryingTransport {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Sends `request`, retrying transient failures with exponential backoff
    /// until `max_attempts` attempts have been made.
    pub async fn send(
        &self,
        request: &ChatRequest,
        max_attempts: u32,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<String, AnalysisError> {
        let max_attempts = max_attempts.max(1);
        let mut state = RetryState::new();

        loop {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            progress.emit(ProgressEvent::Uploading { percent: 10 });
            info!(
                "Sending prompt to model endpoint (attempt {} of {})...",
                state.attempts_made(),
                max_attempts
            );
            progress.emit(ProgressEvent::Uploading { percent: 40 });

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
                sent = self.endpoint.send(request) => sent,
            };

            let failure = match sent {
                Ok(reply) => {
                    progress.emit(ProgressEvent::Uploading { percent: 90 });
                    info!("Model endpoint status code: {}", reply.status);
                    match classify_status(reply.status) {
                        StatusClass::Success => {
                            let content = extract_content(&reply)?;
                            progress.emit(ProgressEvent::Analyzing);
                            return Ok(content);
                        }
                        StatusClass::Fatal(err) => return Err(err),
                        StatusClass::Transient(err) => err,
                    }
                }
                Err(failure) if failure.is_transient() => failure.into_error(),
                Err(failure) => return Err(failure.into_error()),
            };

            if !state.can_retry(max_attempts) {
                warn!(
                    "Giving up after {} attempts: {:?}",
                    state.attempts_made(),
                    failure
                );
                return Err(failure);
            }

            let delay = state.advance();
            warn!(
                "Transient failure ({:?}). Retrying in {} seconds...",
                failure,
                delay.as_secs()
            );
            progress.emit(ProgressEvent::Retrying {
                attempt: state.attempts_made(),
                delay,
                cause: failure.kind(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::services::llm_service::SendFailure;
    use crate::testing::{ScriptedEndpoint, chat_reply, status_reply};
    use tokio::sync::mpsc;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".to_string(),
            messages: Vec::new(),
            max_tokens: 1000,
        }
    }

    fn transport(endpoint: &Arc<ScriptedEndpoint>) -> RetryingTransport {
        RetryingTransport::new(endpoint.clone())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn backoff_doubles_from_two_seconds() {
        let mut state = RetryState::new();
        assert_eq!(state.attempts_made(), 1);
        assert_eq!(state.advance(), Duration::from_secs(2));
        assert_eq!(state.advance(), Duration::from_secs(4));
        assert_eq!(state.advance(), Duration::from_secs(8));
        assert_eq!(state.attempts_made(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded_by_budget() {
        // (forced transient failures, max attempts)
        let cases = [(0, 3), (1, 3), (2, 3), (3, 3), (5, 3), (1, 1), (2, 2), (1, 2)];

        for (failures, max_attempts) in cases {
            let endpoint = Arc::new(ScriptedEndpoint::new(
                (0..failures)
                    .map(|_| Err(SendFailure::ConnectionLost("reset".to_string())))
                    .collect(),
                chat_reply("Insect or Cause: Flea"),
            ));

            let result = transport(&endpoint)
                .send(
                    &request(),
                    max_attempts,
                    &ProgressReporter::silent(),
                    &CancellationToken::new(),
                )
                .await;

            assert_eq!(
                endpoint.calls(),
                (failures + 1).min(max_attempts) as usize,
                "failures={failures} max={max_attempts}"
            );
            assert_eq!(
                result.is_ok(),
                failures < max_attempts,
                "failures={failures} max={max_attempts}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_retry_with_exponential_backoff() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            vec![Ok(status_reply(503)), Ok(status_reply(502))],
            chat_reply("Insect or Cause: Tick"),
        ));
        let (progress, mut rx) = ProgressReporter::channel();

        let start = tokio::time::Instant::now();
        let content = transport(&endpoint)
            .send(&request(), 3, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(content, "Insect or Cause: Tick");
        assert_eq!(endpoint.calls(), 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(6) && waited < Duration::from_secs(7));

        let retries: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Retrying {
                    attempt,
                    delay,
                    cause,
                } => Some((attempt, delay, cause)),
                _ => None,
            })
            .collect();
        assert_eq!(
            retries,
            vec![
                (2, Duration::from_secs(2), ErrorKind::ServerError),
                (3, Duration::from_secs(4), ErrorKind::ServerError),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_server_errors_report_last_status() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            vec![Ok(status_reply(500)), Ok(status_reply(504))],
            chat_reply("unused"),
        ));

        let result = transport(&endpoint)
            .send(
                &request(),
                2,
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result, Err(AnalysisError::ServerError(504)));
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_timeouts_surface_as_timeout() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            vec![Err(SendFailure::TimedOut), Err(SendFailure::TimedOut)],
            chat_reply("unused"),
        ));

        let result = transport(&endpoint)
            .send(
                &request(),
                2,
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result, Err(AnalysisError::Timeout));
    }

    #[tokio::test]
    async fn client_errors_never_retry() {
        let cases = [
            (401, AnalysisError::Unauthorized),
            (429, AnalysisError::RateLimitExceeded),
            (400, AnalysisError::InvalidResponse(400)),
            (404, AnalysisError::InvalidResponse(404)),
            (302, AnalysisError::InvalidResponse(302)),
        ];

        for (status, expected) in cases {
            let endpoint = Arc::new(ScriptedEndpoint::new(
                vec![Ok(status_reply(status))],
                chat_reply("unused"),
            ));
            let result = transport(&endpoint)
                .send(
                    &request(),
                    3,
                    &ProgressReporter::silent(),
                    &CancellationToken::new(),
                )
                .await;

            assert_eq!(result, Err(expected), "status {status}");
            assert_eq!(endpoint.calls(), 1, "status {status}");
        }
    }

    #[tokio::test]
    async fn permanent_network_failures_do_not_retry() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            vec![Err(SendFailure::Other("builder error".to_string()))],
            chat_reply("unused"),
        ));
        let result = transport(&endpoint)
            .send(
                &request(),
                3,
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            result,
            Err(AnalysisError::Network("builder error".to_string()))
        );
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn empty_or_malformed_bodies_are_typed() {
        let empty = EndpointReply {
            status: 200,
            body: bytes::Bytes::new(),
        };
        assert_eq!(extract_content(&empty), Err(AnalysisError::NoData));

        let no_choices = EndpointReply {
            status: 200,
            body: bytes::Bytes::from_static(br#"{"choices":[]}"#),
        };
        assert_eq!(extract_content(&no_choices), Err(AnalysisError::NoData));

        let garbage = EndpointReply {
            status: 200,
            body: bytes::Bytes::from_static(b"<html>"),
        };
        assert!(matches!(
            extract_content(&garbage),
            Err(AnalysisError::Parsing(_))
        ));
    }

    #[tokio::test]
    async fn success_reports_upload_milestones() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            Vec::new(),
            chat_reply("Insect or Cause: Mosquito"),
        ));
        let (progress, mut rx) = ProgressReporter::channel();

        transport(&endpoint)
            .send(&request(), 3, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                ProgressEvent::Uploading { percent: 10 },
                ProgressEvent::Uploading { percent: 40 },
                ProgressEvent::Uploading { percent: 90 },
                ProgressEvent::Analyzing,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_pending_retries() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            vec![Ok(status_reply(500)), Ok(status_reply(500))],
            chat_reply("unused"),
        ));
        let cancel = CancellationToken::new();
        let transport = transport(&endpoint);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let result = transport
            .send(&request(), 3, &ProgressReporter::silent(), &cancel)
            .await;

        assert_eq!(result, Err(AnalysisError::Cancelled));
        assert_eq!(endpoint.calls(), 1);
    }
}
