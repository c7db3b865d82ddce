// src/services/llm_service.rs
use crate::errors::AnalysisError;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Status and body of one HTTP exchange, before any interpretation.
#[derive(Debug, Clone)]
pub struct EndpointReply {
    pub status: u16,
    pub body: Bytes,
}

/// Why an attempt produced no HTTP response at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    TimedOut,
    NotConnected(String),
    ConnectionLost(String),
    Other(String),
}

impl SendFailure {
    pub fn is_transient(&self) -> bool {
        !matches!(self, SendFailure::Other(_))
    }

    pub fn into_error(self) -> AnalysisError {
        match self {
            SendFailure::TimedOut => AnalysisError::Timeout,
            SendFailure::NotConnected(detail)
            | SendFailure::ConnectionLost(detail)
            | SendFailure::Other(detail) => AnalysisError::Network(detail),
        }
    }
}

impl From<reqwest::Error> for SendFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SendFailure::TimedOut
        } else if e.is_connect() {
            SendFailure::NotConnected(e.to_string())
        } else if e.is_request() || e.is_body() {
            SendFailure::ConnectionLost(e.to_string())
        } else {
            SendFailure::Other(e.to_string())
        }
    }
}

/// One POST to the model endpoint. Retrying and status interpretation happen
/// in `RetryingTransport`.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<EndpointReply, SendFailure>;
}

pub struct OpenAiEndpoint {
    api_key: String,
    url: String,
    client: Client,
}

impl OpenAiEndpoint {
    pub fn new(
        api_key: String,
        url: String,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            api_key,
            url,
            client,
        })
    }
}

#[async_trait]
impl ModelEndpoint for OpenAiEndpoint {
    async fn send(&self, request: &ChatRequest) -> Result<EndpointReply, SendFailure> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!("Model endpoint answered with status {}", status);
        let body = response.bytes().await?;

        Ok(EndpointReply { status, body })
    }
}
