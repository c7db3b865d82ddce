// src/services/mod.rs
pub mod analysis_service;
pub mod classifier;
pub mod image_processor;
pub mod llm_service;
pub mod prompt_builder;
pub mod response_cache;
pub mod response_parser;
pub mod transport;

pub use analysis_service::AnalysisService;
pub use classifier::LocalClassifier;
pub use image_processor::ImageProcessor;
pub use llm_service::{ModelEndpoint, OpenAiEndpoint};
pub use prompt_builder::PromptBuilder;
pub use response_cache::{ImageDigest, ResponseCache};
pub use transport::RetryingTransport;
