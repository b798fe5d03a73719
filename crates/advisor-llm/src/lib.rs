pub mod client;

pub use client::{ChatRequest, JsonModel, LlmClient, LlmError, OpenAiClient};
