//! LLM client for structured-output generation.

mod client;

pub use client::{GenerateObjectRequest, GenerateObjectResponse, LlmClient, Message, Role};
