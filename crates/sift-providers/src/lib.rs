//! sift-providers: LLM provider implementations for sift
//!
//! This crate provides the OpenAI-compatible chat completion provider used
//! by the research loop.

pub mod openai;

pub use openai::{OpenAIProvider, DEFAULT_BASE_URL};
