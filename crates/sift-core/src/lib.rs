//! sift-core: Core types and the research loop for sift
//!
//! This crate provides the tool and provider contracts, the conversation
//! memory, the research state machine, and the packaging of its results.

pub mod blocking;
pub mod error;
pub mod memory;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod researcher;
pub mod result;
pub mod sources;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blocking::run_blocking;
pub use error::Error;
pub use memory::ConversationMemory;
pub use message::{Message, MessageKind, Role, ToolCall, Usage};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
pub use researcher::{
    Decision, Researcher, ResearcherConfig, Session, SessionOutcome, SessionState,
    DEFAULT_MAX_STEPS,
};
pub use result::ResearchResult;
pub use sources::extract_sources;
pub use tool::{PropertySchema, Tool, ToolDefinition, ToolParameters, ToolRegistry, INPUT_ARG};

pub type Result<T> = std::result::Result<T, Error>;
