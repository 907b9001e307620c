//! Agent layer - the two completion-backed operations of the bot
//!
//! This crate owns everything that talks to the completion endpoint:
//! - `StageClassifier` - infers which of the five negotiation stages the
//!   conversation is in from the stage-analysis log
//! - `DialogueResponder` - generates the next reply to the supplier from the
//!   dialogue log
//! - `CompletionClient` - the pluggable trait both operations call through
//!
//! The completion endpoint returns untrusted freeform text. The classifier
//! falls back to the intake stage when no usable digit is present, and the
//! responder takes only the first line of the raw response.

pub mod classifier;
pub mod llm;
pub mod responder;

pub use classifier::{ClassifyError, StageClassifier};
pub use llm::{CompletionClient, CompletionError};
pub use responder::{DialogueResponder, RespondError};
