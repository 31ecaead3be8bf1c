//! Core types and error definitions for the Switchboard LLM router.
//!
//! This crate provides the data model shared by every Switchboard crate: the
//! unified error type, provider-agnostic conversation turns, backend channel
//! descriptions and parsed tool invocation requests.
//!
//! # Main types
//!
//! - [`SwitchboardError`]: Unified error enum for all Switchboard subsystems.
//! - [`SwitchboardResult`]: Convenience alias for `Result<T, SwitchboardError>`.
//! - [`Role`], [`ConversationTurn`], [`Transcript`]: the request sent to a backend.
//! - [`Channel`], [`ModelBinding`], [`Provider`]: configured backends and what they serve.
//! - [`HistoryMessage`]: a stored chat message used to build conversation context.
//! - [`ToolInvocationRequest`]: a tool call parsed out of model output.

/// Error types.
pub mod error;
/// Backend channel configuration.
pub mod channel;
/// Conversation turns, transcripts and stored history messages.
pub mod message;
/// Tool invocation requests.
pub mod tool;

pub use channel::{Channel, ModelBinding, Provider};
pub use error::{SwitchboardError, SwitchboardResult};
pub use message::{Attachment, ConversationTurn, HistoryMessage, Role, Transcript};
pub use tool::ToolInvocationRequest;
