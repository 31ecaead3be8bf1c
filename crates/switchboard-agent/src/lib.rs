//! Backend routing and the agent loop for the Switchboard LLM router.
//!
//! [`LlmService`] is the entry point. It picks a channel for a model through
//! the [`RetryScheduler`] and [`AdmissionController`], talks to the provider
//! through a [`BackendAdapter`] and drives tool calls with the [`AgentLoop`].

/// Per-channel slot accounting and health probes.
pub mod admission;
/// Provider adapters.
pub mod backends;
/// Capability inference from model names.
pub mod capabilities;
/// Service tunables.
pub mod config;
/// History windowing.
pub mod context;
/// The tool-calling loop.
pub mod runner;
/// Round-based retry over channels.
pub mod scheduler;
/// Caller-facing facade.
pub mod service;
/// Stream helpers.
pub mod stream;

pub use admission::{AdmissionController, CapacitySlot};
pub use backends::{AdapterSet, BackendAdapter, ScriptedBackend, TextStream};
pub use capabilities::{infer_capabilities, ModelCapabilities};
pub use config::ServiceConfig;
pub use context::HistoryWindow;
pub use runner::{AgentLoop, LoopOutcome, EXHAUSTED_MESSAGE};
pub use scheduler::RetryScheduler;
pub use service::{terminal_message, AnswerStream, LlmService, Stores};
pub use stream::cumulative;
