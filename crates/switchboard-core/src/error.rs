/// A convenience `Result` alias using [`SwitchboardError`].
pub type SwitchboardResult<T> = Result<T, SwitchboardError>;

/// Top-level error type for the Switchboard router.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    /// No channel or model binding exists for the requested model.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Every channel serving the model stayed saturated for all retry rounds.
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// A provider backend answered with an error or unusable data.
    #[error("Backend error: {0}")]
    Backend(String),

    /// An outbound HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A tool could not be resolved, its arguments could not be converted,
    /// or its execution failed.
    #[error("Tool error: {0}")]
    Tool(String),

    /// The configuration or counter store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwitchboardError {
    /// Whether this error reports a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SwitchboardError::Cancelled)
    }
}
