use crate::convert::ToolArgs;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use switchboard_core::SwitchboardResult;
use uuid::Uuid;

/// Semantic type of a tool parameter. Drives both the prompt description and
/// the conversion of raw string arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// Passed through unchanged.
    String,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// `true`/`false`, case-insensitive.
    Boolean,
    /// RFC 3339 or `YYYY-MM-DD[ HH:MM[:SS]]`, read as UTC.
    DateTime,
    /// One of a fixed set of names, matched case-insensitively.
    Enum {
        /// Name shown in the prompt.
        type_name: String,
        /// Canonical variant names.
        variants: Vec<String>,
    },
    /// Structured value deserialized from JSON text.
    Json {
        /// Name shown in the prompt.
        type_name: String,
    },
    /// The inner type, or null when the raw value is empty.
    Nullable(Box<ParamType>),
}

impl ParamType {
    /// Builds an enum type from its variant names.
    pub fn enumeration(type_name: impl Into<String>, variants: &[&str]) -> Self {
        ParamType::Enum {
            type_name: type_name.into(),
            variants: variants.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Builds a JSON-deserialized compound type.
    pub fn json(type_name: impl Into<String>) -> Self {
        ParamType::Json {
            type_name: type_name.into(),
        }
    }

    /// Wraps this type so that an empty value converts to null.
    pub fn nullable(self) -> Self {
        ParamType::Nullable(Box::new(self))
    }

    /// Simplified name used in the prompt, e.g. `integer` or `long?`.
    pub fn type_name(&self) -> String {
        match self {
            ParamType::String => "string".into(),
            ParamType::Integer => "integer".into(),
            ParamType::Long => "long".into(),
            ParamType::Float => "float".into(),
            ParamType::Double => "double".into(),
            ParamType::Boolean => "boolean".into(),
            ParamType::DateTime => "datetime".into(),
            ParamType::Enum { type_name, .. } | ParamType::Json { type_name } => {
                type_name.clone()
            }
            ParamType::Nullable(inner) => format!("{}?", inner.type_name()),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Argument name as the model must spell it.
    pub name: String,
    /// Semantic type.
    pub param_type: ParamType,
    /// Whether the argument must be supplied when there is no default.
    pub required: bool,
    /// Prompt description.
    pub description: String,
    /// Raw default used when the argument is absent.
    pub default: Option<String>,
}

impl ParamSpec {
    /// A parameter that must be supplied.
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
            default: None,
        }
    }

    /// A parameter that may be omitted.
    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Sets the raw default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// The description, or a generated one when none was given.
    pub fn display_description(&self) -> String {
        if self.description.trim().is_empty() {
            format!("Parameter '{}'", self.name)
        } else {
            self.description.clone()
        }
    }
}

/// Metadata describing a tool's interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// Parameters in declaration order.
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// Creates a descriptor with no parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }
}

/// Per-invocation context handed to every tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    /// Chat the request originates from.
    pub chat_id: i64,
    /// Id of the request driving the agent loop.
    pub request_id: Uuid,
}

impl ToolContext {
    /// Context for a chat with a fresh request id.
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            request_id: Uuid::new_v4(),
        }
    }
}

/// Value produced by a tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// The tool returned nothing.
    Unit,
    /// Plain text, fed back verbatim.
    Text(String),
    /// Structured data, fed back as pretty JSON.
    Json(serde_json::Value),
}

impl ToolOutput {
    /// Serializes any value into a JSON output.
    pub fn json<T: Serialize>(value: &T) -> SwitchboardResult<Self> {
        Ok(ToolOutput::Json(serde_json::to_value(value)?))
    }

    /// The text fed back to the model.
    pub fn to_feedback_string(&self) -> String {
        match self {
            ToolOutput::Unit | ToolOutput::Json(serde_json::Value::Null) => {
                "Tool executed successfully with no return value.".to_string()
            }
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

/// Trait that every tool implements, whether a dedicated struct or an
/// [`FnTool`] closure.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static interface description.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Runs the tool with already converted arguments.
    async fn invoke(&self, args: ToolArgs, ctx: &ToolContext) -> SwitchboardResult<ToolOutput>;
}

type ToolFuture = Pin<Box<dyn Future<Output = SwitchboardResult<ToolOutput>> + Send>>;
type ToolFn = dyn Fn(ToolArgs, ToolContext) -> ToolFuture + Send + Sync;

/// A tool backed by an async closure. The closure owns whatever receiver
/// state the tool needs.
pub struct FnTool {
    descriptor: ToolDescriptor,
    func: Arc<ToolFn>,
}

impl FnTool {
    /// Wraps a descriptor and an async closure into a tool.
    pub fn new<F, Fut>(descriptor: ToolDescriptor, func: F) -> Self
    where
        F: Fn(ToolArgs, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SwitchboardResult<ToolOutput>> + Send + 'static,
    {
        Self {
            descriptor,
            func: Arc::new(move |args, ctx| Box::pin(func(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: ToolArgs, ctx: &ToolContext) -> SwitchboardResult<ToolOutput> {
        (self.func)(args, ctx.clone()).await
    }
}
