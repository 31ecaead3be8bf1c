use crate::tool::{ParamType, ToolDescriptor};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use switchboard_core::{SwitchboardError, SwitchboardResult};

/// A converted argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Absent optional argument or empty nullable.
    Null,
    /// Text.
    String(String),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Boolean(bool),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Canonical enum variant name.
    Enum(String),
    /// Structured value.
    Json(serde_json::Value),
}

/// Converts one raw string to the given parameter type.
///
/// Returns the failure reason as a plain string; callers add the parameter
/// context.
pub fn convert_value(raw: &str, ty: &ParamType) -> Result<ArgValue, String> {
    let trimmed = raw.trim();
    match ty {
        ParamType::String => Ok(ArgValue::String(raw.to_string())),
        ParamType::Integer => trimmed
            .parse::<i32>()
            .map(ArgValue::Integer)
            .map_err(|e| e.to_string()),
        ParamType::Long => trimmed
            .parse::<i64>()
            .map(ArgValue::Long)
            .map_err(|e| e.to_string()),
        ParamType::Float => trimmed
            .parse::<f32>()
            .map(ArgValue::Float)
            .map_err(|e| e.to_string()),
        ParamType::Double => trimmed
            .parse::<f64>()
            .map(ArgValue::Double)
            .map_err(|e| e.to_string()),
        ParamType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(ArgValue::Boolean(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(ArgValue::Boolean(false))
            } else {
                Err(format!("'{trimmed}' is not a valid boolean"))
            }
        }
        ParamType::DateTime => parse_datetime(trimmed).map(ArgValue::DateTime),
        ParamType::Enum {
            type_name,
            variants,
        } => variants
            .iter()
            .find(|v| v.eq_ignore_ascii_case(trimmed))
            .map(|v| ArgValue::Enum(v.clone()))
            .ok_or_else(|| {
                format!(
                    "'{trimmed}' is not a member of {type_name} (expected one of: {})",
                    variants.join(", ")
                )
            }),
        ParamType::Json { .. } => serde_json::from_str(raw)
            .map(ArgValue::Json)
            .map_err(|e| e.to_string()),
        ParamType::Nullable(inner) => {
            if raw.is_empty() {
                Ok(ArgValue::Null)
            } else {
                convert_value(raw, inner)
            }
        }
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("'{s}' is not a recognized date/time"))
}

/// Binds raw string arguments to a tool's declared parameters.
///
/// Present arguments are converted to their parameter's type; absent ones
/// fall back to the declared default, then to null for optional parameters.
/// Arguments that match no parameter are ignored.
pub fn bind_arguments(
    descriptor: &ToolDescriptor,
    raw: &HashMap<String, String>,
) -> SwitchboardResult<ToolArgs> {
    let mut values = HashMap::with_capacity(descriptor.params.len());
    for param in &descriptor.params {
        let value = match raw.get(&param.name).or(param.default.as_ref()) {
            Some(text) => convert_value(text, &param.param_type).map_err(|reason| {
                SwitchboardError::Tool(format!(
                    "Error converting value '{text}' for parameter '{}': {reason}",
                    param.name
                ))
            })?,
            None if param.required => {
                return Err(SwitchboardError::Tool(format!(
                    "Missing required parameter '{}' for tool '{}'.",
                    param.name, descriptor.name
                )))
            }
            None => ArgValue::Null,
        };
        values.insert(param.name.clone(), value);
    }
    Ok(ToolArgs { values })
}

/// Converted arguments handed to a tool, with typed accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: HashMap<String, ArgValue>,
}

impl ToolArgs {
    /// Builds arguments directly, mostly for tests.
    pub fn from_values(values: impl IntoIterator<Item = (String, ArgValue)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Raw access to a converted value.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Whether the argument is absent or null.
    pub fn is_null(&self, name: &str) -> bool {
        matches!(self.values.get(name), None | Some(ArgValue::Null))
    }

    /// A text argument.
    pub fn get_str(&self, name: &str) -> SwitchboardResult<&str> {
        self.opt_str(name).ok_or_else(|| missing(name, "text"))
    }

    /// A text argument, `None` when absent or null.
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::String(s)) | Some(ArgValue::Enum(s)) => Some(s),
            _ => None,
        }
    }

    /// An integer argument of either width.
    pub fn get_i64(&self, name: &str) -> SwitchboardResult<i64> {
        self.opt_i64(name).ok_or_else(|| missing(name, "integer"))
    }

    /// An integer argument, `None` when absent or null.
    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(v)) => Some(i64::from(*v)),
            Some(ArgValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    /// A numeric argument widened to `f64`.
    pub fn get_f64(&self, name: &str) -> SwitchboardResult<f64> {
        match self.values.get(name) {
            Some(ArgValue::Float(v)) => Ok(f64::from(*v)),
            Some(ArgValue::Double(v)) => Ok(*v),
            Some(ArgValue::Integer(v)) => Ok(f64::from(*v)),
            Some(ArgValue::Long(v)) => Ok(*v as f64),
            _ => Err(missing(name, "number")),
        }
    }

    /// A boolean argument.
    pub fn get_bool(&self, name: &str) -> SwitchboardResult<bool> {
        match self.values.get(name) {
            Some(ArgValue::Boolean(v)) => Ok(*v),
            _ => Err(missing(name, "boolean")),
        }
    }

    /// A date/time argument.
    pub fn get_datetime(&self, name: &str) -> SwitchboardResult<DateTime<Utc>> {
        match self.values.get(name) {
            Some(ArgValue::DateTime(v)) => Ok(*v),
            _ => Err(missing(name, "datetime")),
        }
    }

    /// The canonical name of an enum argument.
    pub fn get_enum(&self, name: &str) -> SwitchboardResult<&str> {
        match self.values.get(name) {
            Some(ArgValue::Enum(v)) => Ok(v),
            _ => Err(missing(name, "enum")),
        }
    }

    /// Deserializes a structured argument into `T`.
    pub fn get_json<T: DeserializeOwned>(&self, name: &str) -> SwitchboardResult<T> {
        match self.values.get(name) {
            Some(ArgValue::Json(v)) => Ok(serde_json::from_value(v.clone())?),
            _ => Err(missing(name, "structured")),
        }
    }
}

fn missing(name: &str, kind: &str) -> SwitchboardError {
    SwitchboardError::Tool(format!("Argument '{name}' is not a {kind} value"))
}
