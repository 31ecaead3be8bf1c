use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;
use switchboard_core::SwitchboardResult;
use switchboard_tools::{ParamSpec, ParamType, Tool, ToolArgs, ToolContext, ToolDescriptor, ToolOutput};

/// Reports the current time in UTC or the host's local zone.
pub struct CurrentTimeTool {
    descriptor: ToolDescriptor,
}

impl CurrentTimeTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "get_current_time",
                "Get the current date and time, with weekday and unix timestamp.",
            )
            .param(
                ParamSpec::optional(
                    "timezone",
                    ParamType::enumeration("TimeZoneKind", &["utc", "local"]),
                    "Which clock to read: utc or local",
                )
                .with_default("local"),
            ),
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

fn describe<Tz>(now: DateTime<Tz>, zone: &str) -> serde_json::Value
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    serde_json::json!({
        "time": now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "timezone": zone,
        "offset": now.format("%:z").to_string(),
        "weekday": now.format("%A").to_string(),
        "unix_timestamp": now.timestamp(),
    })
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &ToolContext) -> SwitchboardResult<ToolOutput> {
        let value = match args.get_enum("timezone")? {
            "utc" => describe(Utc::now(), "UTC"),
            _ => describe(Local::now(), "local"),
        };
        Ok(ToolOutput::Json(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_fixed_instant() {
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 1).unwrap();
        let value = describe(at, "UTC");
        assert_eq!(value["time"], "2024-02-29 23:59:01");
        assert_eq!(value["weekday"], "Thursday");
        assert_eq!(value["offset"], "+00:00");
        assert_eq!(value["unix_timestamp"], 1_709_251_141);
    }
}
