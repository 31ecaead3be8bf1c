use async_trait::async_trait;
use switchboard_core::{SwitchboardError, SwitchboardResult};
use switchboard_tools::{ParamSpec, ParamType, Tool, ToolArgs, ToolContext, ToolDescriptor, ToolOutput};

const FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "log", "ln", "sqrt", "abs", "round", "floor", "ceil",
];

/// Evaluates a single-argument math function.
pub struct MathFunctionTool {
    descriptor: ToolDescriptor,
}

impl MathFunctionTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "math_function",
                "Evaluate a math function. log is base 10, ln is natural. \
Trigonometric functions read the value in the given unit.",
            )
            .param(ParamSpec::required(
                "function",
                ParamType::enumeration("MathFunction", FUNCTIONS),
                "Function to apply",
            ))
            .param(ParamSpec::required("value", ParamType::Double, "Input value"))
            .param(
                ParamSpec::optional(
                    "unit",
                    ParamType::enumeration("AngleUnit", &["degree", "radian"]),
                    "Angle unit for sin, cos and tan",
                )
                .with_default("radian"),
            ),
        }
    }
}

impl Default for MathFunctionTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `function` to `value`. Angles are in radians unless `degrees`.
pub fn evaluate(function: &str, value: f64, degrees: bool) -> SwitchboardResult<f64> {
    let angle = if degrees { value.to_radians() } else { value };
    let result = match function {
        "sin" => angle.sin(),
        "cos" => angle.cos(),
        "tan" => angle.tan(),
        "log" | "ln" | "sqrt" if value < 0.0 || (value == 0.0 && function != "sqrt") => {
            return Err(SwitchboardError::Tool(format!(
                "{function} is undefined for {value}"
            )))
        }
        "log" => value.log10(),
        "ln" => value.ln(),
        "sqrt" => value.sqrt(),
        "abs" => value.abs(),
        "round" => value.round(),
        "floor" => value.floor(),
        "ceil" => value.ceil(),
        other => {
            return Err(SwitchboardError::Tool(format!(
                "Unknown math function '{other}'"
            )))
        }
    };
    if !result.is_finite() {
        return Err(SwitchboardError::Tool(format!(
            "{function}({value}) has no finite result"
        )));
    }
    Ok(result)
}

#[async_trait]
impl Tool for MathFunctionTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &ToolContext) -> SwitchboardResult<ToolOutput> {
        let function = args.get_enum("function")?;
        let value = args.get_f64("value")?;
        let degrees = args.get_enum("unit")? == "degree";
        let result = evaluate(function, value, degrees)?;
        Ok(ToolOutput::Json(serde_json::json!({
            "function": function,
            "value": value,
            "result": result,
        })))
    }
}
