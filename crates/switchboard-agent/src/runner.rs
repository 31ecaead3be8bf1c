use crate::backends::BackendAdapter;
use crate::stream::cumulative;
use futures_util::StreamExt;
use std::sync::Arc;
use switchboard_core::{
    Channel, ConversationTurn, SwitchboardError, SwitchboardResult, ToolInvocationRequest,
    Transcript,
};
use switchboard_tools::{strip_thinking, ToolContext, ToolRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sent to the caller when every cycle ended in a tool call.
pub const EXHAUSTED_MESSAGE: &str = "I seem to be stuck in a loop trying to use tools. Please try rephrasing your request or check tool definitions.";

/// How an agent loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The backend produced a plain answer.
    Answered {
        /// Final answer, trimmed.
        text: String,
        /// Backend calls made.
        cycles: u32,
    },
    /// Every cycle ended in a tool call.
    Exhausted {
        /// Backend calls made.
        cycles: u32,
    },
}

/// The bounded "ask, detect tool call, execute, feed back" loop.
/// Prompt → backend → tool call → execute → feedback turn → repeat.
pub struct AgentLoop {
    tools: Arc<ToolRegistry>,
    max_cycles: u32,
}

impl AgentLoop {
    /// Loop over `tools`, allowing at most `max_cycles` backend calls.
    pub fn new(tools: Arc<ToolRegistry>, max_cycles: u32) -> Self {
        Self { tools, max_cycles }
    }

    /// Drive `adapter` until it answers or the cycle budget runs out.
    ///
    /// Growing snapshots of each cycle's text go to `snapshots`. An answered
    /// loop ends with a snapshot of the trimmed answer; an exhausted one with
    /// [`EXHAUSTED_MESSAGE`]. A closed `snapshots` receiver counts as
    /// cancellation.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        adapter: &dyn BackendAdapter,
        channel: &Channel,
        model: &str,
        mut transcript: Transcript,
        ctx: &ToolContext,
        cancel: &CancellationToken,
        snapshots: &mpsc::Sender<String>,
    ) -> SwitchboardResult<LoopOutcome> {
        info!(request_id = %ctx.request_id, chat_id = ctx.chat_id, model, "Starting agent loop");

        for cycle in 0..self.max_cycles {
            if cancel.is_cancelled() {
                return Err(SwitchboardError::Cancelled);
            }

            let stream = adapter
                .stream_execute(&transcript, model, channel, cancel.clone())
                .await?;
            let text = forward_snapshots(stream, cancel, snapshots).await?;
            transcript.push(ConversationTurn::assistant(text.clone()));

            let visible = strip_thinking(&text);
            if visible.is_empty() {
                warn!(request_id = %ctx.request_id, cycle, "Empty response from backend, continuing");
                continue;
            }

            match self.tools.try_parse_tool_call(&visible) {
                Some(call) => {
                    let feedback = self.invoke(&call, ctx).await;
                    transcript.push(ConversationTurn::user(feedback));
                }
                None => {
                    let answer = text.trim().to_string();
                    send(snapshots, answer.clone()).await?;
                    info!(request_id = %ctx.request_id, cycles = cycle + 1, "Agent loop answered");
                    return Ok(LoopOutcome::Answered {
                        text: answer,
                        cycles: cycle + 1,
                    });
                }
            }
        }

        warn!(request_id = %ctx.request_id, cycles = self.max_cycles, "Tool cycle budget exhausted");
        send(snapshots, EXHAUSTED_MESSAGE.to_string()).await?;
        Ok(LoopOutcome::Exhausted {
            cycles: self.max_cycles,
        })
    }

    /// Execute one call and render the feedback turn. Failures never abort the loop.
    async fn invoke(&self, call: &ToolInvocationRequest, ctx: &ToolContext) -> String {
        info!(request_id = %ctx.request_id, tool = %call.name, args = ?call.arguments, "Tool requested");
        match self.tools.execute(call, ctx).await {
            Ok(output) => {
                info!(request_id = %ctx.request_id, tool = %call.name, "Tool executed");
                format!(
                    "[Executed Tool '{}'. Result: {}]",
                    call.name,
                    output.to_feedback_string()
                )
            }
            Err(e) => {
                warn!(request_id = %ctx.request_id, tool = %call.name, error = %e, "Tool execution failed");
                let detail = match e {
                    SwitchboardError::Tool(msg) => msg,
                    other => other.to_string(),
                };
                format!(
                    "[Tool '{name}' Execution Failed. Error: Error executing tool {name}: {detail}.]",
                    name = call.name
                )
            }
        }
    }
}

async fn send(snapshots: &mpsc::Sender<String>, text: String) -> SwitchboardResult<()> {
    snapshots
        .send(text)
        .await
        .map_err(|_| SwitchboardError::Cancelled)
}

/// Forward every snapshot of one streamed reply and return its full text.
async fn forward_snapshots(
    stream: crate::backends::TextStream,
    cancel: &CancellationToken,
    snapshots: &mpsc::Sender<String>,
) -> SwitchboardResult<String> {
    let mut growing = std::pin::pin!(cumulative(stream));
    let mut text = String::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(SwitchboardError::Cancelled),
            next = growing.next() => next,
        };
        match next {
            Some(Ok(snapshot)) => {
                if snapshot.len() != text.len() {
                    send(snapshots, snapshot.clone()).await?;
                }
                text = snapshot;
            }
            Some(Err(e)) => return Err(e),
            None => return Ok(text),
        }
    }
}
