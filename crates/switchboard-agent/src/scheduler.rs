use crate::admission::AdmissionController;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{Channel, SwitchboardError, SwitchboardResult};
use switchboard_store::ChannelRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Bounded retry-with-delay over the channels serving a model.
///
/// Each round walks the channels in priority order: acquire a slot, probe
/// health, dispatch. The first dispatch ends the whole run whatever its
/// outcome, and the slot is released either way. Rounds only advance when no
/// channel could be dispatched to at all.
///
/// A dispatch that fails before producing anything is not retried on a
/// lower-priority channel. This is probably a gap rather than intent: a
/// transient blip on the top channel fails the call even when others are
/// healthy.
pub struct RetryScheduler {
    admission: Arc<AdmissionController>,
    registry: ChannelRegistry,
    retry_delay: Duration,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl RetryScheduler {
    /// Scheduler waiting `retry_delay` between rounds.
    pub fn new(
        admission: Arc<AdmissionController>,
        registry: ChannelRegistry,
        retry_delay: Duration,
    ) -> Self {
        Self {
            admission,
            registry,
            retry_delay,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    /// Run `dispatch` on the first channel that admits the request.
    ///
    /// Fails with `NotConfigured` when no channel serves `model`, with
    /// `CapacityExhausted` after `max_rounds` rounds without a dispatch and
    /// with `Cancelled` when `cancel` fires between attempts.
    pub async fn run<T, F, Fut>(
        &self,
        model: &str,
        max_rounds: u32,
        cancel: &CancellationToken,
        mut dispatch: F,
    ) -> SwitchboardResult<T>
    where
        F: FnMut(Channel) -> Fut,
        Fut: Future<Output = SwitchboardResult<T>>,
    {
        let channels = self.registry.list_channels(model).await?;
        if channels.is_empty() {
            warn!(model, "No channel configured for model");
            return Err(SwitchboardError::NotConfigured(format!(
                "no channel is configured for model '{model}'"
            )));
        }

        for round in 0..max_rounds {
            for channel in &channels {
                if cancel.is_cancelled() {
                    return Err(SwitchboardError::Cancelled);
                }

                let Some(slot) = self.admission.try_acquire(channel).await? else {
                    continue;
                };
                if !self.admission.health_check(channel).await {
                    warn!(channel = channel.id, model, "Channel unhealthy, skipping");
                    slot.release().await;
                    continue;
                }

                info!(channel = channel.id, model, round, "Dispatching request");
                let result = dispatch(channel.clone()).await;
                slot.release().await;
                if let Err(e) = &result {
                    error!(channel = channel.id, model, error = %e, "Dispatch failed");
                }
                return result;
            }

            if round + 1 < max_rounds {
                info!(
                    model,
                    round,
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "Every channel busy, waiting for next round"
                );
                self.wait(cancel).await?;
            }
        }

        warn!(model, rounds = max_rounds, "Capacity exhausted");
        Err(SwitchboardError::CapacityExhausted(format!(
            "every channel serving '{model}' is busy"
        )))
    }

    async fn wait(&self, cancel: &CancellationToken) -> SwitchboardResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SwitchboardError::Cancelled),
            _ = self.do_sleep(self.retry_delay.as_millis() as u64) => Ok(()),
        }
    }

    /// Perform a sleep for the given duration in milliseconds.
    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
