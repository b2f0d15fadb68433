//! Reconnect delay policy and the single pending reconnect timer.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// How long to wait before reconnect attempt `n` (1-based).
///
/// There is no attempt limit; retries continue while the user stays authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        base_delay_ms: u64,
        max_delay_ms: u64,
        #[serde(default = "default_jitter")]
        jitter: bool,
    },
}

fn default_jitter() -> bool {
    true
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential {
                base_delay_ms,
                max_delay_ms,
                jitter,
            } => {
                let exp = attempt.saturating_sub(1).min(32);
                let delay = base_delay_ms
                    .saturating_mul(1u64 << exp)
                    .min(max_delay_ms);
                if jitter && delay > 1 {
                    // Equal jitter: half fixed, half random.
                    let half = delay / 2;
                    Duration::from_millis(half + rand::rng().random_range(0..=delay - half))
                } else {
                    Duration::from_millis(delay)
                }
            }
        }
    }
}

/// Owner of the one pending reconnect timer.
///
/// Scheduling always cancels the previous timer first. Each schedule bumps a
/// generation so a firing that raced with a cancel can be recognised and ignored.
#[derive(Debug, Default)]
pub(crate) struct ReconnectTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl ReconnectTimer {
    pub fn schedule<T, F>(&mut self, delay: Duration, tx: mpsc::UnboundedSender<T>, fired: F)
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fired(generation));
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Accept a firing if it belongs to the live timer, consuming it.
    pub fn take_fired(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
