//! Simulated collaborators for local runs
//!
//! `SimulatedProvider` fails a configurable share of deliveries with the
//! same error texts a real messaging platform returns, so they go through
//! `classify_error_text` like production traffic would. `ConsoleChannel`
//! prints operator notices to stdout.

use async_trait::async_trait;
use bc_common::{DeliveryMode, RecipientId, SourceMessage};
use bc_dispatch::{classify_error_text, ChannelError, DeliveryError, DeliveryProvider, NoticeHandle, OperatorChannel};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::debug;

const TERMINAL_ERRORS: &[&str] = &[
    "rpc error code 403: USER_IS_BLOCKED",
    "rpc error code 400: INPUT_USER_DEACTIVATED",
    "rpc error code 403: CHAT_WRITE_FORBIDDEN",
    "rpc error code 400: PEER_ID_INVALID",
    "rpc error code 500: INTERNAL",
];

/// Fault injection settings
#[derive(Debug, Clone, Copy)]
pub struct FaultProfile {
    /// Probability of a terminal error per attempt
    pub failure_rate: f64,
    /// Probability of a rate-limit signal per attempt
    pub rate_limit_rate: f64,
    /// Wait carried by rate-limit signals
    pub flood_wait_secs: u64,
    /// Upper bound of the random per-call latency
    pub max_latency_ms: u64,
}

enum Roll {
    Deliver,
    RateLimit,
    Fail(&'static str),
}

pub struct SimulatedProvider {
    profile: FaultProfile,
}

impl SimulatedProvider {
    pub fn new(profile: FaultProfile) -> Self {
        Self { profile }
    }

    fn roll(&self) -> (Roll, Duration) {
        let mut rng = rand::rng();
        let latency = if self.profile.max_latency_ms > 0 {
            Duration::from_millis(rng.random_range(0..=self.profile.max_latency_ms))
        } else {
            Duration::ZERO
        };

        let p: f64 = rng.random();
        let roll = if p < self.profile.rate_limit_rate {
            Roll::RateLimit
        } else if p < self.profile.rate_limit_rate + self.profile.failure_rate {
            Roll::Fail(TERMINAL_ERRORS[rng.random_range(0..TERMINAL_ERRORS.len())])
        } else {
            Roll::Deliver
        };
        (roll, latency)
    }
}

#[async_trait]
impl DeliveryProvider for SimulatedProvider {
    async fn deliver(
        &self,
        recipient: RecipientId,
        source: &SourceMessage,
        mode: DeliveryMode,
    ) -> Result<(), DeliveryError> {
        let (roll, latency) = self.roll();
        tokio::time::sleep(latency).await;

        match roll {
            Roll::Deliver => {
                debug!(%recipient, chat_id = source.chat_id, message_id = source.message_id, %mode, "Delivered");
                Ok(())
            }
            Roll::RateLimit => Err(classify_error_text(&format!(
                "rpc error code 420: FLOOD_WAIT_{}",
                self.profile.flood_wait_secs
            ))),
            Roll::Fail(text) => Err(classify_error_text(text)),
        }
    }
}

/// Operator channel printing to stdout.
///
/// Rejects edits that would not change the text, as chat platforms do.
#[derive(Default)]
pub struct ConsoleChannel {
    next_id: AtomicI64,
    texts: parking_lot::Mutex<HashMap<NoticeHandle, String>>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperatorChannel for ConsoleChannel {
    async fn reply(&self, text: &str) -> Result<NoticeHandle, ChannelError> {
        let handle = NoticeHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        println!("\n[notice #{}]\n{}", handle.0, text);
        self.texts.lock().insert(handle, text.to_string());
        Ok(handle)
    }

    async fn edit(&self, notice: NoticeHandle, text: &str) -> Result<(), ChannelError> {
        let mut texts = self.texts.lock();
        match texts.get(&notice) {
            None => return Err(ChannelError::Edit(format!("notice {} not found", notice.0))),
            Some(current) if current == text => {
                return Err(ChannelError::Edit("message is not modified".to_string()))
            }
            Some(_) => {}
        }
        println!("\n[notice #{} edited]\n{}", notice.0, text);
        texts.insert(notice, text.to_string());
        Ok(())
    }
}
