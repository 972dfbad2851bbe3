use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod logging;

// ============================================================================
// Recipients
// ============================================================================

/// Default magnitude at which a negative chat identifier is treated as a
/// channel/supergroup rather than a basic group.
pub const DEFAULT_CHANNEL_ID_THRESHOLD: i64 = 1_000_000_000_000;

/// Identifier of a broadcast destination.
///
/// The sign and magnitude encode the recipient kind, see [`RecipientKind::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub i64);

impl RecipientId {
    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_user(self) -> bool {
        self.0 > 0
    }
}

impl From<i64> for RecipientId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    User,
    Group,
    Channel,
}

impl RecipientKind {
    /// Classify an identifier by numeric range.
    ///
    /// - positive: user
    /// - negative with magnitude below `channel_threshold`: group
    /// - negative with magnitude at or above `channel_threshold`: channel
    ///
    /// Zero is not a valid recipient and yields `None`.
    pub fn classify(id: RecipientId, channel_threshold: i64) -> Option<Self> {
        match id.0 {
            0 => None,
            n if n > 0 => Some(RecipientKind::User),
            n if n.unsigned_abs() >= channel_threshold.unsigned_abs() => Some(RecipientKind::Channel),
            _ => Some(RecipientKind::Group),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientKind::User => "user",
            RecipientKind::Group => "group",
            RecipientKind::Channel => "channel",
        }
    }
}

impl fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Broadcast Input
// ============================================================================

/// Reference to the message being rebroadcast: the chat it lives in and its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMessage {
    pub chat_id: i64,
    pub message_id: i64,
}

impl SourceMessage {
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self { chat_id, message_id }
    }
}

/// How the source message reaches each recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Attributed forward ("forwarded from ...")
    #[default]
    Forward,
    /// New unattributed message
    Copy,
}

impl DeliveryMode {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryMode::Forward => "Forward",
            DeliveryMode::Copy => "Copy",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Runtime settings of the broadcast dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Number of concurrent delivery workers
    pub workers: usize,
    /// Requeues allowed per job after rate-limit signals
    pub max_retries: u32,
    /// Pacing cadence used when the command gives no delay
    pub default_rate_per_second: u32,
    /// Magnitude separating groups from channels
    pub channel_id_threshold: i64,
    /// Interval between progress edits (0 disables them)
    pub progress_interval_ms: u64,
    /// Maximum directory removals running at once
    pub removal_concurrency: usize,
    /// How long a finished run waits for outstanding removals
    pub removal_drain_timeout_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            max_retries: 2,
            default_rate_per_second: 25,
            channel_id_threshold: DEFAULT_CHANNEL_ID_THRESHOLD,
            progress_interval_ms: 5_000,
            removal_concurrency: 8,
            removal_drain_timeout_ms: 10_000,
        }
    }
}

impl BroadcastConfig {
    /// Pacing interval derived from `default_rate_per_second`.
    pub fn default_pacing_interval(&self) -> Duration {
        let rate = self.default_rate_per_second.max(1);
        Duration::from_nanos(1_000_000_000 / rate as u64)
    }

    pub fn progress_interval(&self) -> Option<Duration> {
        (self.progress_interval_ms > 0).then(|| Duration::from_millis(self.progress_interval_ms))
    }

    pub fn removal_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.removal_drain_timeout_ms)
    }
}

// ============================================================================
// Run Reporting
// ============================================================================

/// Recipient counts per kind after partitioning, before exclusions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub users: usize,
    pub groups: usize,
    pub channels: usize,
}

/// Final tally of a broadcast run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub removed: u64,
    pub mode: DeliveryMode,
    pub cancelled: bool,
    #[serde(with = "duration_millis")]
    pub pacing_delay: Duration,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl RunSummary {
    /// True once every job has been accounted for.
    pub fn is_balanced(&self) -> bool {
        self.success + self.failed == self.total
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_range() {
        let t = DEFAULT_CHANNEL_ID_THRESHOLD;
        assert_eq!(RecipientKind::classify(RecipientId(123456), t), Some(RecipientKind::User));
        assert_eq!(RecipientKind::classify(RecipientId(-123456), t), Some(RecipientKind::Group));
        assert_eq!(
            RecipientKind::classify(RecipientId(-1000000000123), t),
            Some(RecipientKind::Channel)
        );
        assert_eq!(RecipientKind::classify(RecipientId(0), t), None);
    }

    #[test]
    fn test_classify_threshold_boundary() {
        let t = DEFAULT_CHANNEL_ID_THRESHOLD;
        assert_eq!(RecipientKind::classify(RecipientId(-t), t), Some(RecipientKind::Channel));
        assert_eq!(RecipientKind::classify(RecipientId(-(t - 1)), t), Some(RecipientKind::Group));
        assert_eq!(RecipientKind::classify(RecipientId(i64::MIN), t), Some(RecipientKind::Channel));
    }

    #[test]
    fn test_custom_threshold() {
        assert_eq!(RecipientKind::classify(RecipientId(-500), 100), Some(RecipientKind::Channel));
        assert_eq!(RecipientKind::classify(RecipientId(-50), 100), Some(RecipientKind::Group));
    }

    #[test]
    fn test_default_pacing_interval() {
        let config = BroadcastConfig::default();
        assert_eq!(config.default_pacing_interval(), Duration::from_millis(40));
        assert_eq!(config.workers, 20);
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_progress_interval_disabled() {
        let config = BroadcastConfig { progress_interval_ms: 0, ..Default::default() };
        assert!(config.progress_interval().is_none());
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = RunSummary {
            run_id: "r1".to_string(),
            started_at: Utc::now(),
            total: 3,
            success: 2,
            failed: 1,
            removed: 0,
            mode: DeliveryMode::Copy,
            cancelled: false,
            pacing_delay: Duration::from_millis(40),
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["pacingDelay"], 40);
        assert_eq!(json["mode"], "copy");
        assert!(summary.is_balanced());
    }
}
