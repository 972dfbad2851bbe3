//! Broadcast request and command flag parsing

use bc_common::{DeliveryMode, SourceMessage};
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::error::UsageError;

/// Input to one broadcast run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    pub source: SourceMessage,
    pub mode: DeliveryMode,
    pub skip_users: bool,
    pub skip_groups: bool,
    pub skip_channels: bool,
    /// Cap on the number of targets, applied after concatenation
    pub limit: Option<NonZeroUsize>,
    /// Fixed pacing interval overriding the configured default
    pub delay: Option<Duration>,
}

impl BroadcastRequest {
    pub fn new(source: SourceMessage) -> Self {
        Self {
            source,
            mode: DeliveryMode::Forward,
            skip_users: false,
            skip_groups: false,
            skip_channels: false,
            limit: None,
            delay: None,
        }
    }

    /// Parse command arguments such as `-copy nochats limit 100 delay 50ms`.
    ///
    /// Flags may carry a leading `-`. Unknown words are ignored.
    pub fn from_args(source: SourceMessage, args: &str) -> Result<Self, UsageError> {
        let mut request = Self::new(source);
        let mut words = args.split_whitespace();

        while let Some(word) = words.next() {
            let flag = word.trim_start_matches('-').to_ascii_lowercase();
            match flag.as_str() {
                "copy" => request.mode = DeliveryMode::Copy,
                "nochat" | "nochats" => request.skip_groups = true,
                "nouser" | "nousers" => request.skip_users = true,
                "nochannel" | "nochannels" => request.skip_channels = true,
                "limit" => {
                    let value = words.next().ok_or(UsageError::MissingValue("limit"))?;
                    request.limit = Some(parse_limit(value)?);
                }
                "delay" => {
                    let value = words.next().ok_or(UsageError::MissingValue("delay"))?;
                    request.delay = Some(parse_delay(value)?);
                }
                _ => {}
            }
        }

        Ok(request)
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = NonZeroUsize::new(limit);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

fn parse_limit(value: &str) -> Result<NonZeroUsize, UsageError> {
    value
        .parse::<NonZeroUsize>()
        .map_err(|_| UsageError::InvalidLimit(value.to_string()))
}

fn parse_delay(value: &str) -> Result<Duration, UsageError> {
    parse_duration(value)
        .filter(|d| !d.is_zero())
        .ok_or_else(|| UsageError::InvalidDelay(value.to_string()))
}

/// Parse a duration written as a sequence of decimal numbers with unit
/// suffixes, e.g. `300ms`, `1.5s`, `1m30s`. Valid units are `ns`, `us`
/// (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(Duration::ZERO);
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}
