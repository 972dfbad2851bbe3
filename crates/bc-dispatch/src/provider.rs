//! Delivery provider contract and error classification
//!
//! The provider performs the actual delivery of the source message to one
//! recipient. Its failures are reported as a closed [`DeliveryError`] so the
//! worker can route them without string matching. Providers that only expose
//! free-text errors go through [`classify_error_text`].

use async_trait::async_trait;
use bc_common::{DeliveryMode, RecipientId, SourceMessage};
use std::time::Duration;
use thiserror::Error;

/// Trait for delivering the source message to a single recipient
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn deliver(
        &self,
        recipient: RecipientId,
        source: &SourceMessage,
        mode: DeliveryMode,
    ) -> Result<(), DeliveryError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Provider asked us to slow down and wait before retrying
    #[error("Rate limited, retry after {wait:?}")]
    RateLimited { wait: Duration },

    #[error("Recipient blocked the sender")]
    PeerBlocked,

    #[error("Recipient account deleted or deactivated")]
    PeerDeactivated,

    #[error("Invalid recipient id")]
    PeerInvalid,

    #[error("Writing to the chat is forbidden")]
    ChatForbidden,

    #[error("Sender was kicked from the chat")]
    BotKicked,

    #[error("Chat not found")]
    ChatNotFound,

    #[error("{0}")]
    Other(String),
}

impl DeliveryError {
    /// Mandatory wait carried by a rate-limit signal.
    ///
    /// A zero wait means the error is not a rate-limit signal.
    pub fn rate_limit_wait(&self) -> Option<Duration> {
        match self {
            DeliveryError::RateLimited { wait } if !wait.is_zero() => Some(*wait),
            _ => None,
        }
    }

    /// Whether the error means the recipient is permanently unreachable
    pub fn indicates_gone_recipient(&self) -> bool {
        matches!(
            self,
            DeliveryError::PeerBlocked
                | DeliveryError::PeerDeactivated
                | DeliveryError::PeerInvalid
                | DeliveryError::ChatForbidden
                | DeliveryError::BotKicked
                | DeliveryError::ChatNotFound
        )
    }

    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryError::RateLimited { .. } => "rate_limited",
            DeliveryError::PeerBlocked => "peer_blocked",
            DeliveryError::PeerDeactivated => "peer_deactivated",
            DeliveryError::PeerInvalid => "peer_invalid",
            DeliveryError::ChatForbidden => "chat_forbidden",
            DeliveryError::BotKicked => "bot_kicked",
            DeliveryError::ChatNotFound => "chat_not_found",
            DeliveryError::Other(_) => "other",
        }
    }
}

/// Decide whether a terminal error should remove the recipient from the directory
pub fn should_remove(error: &DeliveryError) -> bool {
    error.indicates_gone_recipient()
}

/// Map a provider's free-text error to a [`DeliveryError`].
///
/// Matching is case-insensitive. Rate-limit texts (`FLOOD_WAIT_<secs>`,
/// `retry after <secs>`) with a zero wait fall through to the terminal patterns.
pub fn classify_error_text(text: &str) -> DeliveryError {
    let lower = text.to_ascii_lowercase();

    if let Some(wait) = parse_rate_limit_wait(&lower) {
        return DeliveryError::RateLimited { wait };
    }

    if lower.contains("user_is_blocked") {
        DeliveryError::PeerBlocked
    } else if contains_any(&lower, &["user_is_deleted", "user_deactivated", "input_user_deactivated"]) {
        DeliveryError::PeerDeactivated
    } else if contains_any(&lower, &["peer_id_invalid", "no channel with id"]) {
        DeliveryError::PeerInvalid
    } else if lower.contains("chat_write_forbidden") {
        DeliveryError::ChatForbidden
    } else if lower.contains("bot_kicked") {
        DeliveryError::BotKicked
    } else if lower.contains("chat_not_found") {
        DeliveryError::ChatNotFound
    } else {
        DeliveryError::Other(text.to_string())
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Extract a positive wait from `flood_wait_<n>` or `retry after <n>` (seconds)
fn parse_rate_limit_wait(lower: &str) -> Option<Duration> {
    ["flood_wait_", "retry after "]
        .iter()
        .filter_map(|marker| lower.find(marker).map(|idx| &lower[idx + marker.len()..]))
        .filter_map(|rest| {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        })
        .find(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_gone_recipients() {
        let cases = [
            ("rpc error code 403: USER_IS_BLOCKED", DeliveryError::PeerBlocked),
            ("USER_IS_DELETED", DeliveryError::PeerDeactivated),
            ("[400 INPUT_USER_DEACTIVATED]", DeliveryError::PeerDeactivated),
            ("PEER_ID_INVALID", DeliveryError::PeerInvalid),
            ("no channel with id -1001234", DeliveryError::PeerInvalid),
            ("CHAT_WRITE_FORBIDDEN", DeliveryError::ChatForbidden),
            ("BOT_KICKED", DeliveryError::BotKicked),
            ("chat_not_found", DeliveryError::ChatNotFound),
        ];
        for (text, expected) in cases {
            let classified = classify_error_text(text);
            assert_eq!(classified, expected, "text: {}", text);
            assert!(should_remove(&classified), "text: {}", text);
        }
    }

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(
            classify_error_text("FLOOD_WAIT_17"),
            DeliveryError::RateLimited { wait: Duration::from_secs(17) }
        );
        assert_eq!(
            classify_error_text("Too Many Requests: retry after 3"),
            DeliveryError::RateLimited { wait: Duration::from_secs(3) }
        );
    }

    #[test]
    fn test_zero_flood_wait_is_not_rate_limit() {
        let err = classify_error_text("FLOOD_WAIT_0");
        assert!(matches!(err, DeliveryError::Other(_)));
        assert!(err.rate_limit_wait().is_none());
        assert!(!should_remove(&err));
    }

    #[test]
    fn test_zero_wait_variant_is_not_rate_limit() {
        let err = DeliveryError::RateLimited { wait: Duration::ZERO };
        assert!(err.rate_limit_wait().is_none());
    }

    #[test]
    fn test_unknown_error_kept_verbatim() {
        let err = classify_error_text("MESSAGE_TOO_LONG");
        assert_eq!(err, DeliveryError::Other("MESSAGE_TOO_LONG".to_string()));
        assert!(!should_remove(&err));
    }

    #[test]
    fn test_classifier_is_idempotent() {
        for text in ["USER_IS_BLOCKED", "FLOOD_WAIT_5", "something else", "BOT_KICKED"] {
            let first = classify_error_text(text);
            let second = classify_error_text(text);
            assert_eq!(first, second);
            assert_eq!(should_remove(&first), should_remove(&second));
        }
    }
}
