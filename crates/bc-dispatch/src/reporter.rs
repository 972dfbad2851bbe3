//! Outcome reporting to the operator
//!
//! The reporter posts the "started" notice, keeps it updated with progress
//! while the run is active, and replaces it with the final summary. All
//! channel traffic is best effort: a failed send or edit is logged and never
//! affects the run's counters.

use async_trait::async_trait;
use bc_common::{DeliveryMode, KindCounts, RunSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

use crate::error::ChannelError;
use crate::state::{RunProgress, RunState};

/// Handle to a notice previously sent to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeHandle(pub i64);

/// Where operator-facing text goes: the chat the command came from
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    async fn reply(&self, text: &str) -> Result<NoticeHandle, ChannelError>;

    async fn edit(&self, notice: NoticeHandle, text: &str) -> Result<(), ChannelError>;
}

pub fn render_started(counts: &KindCounts, total: usize, mode: DeliveryMode, delay: Duration) -> String {
    format!(
        "🚀 Broadcast Started\n\n\
         👥 Users: {}\n\
         💬 Groups: {}\n\
         📢 Channels: {}\n\
         📊 Total: {}\n\
         ⚙ Mode: {}\n\
         ⏱ Delay: {}\n\n\
         Send /cancelbroadcast to stop.",
        counts.users,
        counts.groups,
        counts.channels,
        total,
        mode,
        format_duration(delay),
    )
}

pub fn render_progress(header: &str, progress: &RunProgress) -> String {
    format!(
        "{}\n\n⏳ Progress: {}/{}\n✅ Success: {}\n❌ Failed: {}\n🗑 Removed: {}",
        header,
        progress.processed(),
        progress.total,
        progress.success,
        progress.failed,
        progress.removed,
    )
}

pub fn render_summary(summary: &RunSummary) -> String {
    format!(
        "📢 Broadcast Complete\n\n\
         👥 Total: {}\n\
         ✅ Success: {}\n\
         ❌ Failed: {}\n\
         🗑 Removed: {}\n\
         ⚙ Mode: {}\n\
         🛑 Cancelled: {}\n\
         ⏱ Delay: {}\n\
         ⌛ Elapsed: {}",
        summary.total,
        summary.success,
        summary.failed,
        summary.removed,
        summary.mode,
        summary.cancelled,
        format_duration(summary.pacing_delay),
        format_duration(summary.elapsed),
    )
}

/// Compact human form: `40ms`, `1.5s`, `2m5s`, `1h0m12s`
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1_000 {
        if millis == 0 && !d.is_zero() {
            return format!("{}µs", d.as_micros());
        }
        return format!("{}ms", millis);
    }
    if millis < 60_000 {
        let secs = d.as_secs_f64();
        return if millis % 1_000 == 0 {
            format!("{}s", d.as_secs())
        } else {
            format!("{:.1}s", secs)
        };
    }
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else {
        format!("{}m{}s", m, s)
    }
}

/// Background task editing the started notice until stopped
pub struct ProgressTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressTask {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.handle.await {
            debug!(error = %e, "Progress task ended abnormally");
        }
    }
}

pub struct OutcomeReporter {
    channel: Arc<dyn OperatorChannel>,
    notice: Option<NoticeHandle>,
    header: String,
}

impl OutcomeReporter {
    pub fn new(channel: Arc<dyn OperatorChannel>) -> Self {
        Self {
            channel,
            notice: None,
            header: String::new(),
        }
    }

    /// Send the "started" notice; the handle is kept for later edits
    pub async fn announce(&mut self, text: String) {
        match self.channel.reply(&text).await {
            Ok(handle) => self.notice = Some(handle),
            Err(e) => warn!(error = %e, "Failed to send broadcast started notice"),
        }
        self.header = text;
    }

    /// Periodically edit the started notice with the current counters.
    ///
    /// Returns `None` when there is no notice to edit.
    pub fn spawn_progress(&self, state: Arc<RunState>, interval: Duration) -> Option<ProgressTask> {
        let notice = self.notice?;
        let channel = self.channel.clone();
        let header = self.header.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                let mut last = RunProgress::default();

                loop {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = ticker.tick() => {
                            let progress = state.progress();
                            if progress == last {
                                continue;
                            }
                            last = progress;
                            if let Err(e) = channel.edit(notice, &render_progress(&header, &progress)).await {
                                debug!(error = %e, "Progress edit failed");
                            }
                        }
                    }
                }
            }
            .in_current_span(),
        );

        Some(ProgressTask { stop_tx, handle })
    }

    /// Deliver the final summary, replacing the started notice if possible
    pub async fn finish(&self, summary: &RunSummary) {
        let text = render_summary(summary);

        if let Some(notice) = self.notice {
            match self.channel.edit(notice, &text).await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "Failed to edit summary into started notice, sending new reply"),
            }
        }

        if let Err(e) = self.channel.reply(&text).await {
            warn!(error = %e, run_id = %summary.run_id, "Failed to send broadcast summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(40)), "40ms");
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(Duration::from_secs(3)), "3s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_duration(Duration::from_secs(3612)), "1h0m12s");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }

    #[test]
    fn test_started_notice_lists_counts() {
        let counts = KindCounts { users: 1, groups: 2, channels: 3 };
        let text = render_started(&counts, 5, DeliveryMode::Copy, Duration::from_millis(40));
        assert!(text.contains("Users: 1"));
        assert!(text.contains("Groups: 2"));
        assert!(text.contains("Channels: 3"));
        assert!(text.contains("Total: 5"));
        assert!(text.contains("Mode: Copy"));
        assert!(text.contains("Delay: 40ms"));
    }

    #[test]
    fn test_progress_keeps_header() {
        let progress = RunProgress { total: 10, success: 3, failed: 1, removed: 1 };
        let text = render_progress("HEADER", &progress);
        assert!(text.starts_with("HEADER"));
        assert!(text.contains("Progress: 4/10"));
    }
}
