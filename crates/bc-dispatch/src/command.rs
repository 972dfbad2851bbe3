//! Operator command handlers: `/broadcast` and `/cancelbroadcast`
//!
//! Both handlers always answer the operator and end the command group, so no
//! further handlers run for the same invocation.

use bc_common::SourceMessage;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::dispatcher::BroadcastDispatcher;
use crate::error::{DispatchError, UsageError};
use crate::reporter::OperatorChannel;
use crate::request::BroadcastRequest;

pub const USAGE: &str = "❗ Reply to a message to broadcast.\n\n\
    Flags:\n\
    -copy - Send as copy (hide forward tag)\n\
    -nochats - Skip groups\n\
    -nousers - Skip users\n\
    -nochannels - Skip channels\n\
    -limit <N> - Deliver to at most N recipients\n\
    -delay <duration> - Pause between deliveries (e.g. 50ms, 1s)\n\n\
    Example: /broadcast -copy -limit 100";

pub const ALREADY_RUNNING: &str =
    "❗ A broadcast is already in progress. Please wait for it to complete or cancel it with /cancelbroadcast";

pub const NO_TARGETS: &str = "❗ No targets found.";

pub const CANCELLED: &str = "🚫 Broadcast cancelled.";

pub const NOTHING_TO_CANCEL: &str = "ℹ No broadcast is in progress.";

/// What the command router should do after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFlow {
    Continue,
    EndGroup,
}

/// One invocation of the broadcast command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Message the command replied to, if any
    pub reply_to: Option<SourceMessage>,
    /// Raw argument text after the command name
    pub args: String,
}

impl CommandInvocation {
    pub fn new(reply_to: Option<SourceMessage>, args: impl Into<String>) -> Self {
        Self {
            reply_to,
            args: args.into(),
        }
    }
}

pub struct BroadcastCommands {
    dispatcher: Arc<BroadcastDispatcher>,
}

impl BroadcastCommands {
    pub fn new(dispatcher: Arc<BroadcastDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<BroadcastDispatcher> {
        &self.dispatcher
    }

    /// Handle `/broadcast [flags]`. Runs the whole broadcast before returning.
    pub async fn handle_broadcast(
        &self,
        invocation: CommandInvocation,
        channel: Arc<dyn OperatorChannel>,
    ) -> HandlerFlow {
        let request = match parse_invocation(&invocation) {
            Ok(request) => request,
            Err(e) => {
                info!(error = %e, args = %invocation.args, "Rejected broadcast command");
                let text = match e {
                    UsageError::MissingSource => USAGE.to_string(),
                    other => format!("❗ {}\n\n{}", other, USAGE),
                };
                send(channel.as_ref(), &text).await;
                return HandlerFlow::EndGroup;
            }
        };

        match self.dispatcher.broadcast(request, channel.clone()).await {
            Ok(summary) => {
                info!(run_id = %summary.run_id, "Broadcast command finished");
            }
            Err(DispatchError::AlreadyRunning) => send(channel.as_ref(), ALREADY_RUNNING).await,
            Err(DispatchError::NoTargets) => send(channel.as_ref(), NO_TARGETS).await,
            Err(e) => {
                error!(error = %e, "Broadcast could not start");
                send(channel.as_ref(), &format!("❗ {}", e)).await;
            }
        }

        HandlerFlow::EndGroup
    }

    /// Handle `/cancelbroadcast`. Any run holding the guard is cancelled,
    /// including one still resolving its targets.
    pub async fn handle_cancel(&self, channel: Arc<dyn OperatorChannel>) -> HandlerFlow {
        let text = if self.dispatcher.cancel() { CANCELLED } else { NOTHING_TO_CANCEL };
        send(channel.as_ref(), text).await;
        HandlerFlow::EndGroup
    }
}

fn parse_invocation(invocation: &CommandInvocation) -> Result<BroadcastRequest, UsageError> {
    let source = invocation.reply_to.ok_or(UsageError::MissingSource)?;
    BroadcastRequest::from_args(source, &invocation.args)
}

async fn send(channel: &dyn OperatorChannel, text: &str) {
    if let Err(e) = channel.reply(text).await {
        warn!(error = %e, "Failed to reply to operator");
    }
}
