//! Broadcast Dispatcher
//!
//! Delivers one source message to every recipient in a directory:
//! - BroadcastDispatcher: single-flight run orchestration
//! - WorkerPool: concurrent delivery workers over a shared job queue
//! - PacingController: global permit stream using governor
//! - RemovalTasks: bounded background cleanup of unreachable recipients
//! - OutcomeReporter: started notice, progress edits and final summary
//! - BroadcastCommands: `/broadcast` and `/cancelbroadcast` handlers

pub mod error;
pub mod directory;
pub mod provider;
pub mod request;
pub mod queue;
pub mod pacing;
pub mod state;
pub mod removal;
pub mod reporter;
pub mod pool;
pub mod dispatcher;
pub mod command;
pub mod dispatch_metrics;

pub use error::{DispatchError, DirectoryError, ChannelError, UsageError};
pub use directory::{RecipientDirectory, InMemoryDirectory, Partition, TargetList, collect_targets};
pub use provider::{DeliveryProvider, DeliveryError, classify_error_text, should_remove};
pub use request::{BroadcastRequest, parse_duration};
pub use queue::{Job, JobQueue};
pub use pacing::PacingController;
pub use state::{RunState, RunProgress, SingleFlight, RunGuard};
pub use reporter::{OperatorChannel, NoticeHandle, OutcomeReporter};
pub use pool::{WorkerPool, WorkerContext};
pub use dispatcher::BroadcastDispatcher;
pub use command::{BroadcastCommands, CommandInvocation, HandlerFlow};

pub type Result<T> = std::result::Result<T, DispatchError>;
