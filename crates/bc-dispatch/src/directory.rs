//! Recipient directory contract, in-memory backend and target assembly

use async_trait::async_trait;
use bc_common::{KindCounts, RecipientId, RecipientKind};
use indexmap::IndexSet;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::DirectoryError;
use crate::request::BroadcastRequest;

/// Persistent store of known recipients
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<RecipientId>, DirectoryError>;

    async fn list_chats(&self) -> Result<Vec<RecipientId>, DirectoryError>;

    async fn remove_user(&self, id: RecipientId) -> Result<(), DirectoryError>;

    async fn remove_chat(&self, id: RecipientId) -> Result<(), DirectoryError>;
}

/// Recipients split by kind, each list in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub users: Vec<RecipientId>,
    pub groups: Vec<RecipientId>,
    pub channels: Vec<RecipientId>,
}

impl Partition {
    /// Classify every identifier, dropping duplicates and invalid ids
    pub fn from_ids<I>(ids: I, channel_threshold: i64) -> Self
    where
        I: IntoIterator<Item = RecipientId>,
    {
        let unique: IndexSet<RecipientId> = ids.into_iter().collect();
        let mut partition = Partition::default();

        for id in unique {
            match RecipientKind::classify(id, channel_threshold) {
                Some(RecipientKind::User) => partition.users.push(id),
                Some(RecipientKind::Group) => partition.groups.push(id),
                Some(RecipientKind::Channel) => partition.channels.push(id),
                None => debug!(recipient = %id, "Skipping invalid recipient id"),
            }
        }

        partition
    }

    pub fn counts(&self) -> KindCounts {
        KindCounts {
            users: self.users.len(),
            groups: self.groups.len(),
            channels: self.channels.len(),
        }
    }

    /// Build the target list as `groups ++ channels ++ users`, honouring the
    /// request's exclusions, then truncate to its limit.
    pub fn assemble(&self, request: &BroadcastRequest) -> Vec<RecipientId> {
        let mut targets = Vec::with_capacity(self.users.len() + self.groups.len() + self.channels.len());

        if !request.skip_groups {
            targets.extend_from_slice(&self.groups);
        }
        if !request.skip_channels {
            targets.extend_from_slice(&self.channels);
        }
        if !request.skip_users {
            targets.extend_from_slice(&self.users);
        }
        if let Some(limit) = request.limit {
            targets.truncate(limit.get());
        }

        targets
    }
}

/// Ordered targets for one run plus the per-kind counts shown to the operator
#[derive(Debug, Clone, Default)]
pub struct TargetList {
    pub counts: KindCounts,
    pub targets: Vec<RecipientId>,
}

impl TargetList {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }
}

/// Query the directory and assemble the targets for `request`.
///
/// A failing listing contributes no recipients; it never fails the run.
pub async fn collect_targets(
    directory: &dyn RecipientDirectory,
    request: &BroadcastRequest,
    channel_threshold: i64,
) -> TargetList {
    let chats = directory.list_chats().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to list chats, treating as empty");
        Vec::new()
    });
    let users = directory.list_users().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to list users, treating as empty");
        Vec::new()
    });

    let partition = Partition::from_ids(chats.into_iter().chain(users), channel_threshold);
    let targets = partition.assemble(request);

    debug!(
        users = partition.users.len(),
        groups = partition.groups.len(),
        channels = partition.channels.len(),
        targets = targets.len(),
        "Targets assembled"
    );

    TargetList {
        counts: partition.counts(),
        targets,
    }
}

/// Seed file format: `{"users": [..], "chats": [..]}`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeedFile {
    users: Vec<RecipientId>,
    chats: Vec<RecipientId>,
}

/// Thread-safe in-memory directory preserving insertion order
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<IndexSet<RecipientId>>,
    chats: RwLock<IndexSet<RecipientId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipients<U, C>(users: U, chats: C) -> Self
    where
        U: IntoIterator<Item = RecipientId>,
        C: IntoIterator<Item = RecipientId>,
    {
        Self {
            users: RwLock::new(users.into_iter().collect()),
            chats: RwLock::new(chats.into_iter().collect()),
        }
    }

    /// Load recipients from a JSON seed file
    pub fn from_seed_file<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DirectoryError::Seed(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_seed_json(&content)
    }

    pub fn from_seed_json(json: &str) -> Result<Self, DirectoryError> {
        let seed: SeedFile = serde_json::from_str(json)
            .map_err(|e| DirectoryError::Seed(e.to_string()))?;
        Ok(Self::with_recipients(seed.users, seed.chats))
    }

    pub fn add_user(&self, id: RecipientId) -> bool {
        self.users.write().insert(id)
    }

    pub fn add_chat(&self, id: RecipientId) -> bool {
        self.chats.write().insert(id)
    }

    pub fn contains(&self, id: RecipientId) -> bool {
        self.users.read().contains(&id) || self.chats.read().contains(&id)
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    pub fn chat_count(&self) -> usize {
        self.chats.read().len()
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryDirectory {
    async fn list_users(&self) -> Result<Vec<RecipientId>, DirectoryError> {
        Ok(self.users.read().iter().copied().collect())
    }

    async fn list_chats(&self) -> Result<Vec<RecipientId>, DirectoryError> {
        Ok(self.chats.read().iter().copied().collect())
    }

    async fn remove_user(&self, id: RecipientId) -> Result<(), DirectoryError> {
        if self.users.write().shift_remove(&id) {
            Ok(())
        } else {
            Err(DirectoryError::NotFound(id))
        }
    }

    async fn remove_chat(&self, id: RecipientId) -> Result<(), DirectoryError> {
        if self.chats.write().shift_remove(&id) {
            Ok(())
        } else {
            Err(DirectoryError::NotFound(id))
        }
    }
}
