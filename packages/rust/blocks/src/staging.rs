//! Single-slot staging area for a prepared layout, valid for a fixed window.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use plone_mcp_shared::BlockSet;

use crate::collaborators::Clock;

/// How long a staged layout stays usable.
pub const STAGING_TTL_SECS: i64 = 60;

/// A prepared block collection and the moment it was staged.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedLayout {
    pub set: BlockSet,
    pub created_at: DateTime<Utc>,
}

impl StagedLayout {
    /// Expired once strictly more than the TTL has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > TimeDelta::seconds(STAGING_TTL_SECS)
    }
}

/// Holds at most one staged layout. Staging again replaces it.
pub struct StagingSlot {
    slot: Mutex<Option<StagedLayout>>,
    clock: Arc<dyn Clock>,
}

impl StagingSlot {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            clock,
        }
    }

    /// Store `set`, replacing whatever was staged before.
    pub async fn stage(&self, set: BlockSet) {
        let staged = StagedLayout {
            set,
            created_at: self.clock.now(),
        };
        let replaced = self.slot.lock().await.replace(staged).is_some();
        debug!(replaced, "layout staged");
    }

    /// Remove the staged layout, returning it only if it has not expired.
    pub async fn take(&self) -> Option<BlockSet> {
        let staged = self.slot.lock().await.take()?;
        if staged.is_expired(self.clock.now()) {
            info!("staged layout expired, discarding");
            return None;
        }
        Some(staged.set)
    }

    pub async fn clear(&self) {
        if self.slot.lock().await.take().is_some() {
            debug!("staged layout cleared");
        }
    }

    /// Whether a non-expired layout is waiting.
    pub async fn is_staged(&self) -> bool {
        let now = self.clock.now();
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|staged| !staged.is_expired(now))
    }
}
