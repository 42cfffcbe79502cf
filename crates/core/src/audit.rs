//! Record metadata and the acting user.
//!
//! Every persisted entity embeds one [`RecordMeta`] rather than repeating the
//! four audit columns. Mutating operations take an explicit [`Actor`]; there is
//! no ambient "current user".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// The authenticated user performing an operation, plus the business time it
/// happens at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Actor {
    user_id: UserId,
    at: DateTime<Utc>,
}

impl Actor {
    pub fn new(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self { user_id, at }
    }

    /// Actor stamped with the current wall-clock time.
    pub fn now(user_id: UserId) -> Self {
        Self::new(user_id, Utc::now())
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Audit columns shared by all entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordMeta {
    /// Metadata for a row created by `actor`.
    pub fn created(actor: &Actor) -> Self {
        Self {
            created_by: Some(actor.user_id()),
            updated_by: Some(actor.user_id()),
            created_at: actor.at(),
            updated_at: actor.at(),
        }
    }

    /// Metadata for a row created on behalf of someone else: ownership columns
    /// are carried over from `owner`, timestamps come from `actor`.
    pub fn inherited(owner: &RecordMeta, actor: &Actor) -> Self {
        Self {
            created_by: owner.created_by,
            updated_by: owner.updated_by,
            created_at: actor.at(),
            updated_at: actor.at(),
        }
    }

    /// Stamp an update by `actor`.
    pub fn touch(&mut self, actor: &Actor) {
        self.updated_by = Some(actor.user_id());
        self.updated_at = actor.at();
    }
}
