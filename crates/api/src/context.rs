use chrono::Utc;

use imprint_core::{Actor, UserId};

/// Acting user for a request.
///
/// Inserted by the actor middleware; present for every route except `/health`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    user_id: UserId,
}

impl ActorContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Audit stamp for a mutation happening now.
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, Utc::now())
    }
}
