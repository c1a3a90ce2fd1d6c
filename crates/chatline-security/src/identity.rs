use std::sync::RwLock;

use chatline_common::{ActorId, Error, Result};

/// Supplies the authenticated actor for the current caller.
///
/// Session issuance lives elsewhere; this is only the precondition check,
/// and it fails closed.
pub trait IdentityProvider: Send + Sync {
    fn current_actor(&self) -> Result<ActorId>;
}

/// Identity fixed at construction, switchable on sign-in / sign-out.
pub struct StaticIdentity {
    actor: RwLock<Option<ActorId>>,
}

impl StaticIdentity {
    pub fn signed_in(actor: impl Into<ActorId>) -> Self {
        Self {
            actor: RwLock::new(Some(actor.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            actor: RwLock::new(None),
        }
    }

    pub fn sign_in(&self, actor: impl Into<ActorId>) {
        *self.actor.write().unwrap_or_else(|e| e.into_inner()) = Some(actor.into());
    }

    pub fn sign_out(&self) {
        *self.actor.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> Result<ActorId> {
        let guard = self.actor.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(actor) if !actor.as_str().trim().is_empty() => Ok(actor.clone()),
            Some(_) => Err(Error::Auth("actor id is empty".to_string())),
            None => Err(Error::Auth("no authenticated actor".to_string())),
        }
    }
}
