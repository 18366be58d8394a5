//! Symmetric connection → partner mapping.
//!
//! [`SessionRegistry`] is the single source of truth for "who is matched
//! with whom". Every mutation keeps the mapping symmetric and irreflexive;
//! a request that would break either property is rejected with
//! [`MatchError::InvariantViolation`] and leaves the registry untouched.

use std::collections::HashMap;

use super::{ConnectionId, SessionId};
use crate::error::MatchError;

/// One side's view of a registered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    /// The other connection of the pair.
    pub partner: ConnectionId,
    /// Session both connections share.
    pub session_id: SessionId,
}

/// Symmetric, irreflexive partner registry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    partners: HashMap<ConnectionId, Pairing>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `a` ↔ `b` as partners in `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] if `a == b` or either
    /// connection already has a partner.
    pub fn pair(
        &mut self,
        a: ConnectionId,
        b: ConnectionId,
        session_id: SessionId,
    ) -> Result<(), MatchError> {
        if a == b {
            return Err(MatchError::invariant(format!(
                "connection {a} cannot be paired with itself"
            )));
        }
        if let Some(existing) = self.partners.get(&a).or_else(|| self.partners.get(&b)) {
            return Err(MatchError::invariant(format!(
                "pairing {a} with {b} would overwrite session {}",
                existing.session_id
            )));
        }
        self.partners.insert(a, Pairing { partner: b, session_id });
        self.partners.insert(b, Pairing { partner: a, session_id });
        Ok(())
    }

    /// Removes the pair containing `conn` and returns it as seen from `conn`.
    ///
    /// Returns `Ok(None)` if `conn` is not paired, which makes teardown
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] if the partner's entry does
    /// not point back at `conn`. The entry of `conn` is dropped either way;
    /// a partner entry that belongs to another pair is left in place.
    pub fn unpair(&mut self, conn: ConnectionId) -> Result<Option<Pairing>, MatchError> {
        let Some(pairing) = self.partners.remove(&conn) else {
            return Ok(None);
        };
        match self.partners.remove(&pairing.partner) {
            Some(back) if back.partner == conn && back.session_id == pairing.session_id => {
                Ok(Some(pairing))
            }
            Some(back) => {
                self.partners.insert(pairing.partner, back);
                Err(MatchError::invariant(format!(
                    "registry asymmetric: {conn} -> {} but {} -> {}",
                    pairing.partner, pairing.partner, back.partner
                )))
            }
            None => Err(MatchError::invariant(format!(
                "registry asymmetric: {conn} -> {} has no reverse entry",
                pairing.partner
            ))),
        }
    }

    /// Returns the partner of `conn`, if any.
    #[must_use]
    pub fn partner_of(&self, conn: ConnectionId) -> Option<ConnectionId> {
        self.partners.get(&conn).map(|p| p.partner)
    }

    /// Returns the full pairing of `conn`, if any.
    #[must_use]
    pub fn pairing_of(&self, conn: ConnectionId) -> Option<Pairing> {
        self.partners.get(&conn).copied()
    }

    /// Number of live pairs.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.partners.len() / 2
    }

    /// Returns `true` if no connection is paired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    /// Checks symmetry and irreflexivity over every entry.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.partners.iter().all(|(conn, pairing)| {
            *conn != pairing.partner
                && self.partners.get(&pairing.partner).is_some_and(|back| {
                    back.partner == *conn && back.session_id == pairing.session_id
                })
        })
    }

    /// Drops every pair.
    pub fn clear(&mut self) {
        self.partners.clear();
    }
}
