//! Authorization state machine.
//!
//! Per (record, grantee) pair the lifecycle is
//! `NoGrant -> Active -> Revoked -> Active -> ...`: a re-grant after revoke
//! is allowed and produces a fresh authorization row rather than
//! resurrecting the old one. Transitions are pure functions here; the
//! store applies their effects inside a single write transaction, and only
//! confirmed ledger events ever drive them.

/// Current authorization state for a (record, grantee) pair, derived from
/// the most recent authorization row (or its absence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No grant has ever been observed.
    NoGrant,
    /// The latest grant is in force.
    Active,
    /// The latest grant was revoked.
    Revoked,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::NoGrant => "no-grant",
            AuthState::Active => "active",
            AuthState::Revoked => "revoked",
        }
    }

    /// Whether the grantee can currently see the record.
    pub fn is_active(&self) -> bool {
        matches!(self, AuthState::Active)
    }
}

/// Effect of a confirmed grant event on the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantEffect {
    /// Insert a fresh authorization row.
    InsertFresh,
    /// Already active: no state change, but the event is still audited.
    AlreadyActive,
}

/// Effect of a confirmed revoke event on the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeEffect {
    /// Flip the active row to revoked.
    RevokeActive,
    /// No grant has ever been observed; the matching grant may still be in
    /// flight on the other side of a retry, so the caller buffers.
    NoGrantObserved,
}

/// Decide what a grant event does given the current state.
pub fn grant_effect(state: AuthState) -> GrantEffect {
    match state {
        AuthState::NoGrant | AuthState::Revoked => GrantEffect::InsertFresh,
        AuthState::Active => GrantEffect::AlreadyActive,
    }
}

/// Decide what a revoke event does given the current state.
///
/// Revoking an already-revoked grant is an ordering violation and is
/// rejected outright (`Err` carries the offending state); revoking with no
/// observed history is distinguishable because the grant may simply not
/// have arrived yet.
pub fn revoke_effect(state: AuthState) -> Result<RevokeEffect, AuthState> {
    match state {
        AuthState::Active => Ok(RevokeEffect::RevokeActive),
        AuthState::NoGrant => Ok(RevokeEffect::NoGrantObserved),
        AuthState::Revoked => Err(AuthState::Revoked),
    }
}
