//! Work lease semantics.
//!
//! At most one active lease exists per task. The decision logic here is
//! pure; the engine applies the outcome to the store inside the same
//! transaction that read the current lease row.

use chrono::{DateTime, Duration, Utc};

use crate::domain::Lease;
use crate::error::{Error, Result};

/// What a claim did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// No usable lease existed; a fresh one was granted.
    Acquired,
    /// The previous lease had expired and was taken over.
    Reclaimed,
    /// The caller already held the lease; its expiry was pushed out.
    Renewed,
}

/// Decide the result of a claim against the current lease row.
///
/// Concurrent claimers are serialized by the surrounding transaction, so
/// exactly one caller observes any given `current` value.
pub fn claim(
    task_id: &str,
    current: Option<&Lease>,
    actor: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<(Lease, ClaimOutcome)> {
    let outcome = match current {
        None => ClaimOutcome::Acquired,
        Some(lease) if !lease.is_active(now) => ClaimOutcome::Reclaimed,
        Some(lease) if lease.owner_id == actor => ClaimOutcome::Renewed,
        Some(_) => return Err(Error::lease_conflict(task_id)),
    };

    let acquired_at = match (outcome, current) {
        (ClaimOutcome::Renewed, Some(lease)) => lease.acquired_at,
        _ => now,
    };

    Ok((
        Lease {
            task_id: task_id.to_string(),
            owner_id: actor.to_string(),
            acquired_at,
            expires_at: now + ttl,
        },
        outcome,
    ))
}

/// Whether the caller may release the lease: the owner always may, as may
/// `lease.admin` holders.
pub fn may_release(lease: &Lease, actor: &str, has_lease_admin: bool) -> bool {
    lease.owner_id == actor || has_lease_admin
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    const TTL_MINUTES: i64 = 15;

    fn ttl() -> Duration {
        Duration::minutes(TTL_MINUTES)
    }

    #[test]
    fn fresh_claim_acquires() {
        let (lease, outcome) = claim("t1", None, "dev-1", now(), ttl()).unwrap();
        assert_eq!(outcome, ClaimOutcome::Acquired);
        assert_eq!(lease.owner_id, "dev-1");
        assert_eq!(lease.acquired_at, now());
        assert_eq!(lease.expires_at, now() + ttl());
    }

    #[test]
    fn owner_renews() {
        let (first, _) = claim("t1", None, "dev-1", now(), ttl()).unwrap();
        let later = now() + Duration::minutes(5);
        let (renewed, outcome) = claim("t1", Some(&first), "dev-1", later, ttl()).unwrap();
        assert_eq!(outcome, ClaimOutcome::Renewed);
        assert_eq!(renewed.acquired_at, first.acquired_at);
        assert_eq!(renewed.expires_at, later + ttl());
    }

    #[test]
    fn competitor_conflicts_while_active() {
        let (first, _) = claim("t1", None, "dev-1", now(), ttl()).unwrap();
        let err = claim("t1", Some(&first), "dev-2", now() + Duration::minutes(1), ttl())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::LeaseConflict);
    }

    #[test]
    fn expired_lease_is_reclaimable_by_anyone() {
        let (first, _) = claim("t1", None, "dev-1", now(), ttl()).unwrap();
        let after_expiry = now() + ttl() + Duration::seconds(1);
        let (taken, outcome) = claim("t1", Some(&first), "dev-2", after_expiry, ttl()).unwrap();
        assert_eq!(outcome, ClaimOutcome::Reclaimed);
        assert_eq!(taken.owner_id, "dev-2");
        assert_eq!(taken.acquired_at, after_expiry);
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        // A lease expiring exactly now is no longer active.
        let (first, _) = claim("t1", None, "dev-1", now(), ttl()).unwrap();
        let at_expiry = first.expires_at;
        let (_, outcome) = claim("t1", Some(&first), "dev-2", at_expiry, ttl()).unwrap();
        assert_eq!(outcome, ClaimOutcome::Reclaimed);
    }

    #[test]
    fn release_authority() {
        let (lease, _) = claim("t1", None, "dev-1", now(), ttl()).unwrap();
        assert!(may_release(&lease, "dev-1", false));
        assert!(!may_release(&lease, "dev-2", false));
        assert!(may_release(&lease, "dev-2", true));
    }
}
