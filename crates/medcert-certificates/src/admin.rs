// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Administrative status changes (suspend, reinstate, revoke).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use medcert_core::error::{MedcertError, Result};
use medcert_core::types::{Certificate, CertificateId, CertificateStatus};

use crate::store::CertificateStore;

/// Proof that the caller was authorised for administrative actions.
///
/// Minted by the outer authentication layer and passed explicitly; nothing
/// in this crate consults ambient configuration to decide who is an admin.
#[derive(Debug, Clone)]
pub struct AdminCapability {
    actor: String,
}

impl AdminCapability {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}

/// Moves certificates between lifecycle states.
pub struct CertificateAdmin {
    certificates: Arc<dyn CertificateStore>,
}

impl CertificateAdmin {
    pub fn new(certificates: Arc<dyn CertificateStore>) -> Self {
        Self { certificates }
    }

    /// Move certificate `id` to `target`.
    ///
    /// Allowed: valid → suspended, valid|suspended → revoked, and
    /// suspended → valid while the certificate has not expired. Anything
    /// else (including any move out of `revoked` or an expired certificate)
    /// fails with `InvalidTransition`.
    #[instrument(skip(self, capability, now), fields(actor = capability.actor(), certificate_id = %id, %target))]
    pub fn transition(
        &self,
        capability: &AdminCapability,
        id: CertificateId,
        target: CertificateStatus,
        now: DateTime<Utc>,
    ) -> Result<Certificate> {
        let cert = self.certificates.get_by_id(id)?;
        let current = cert.effective_status(now);

        let reinstating_expired =
            target == CertificateStatus::Valid && now > cert.expires_at;
        if !current.can_transition_to(target) || reinstating_expired {
            return Err(MedcertError::InvalidTransition {
                from: current,
                to: target,
            });
        }

        let updated = self.certificates.update_status(id, cert.status, target)?;
        info!(
            number = %updated.certificate_number,
            from = %current,
            to = %target,
            "certificate status changed"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, TestEnv};
    use chrono::TimeDelta;

    fn cap() -> AdminCapability {
        AdminCapability::new("ops@medcert.example")
    }

    #[test]
    fn suspend_reinstate_revoke() {
        let env = TestEnv::new();
        let cert = env.issue_scenario();
        let admin = env.admin();
        let now = fixtures::issued_at();

        let s = admin.transition(&cap(), cert.id, CertificateStatus::Suspended, now).unwrap();
        assert_eq!(s.status, CertificateStatus::Suspended);
        let v = admin.transition(&cap(), cert.id, CertificateStatus::Valid, now).unwrap();
        assert_eq!(v.status, CertificateStatus::Valid);
        let r = admin.transition(&cap(), cert.id, CertificateStatus::Revoked, now).unwrap();
        assert_eq!(r.status, CertificateStatus::Revoked);
    }

    #[test]
    fn revoked_is_terminal() {
        let env = TestEnv::new();
        let cert = env.issue_scenario();
        let admin = env.admin();
        let now = fixtures::issued_at();
        admin.transition(&cap(), cert.id, CertificateStatus::Revoked, now).unwrap();

        for target in [CertificateStatus::Valid, CertificateStatus::Suspended] {
            let err = admin.transition(&cap(), cert.id, target, now).unwrap_err();
            assert!(matches!(
                err,
                MedcertError::InvalidTransition {
                    from: CertificateStatus::Revoked,
                    ..
                }
            ));
        }
    }

    #[test]
    fn expired_cannot_return_to_valid() {
        let env = TestEnv::new();
        let cert = env.issue_scenario();
        let admin = env.admin();
        admin
            .transition(&cap(), cert.id, CertificateStatus::Suspended, fixtures::issued_at())
            .unwrap();

        let later = cert.expires_at + TimeDelta::days(1);
        let err = admin
            .transition(&cap(), cert.id, CertificateStatus::Valid, later)
            .unwrap_err();
        assert!(matches!(err, MedcertError::InvalidTransition { .. }));

        // An unsuspended certificate past expiry reads as expired and is frozen.
        let env = TestEnv::new();
        let cert = env.issue_scenario();
        let err = env
            .admin()
            .transition(&cap(), cert.id, CertificateStatus::Suspended, later)
            .unwrap_err();
        assert!(matches!(
            err,
            MedcertError::InvalidTransition {
                from: CertificateStatus::Expired,
                ..
            }
        ));
    }

    #[test]
    fn expired_is_never_a_target() {
        let env = TestEnv::new();
        let cert = env.issue_scenario();
        let err = env
            .admin()
            .transition(&cap(), cert.id, CertificateStatus::Expired, fixtures::issued_at())
            .unwrap_err();
        assert!(matches!(err, MedcertError::InvalidTransition { .. }));
    }

    #[test]
    fn unknown_certificate() {
        let env = TestEnv::new();
        let err = env
            .admin()
            .transition(&cap(), CertificateId::new(), CertificateStatus::Revoked, fixtures::issued_at())
            .unwrap_err();
        assert!(matches!(err, MedcertError::NotFound { .. }));
    }
}
