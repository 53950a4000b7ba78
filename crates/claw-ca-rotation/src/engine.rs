//! The rotation transition engine: a pure function mapping a normalized
//! request and the current CA record to the next record, or an error.
//!
//! Nothing here touches the store. The only side effects are the two key
//! generation calls threaded in through [`crate::keygen::KeyGenerator`],
//! and reading the clock through [`crate::clock::Clock`] — both injected,
//! neither performed directly.

use chrono::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::keygen::KeyGenerator;
use crate::model::{CaRecord, RotationDescriptor, RotationMode, RotationPhase, RotationSchedule, RotationState, SigningKeys};

/// A normalized transition request: everything [`transition`] needs beyond
/// the current record itself.
pub struct TransitionRequest<'a> {
    /// The phase this transition aims to reach.
    pub target_phase: RotationPhase,
    /// Who is driving this transition.
    pub mode: RotationMode,
    /// Total wall-clock budget for a newly started rotation. `0` forces an
    /// immediate, single-step rotation.
    pub grace_period: Duration,
    /// Phase deadlines for a newly started rotation.
    pub schedule: RotationSchedule,
    /// Validity period for a newly generated TLS CA certificate.
    pub tls_ca_ttl: Duration,
    /// Clock used to stamp `started` / `last_rotated`.
    pub clock: &'a dyn Clock,
    /// Generator used for fresh SSH and TLS key material.
    pub keygen: &'a dyn KeyGenerator,
}

/// Computes the next CA record for `req` applied to `ca`, or an error if
/// the transition is illegal from the CA's current phase.
///
/// # Errors
///
/// Returns [`Error::BadParameter`] if `req.target_phase` is not reachable
/// from `ca`'s current phase, or an error from key generation.
pub fn transition(req: &TransitionRequest<'_>, ca: &CaRecord) -> Result<CaRecord> {
    let next = match req.target_phase {
        RotationPhase::UpdateClients => start_rotation(req, ca),
        RotationPhase::UpdateServers => advance_to_update_servers(req, ca),
        RotationPhase::Rollback => rollback(req, ca),
        RotationPhase::Standby => complete_or_abort(req, ca),
    }?;

    debug_assert!(
        next.check_invariants(),
        "transition produced a record violating rotation invariants"
    );

    Ok(next)
}

/// target = UpdateClients: legal only from Standby.
fn start_rotation(req: &TransitionRequest<'_>, ca: &CaRecord) -> Result<CaRecord> {
    if ca.rotation.state != RotationState::Standby {
        return Err(Error::BadParameter(
            "cannot initiate rotation while another is in progress".into(),
        ));
    }

    let ssh = req.keygen.generate_ssh_keypair()?;
    let tls = req
        .keygen
        .generate_self_signed_tls_ca(&ca.cluster_name, req.tls_ca_ttl)?;

    let mut next = ca.clone();
    let now = req.clock.now();

    if req.grace_period <= Duration::zero() {
        // Force rotation: start and complete in one step. No trust of the
        // old material is retained, and the descriptor goes straight back
        // to Standby — including `phase`, which a careless implementation
        // could leave at its prior value.
        next.signing_keys = SigningKeys(vec![ssh.private_pem.clone()]);
        next.checking_keys = vec![ssh.public_pem.clone()];
        next.tls_key_pairs = vec![tls];
        next.rotation = RotationDescriptor {
            last_rotated: Some(now),
            ..RotationDescriptor::standby()
        };
    } else {
        next.signing_keys = SigningKeys(vec![ssh.private_pem.clone(), ca.signing_keys[0].clone()]);
        next.checking_keys = vec![ssh.public_pem.clone(), ca.checking_keys[0].clone()];
        next.tls_key_pairs = vec![tls, ca.tls_key_pairs[0].clone()];
        next.rotation.state = RotationState::InProgress;
        next.rotation.phase = RotationPhase::UpdateClients;
        next.rotation.mode = Some(req.mode);
        next.rotation.current_id = Some(Uuid::new_v4());
        next.rotation.started = Some(now);
        next.rotation.grace_period = Some(req.grace_period);
        next.rotation.schedule = Some(req.schedule);
    }

    Ok(next)
}

/// target = UpdateServers: legal only from UpdateClients. No key material
/// changes; this is purely a signal for downstream components to reload.
fn advance_to_update_servers(req: &TransitionRequest<'_>, ca: &CaRecord) -> Result<CaRecord> {
    if ca.rotation.phase != RotationPhase::UpdateClients {
        return Err(Error::BadParameter(format!(
            "cannot advance to UpdateServers from phase {} (requires UpdateClients)",
            ca.rotation.phase
        )));
    }

    let mut next = ca.clone();
    next.rotation.phase = RotationPhase::UpdateServers;
    next.rotation.mode = Some(req.mode);
    Ok(next)
}

/// target = Rollback: legal only from UpdateClients or UpdateServers.
/// Drops the new active signer, restores the old one, and keeps the new
/// TLS certificate trusted-only.
fn rollback(_req: &TransitionRequest<'_>, ca: &CaRecord) -> Result<CaRecord> {
    if !matches!(
        ca.rotation.phase,
        RotationPhase::UpdateClients | RotationPhase::UpdateServers
    ) {
        return Err(Error::BadParameter(format!(
            "cannot rollback from phase {} (requires UpdateClients or UpdateServers)",
            ca.rotation.phase
        )));
    }
    if ca.signing_keys.len() != 2 || ca.checking_keys.len() != 2 || ca.tls_key_pairs.len() != 2 {
        return Err(Error::Internal(
            "in-progress rotation is missing its paired key material".into(),
        ));
    }

    let mut next = ca.clone();
    next.signing_keys = SigningKeys(vec![ca.signing_keys[1].clone()]);
    next.checking_keys = vec![ca.checking_keys[1].clone()];
    next.tls_key_pairs = vec![
        ca.tls_key_pairs[1].clone(),
        ca.tls_key_pairs[0].clone().into_trusted_only(),
    ];
    next.rotation.mode = Some(RotationMode::Manual);
    next.rotation.state = RotationState::InProgress;
    next.rotation.phase = RotationPhase::Rollback;
    Ok(next)
}

/// target = Standby: legal from UpdateServers (complete) or Rollback
/// (abort). Both truncate every sequence to its first element; only
/// completion bumps `last_rotated`.
fn complete_or_abort(req: &TransitionRequest<'_>, ca: &CaRecord) -> Result<CaRecord> {
    match ca.rotation.phase {
        RotationPhase::UpdateServers => {
            let mut next = ca.clone();
            next.signing_keys.truncate(1);
            next.checking_keys.truncate(1);
            next.tls_key_pairs.truncate(1);
            next.rotation = RotationDescriptor {
                last_rotated: Some(req.clock.now()),
                ..RotationDescriptor::standby()
            };
            Ok(next)
        }
        RotationPhase::Rollback => {
            let mut next = ca.clone();
            next.signing_keys.truncate(1);
            next.checking_keys.truncate(1);
            next.tls_key_pairs.truncate(1);
            // Rollback-complete does not bump last_rotated: a rollback
            // undoes a rotation, it is not one.
            next.rotation = RotationDescriptor {
                last_rotated: ca.rotation.last_rotated,
                ..RotationDescriptor::standby()
            };
            Ok(next)
        }
        other => Err(Error::BadParameter(format!(
            "cannot complete rotation from phase {other} (requires UpdateServers or Rollback)"
        ))),
    }
}
