//! Cluster certificate-authority rotation for Clawbernetes.
#![forbid(unsafe_code)]
//!
//! This crate owns the rotation state machine for a cluster's host and
//! user certificate authorities: staging new signing and TLS key
//! material alongside the active set, advancing clients and then servers
//! onto it, retiring the old set, and rolling back a rotation that went
//! wrong. It does not own certificate issuance for individual workloads,
//! transport, or scheduling — those live above this crate.
//!
//! # Overview
//!
//! - [`model`] — the CA record and rotation descriptor the rest of the
//!   crate reads and rewrites.
//! - [`engine`] — the pure state-transition function: request + current
//!   record in, next record or a precise [`error::Error::BadParameter`]
//!   out.
//! - [`driver`] — validates and normalizes an inbound rotation request,
//!   fans out over one or both CA types, and applies the engine's result
//!   through the store. Also the external-rotation entry point.
//! - [`autoloop`] — advances an `Auto`-mode rotation against its schedule
//!   and degrades a stuck CA back to `Manual` mode.
//! - [`store`] — the backing-store interface and an in-memory reference
//!   implementation.
//! - [`clock`] / [`keygen`] — the two external collaborators the engine
//!   needs but does not implement: wall-clock time and key generation.
//! - [`error`] — error types shared across the crate.
//!
//! # Example
//!
//! ```
//! use claw_ca_rotation::clock::SystemClock;
//! use claw_ca_rotation::driver::{rotate_cert_authority, RotationContext, RotationDefaults, RotationRequest};
//! use claw_ca_rotation::keygen::DefaultKeyGenerator;
//! use claw_ca_rotation::model::{CaRecord, CaType, TlsKeyPair};
//! use claw_ca_rotation::store::{CaStore, InMemoryCaStore};
//! use chrono::Duration;
//!
//! let store = InMemoryCaStore::new();
//! for ca_type in CaType::all() {
//!     store.seed(CaRecord::bootstrap(
//!         ca_type,
//!         "demo-cluster",
//!         "initial-priv".into(),
//!         "initial-pub".into(),
//!         TlsKeyPair { cert_pem: "initial-cert".into(), key_pem: Some("initial-key".into()) },
//!     ));
//! }
//!
//! let clock = SystemClock;
//! let keygen = DefaultKeyGenerator;
//! let ctx = RotationContext {
//!     store: &store,
//!     clock: &clock,
//!     keygen: &keygen,
//!     cluster_name: "demo-cluster",
//!     defaults: RotationDefaults::default(),
//! };
//!
//! // Force an immediate rotation of the host CA.
//! let req = RotationRequest {
//!     ca_type: "HostCA".into(),
//!     grace_period: Some(Duration::zero()),
//!     ..Default::default()
//! };
//! let outcomes = rotate_cert_authority(&ctx, &req).unwrap();
//! assert_eq!(outcomes.len(), 1);
//! ```

pub mod autoloop;
pub mod clock;
pub mod driver;
pub mod engine;
pub mod error;
pub mod keygen;
pub mod model;
pub mod store;

pub use autoloop::run_auto_tick;
pub use driver::{rotate_cert_authority, rotate_external_cert_authority, RotationContext, RotationDefaults, RotationOutcome, RotationRequest};
pub use engine::{transition, TransitionRequest};
pub use error::{Error, Result};
pub use model::{CaRecord, CaType, RotationDescriptor, RotationMode, RotationPhase, RotationSchedule, RotationState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::keygen::DefaultKeyGenerator;
    use crate::model::TlsKeyPair;
    use crate::store::{CaStore, InMemoryCaStore};
    use chrono::{Duration, Utc};

    fn seeded_store(cluster_name: &str) -> InMemoryCaStore {
        let store = InMemoryCaStore::new();
        for ca_type in CaType::all() {
            store.seed(CaRecord::bootstrap(
                ca_type,
                cluster_name,
                "initial-priv".into(),
                "initial-pub".into(),
                TlsKeyPair {
                    cert_pem: "initial-cert".into(),
                    key_pem: Some("initial-key".into()),
                },
            ));
        }
        store
    }

    /// Drives a full staged, manual rotation of the host CA from request
    /// through to standby entirely through the public API, the way an
    /// operator's tooling would: one `rotate_cert_authority` call per
    /// phase, reading the store directly to confirm state in between.
    #[test]
    fn full_manual_rotation_workflow() {
        let store = seeded_store("workflow-cluster");
        let clock = FixedClock(Utc::now());
        let keygen = DefaultKeyGenerator;
        let ctx = RotationContext {
            store: &store,
            clock: &clock,
            keygen: &keygen,
            cluster_name: "workflow-cluster",
            defaults: RotationDefaults::default(),
        };

        let start = RotationRequest {
            ca_type: "HostCA".into(),
            grace_period: Some(Duration::hours(24)),
            target_phase: "UpdateClients".into(),
            ..Default::default()
        };
        let outcomes = rotate_cert_authority(&ctx, &start).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], RotationOutcome::Rotated { state: RotationState::InProgress, .. }));

        let record = store.get(CaType::HostCA, "workflow-cluster", true).unwrap();
        assert_eq!(record.signing_keys.len(), 2);
        assert_ne!(record.signing_keys[0], "initial-priv");
        assert_eq!(record.signing_keys[1], "initial-priv");

        let advance = RotationRequest {
            ca_type: "HostCA".into(),
            target_phase: "UpdateServers".into(),
            ..Default::default()
        };
        rotate_cert_authority(&ctx, &advance).unwrap();
        let record = store.get(CaType::HostCA, "workflow-cluster", true).unwrap();
        assert_eq!(record.rotation.phase, RotationPhase::UpdateServers);

        let complete = RotationRequest {
            ca_type: "HostCA".into(),
            target_phase: "Standby".into(),
            ..Default::default()
        };
        let outcomes = rotate_cert_authority(&ctx, &complete).unwrap();
        assert!(matches!(outcomes[0], RotationOutcome::Rotated { state: RotationState::Standby, .. }));

        let record = store.get(CaType::HostCA, "workflow-cluster", true).unwrap();
        assert_eq!(record.signing_keys.len(), 1);
        assert_ne!(record.signing_keys[0], "initial-priv");
        assert!(record.rotation.last_rotated.is_some());

        // UserCA was never touched.
        let untouched = store.get(CaType::UserCA, "workflow-cluster", true).unwrap();
        assert_eq!(untouched.signing_keys[0], "initial-priv");
    }

    /// A rotation abandoned partway through can be rolled back and then
    /// completed, restoring the original key material exactly.
    #[test]
    fn rollback_workflow_restores_original_material() {
        let store = seeded_store("rollback-cluster");
        let clock = FixedClock(Utc::now());
        let keygen = DefaultKeyGenerator;
        let ctx = RotationContext {
            store: &store,
            clock: &clock,
            keygen: &keygen,
            cluster_name: "rollback-cluster",
            defaults: RotationDefaults::default(),
        };

        let start = RotationRequest {
            ca_type: "UserCA".into(),
            grace_period: Some(Duration::hours(24)),
            ..Default::default()
        };
        rotate_cert_authority(&ctx, &start).unwrap();

        let rollback = RotationRequest {
            ca_type: "UserCA".into(),
            target_phase: "Rollback".into(),
            ..Default::default()
        };
        let outcomes = rotate_cert_authority(&ctx, &rollback).unwrap();
        assert!(matches!(outcomes[0], RotationOutcome::Rotated { phase: RotationPhase::Rollback, .. }));

        let abort = RotationRequest {
            ca_type: "UserCA".into(),
            target_phase: "Standby".into(),
            ..Default::default()
        };
        rotate_cert_authority(&ctx, &abort).unwrap();

        let record = store.get(CaType::UserCA, "rollback-cluster", true).unwrap();
        assert_eq!(record.signing_keys.0, vec!["initial-priv".to_string()]);
        assert_eq!(record.checking_keys, vec!["initial-pub".to_string()]);
        assert_eq!(record.rotation.state, RotationState::Standby);
    }

    /// The auto loop can carry a staged rotation all the way to standby
    /// without any manual `UpdateServers`/`Standby` calls, once its
    /// schedule deadlines have passed.
    #[test]
    fn auto_rotation_completes_without_manual_intervention() {
        let store = seeded_store("auto-cluster");
        let started = Utc::now();
        let keygen = DefaultKeyGenerator;

        let start_clock = FixedClock(started);
        let start_ctx = RotationContext {
            store: &store,
            clock: &start_clock,
            keygen: &keygen,
            cluster_name: "auto-cluster",
            defaults: RotationDefaults::default(),
        };
        let start = RotationRequest {
            ca_type: "HostCA".into(),
            grace_period: Some(Duration::hours(24)),
            mode: Some(RotationMode::Auto),
            ..Default::default()
        };
        rotate_cert_authority(&start_ctx, &start).unwrap();

        let schedule = store
            .get(CaType::HostCA, "auto-cluster", true)
            .unwrap()
            .rotation
            .schedule
            .unwrap();

        let mid_clock = FixedClock(schedule.update_servers + Duration::seconds(1));
        let mid_ctx = RotationContext {
            store: &store,
            clock: &mid_clock,
            keygen: &keygen,
            cluster_name: "auto-cluster",
            defaults: RotationDefaults::default(),
        };
        let outcomes = run_auto_tick(&mid_ctx);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], RotationOutcome::Rotated { phase: RotationPhase::UpdateServers, .. }));

        let end_clock = FixedClock(schedule.standby + Duration::seconds(1));
        let end_ctx = RotationContext {
            store: &store,
            clock: &end_clock,
            keygen: &keygen,
            cluster_name: "auto-cluster",
            defaults: RotationDefaults::default(),
        };
        let outcomes = run_auto_tick(&end_ctx);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], RotationOutcome::Rotated { state: RotationState::Standby, .. }));

        let record = store.get(CaType::HostCA, "auto-cluster", true).unwrap();
        assert_eq!(record.rotation.state, RotationState::Standby);
    }
}
