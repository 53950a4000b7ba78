//! The rotation driver: validates and normalizes an inbound request,
//! resolves the affected CA or CAs, invokes the engine, and CAS-persists
//! the result. Also hosts the external-rotation entry point used when a
//! peer cluster pushes a trust update.

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::engine::{transition, TransitionRequest};
use crate::error::{Error, Result};
use crate::keygen::KeyGenerator;
use crate::model::{CaRecord, CaType, RotationMode, RotationPhase, RotationSchedule, RotationState};
use crate::store::CaStore;

/// Inbound request to rotate one or both cluster CAs.
///
/// Fields use the wire-level shapes an RPC layer would hand over: empty
/// strings mean "not specified", matching the request's own optionality
/// rules rather than requiring the caller to pre-validate enums.
#[derive(Debug, Clone, Default)]
pub struct RotationRequest {
    /// `"HostCA"`, `"UserCA"`, or `""` for both.
    pub ca_type: String,
    /// Total wall-clock budget for a newly started rotation. `None` uses
    /// the configured default. `Some(Duration::zero())` forces an
    /// immediate rotation.
    pub grace_period: Option<Duration>,
    /// `"UpdateClients"`, `"UpdateServers"`, `"Rollback"`, `"Standby"`, or
    /// `""` (defaults to `UpdateClients`).
    pub target_phase: String,
    /// Defaults to `Manual` when absent.
    pub mode: Option<RotationMode>,
    /// Defaults to an even split of the grace period when absent.
    pub schedule: Option<RotationSchedule>,
}

/// Configuration the driver and auto loop need but do not load themselves
/// — the host application is responsible for sourcing these values.
#[derive(Debug, Clone, Copy)]
pub struct RotationDefaults {
    /// Grace period used when a request does not specify one.
    pub default_grace_period: Duration,
    /// Validity period for a freshly generated TLS CA certificate.
    pub tls_ca_ttl: Duration,
}

impl Default for RotationDefaults {
    fn default() -> Self {
        Self {
            default_grace_period: Duration::hours(48),
            tls_ca_ttl: Duration::days(3650),
        }
    }
}

/// The collaborators a driver call or auto-rotation tick needs.
pub struct RotationContext<'a> {
    /// Backing store for CA records.
    pub store: &'a dyn CaStore,
    /// Wall-clock source.
    pub clock: &'a dyn Clock,
    /// Key material generator.
    pub keygen: &'a dyn KeyGenerator,
    /// This cluster's own name, used to reject external rewrites of the
    /// local CA.
    pub cluster_name: &'a str,
    /// Defaults for unspecified request fields.
    pub defaults: RotationDefaults,
}

/// The result of attempting to rotate a single CA type.
#[derive(Debug)]
pub enum RotationOutcome {
    /// The transition succeeded; the record now reflects this phase and
    /// state.
    Rotated {
        /// Which CA this outcome is for.
        ca_type: CaType,
        /// The phase the record now reports.
        phase: RotationPhase,
        /// The state the record now reports.
        state: RotationState,
    },
    /// The transition failed. The type is preserved so a caller can tell
    /// which CA in a fan-out request failed.
    Failed {
        /// Which CA this outcome is for.
        ca_type: CaType,
        /// Why it failed.
        error: Error,
    },
}

struct NormalizedRequest {
    ca_types: Vec<CaType>,
    grace_period: Duration,
    target_phase: RotationPhase,
    mode: RotationMode,
    schedule: RotationSchedule,
}

fn normalize(
    req: &RotationRequest,
    defaults: &RotationDefaults,
    clock: &dyn Clock,
) -> Result<NormalizedRequest> {
    let target_phase = match req.target_phase.as_str() {
        "" | "UpdateClients" => RotationPhase::UpdateClients,
        "UpdateServers" => RotationPhase::UpdateServers,
        "Rollback" => RotationPhase::Rollback,
        "Standby" => RotationPhase::Standby,
        other => return Err(Error::BadParameter(format!("unsupported phase: {other}"))),
    };

    let mode = req.mode.unwrap_or(RotationMode::Manual);
    let grace_period = req.grace_period.unwrap_or(defaults.default_grace_period);

    let ca_types = match CaType::parse_optional(&req.ca_type)? {
        Some(ca_type) => vec![ca_type],
        None => CaType::all().to_vec(),
    };

    let schedule = req.schedule.unwrap_or_else(|| {
        RotationSchedule::even_split(clock.now(), grace_period.max(Duration::zero()))
    });

    Ok(NormalizedRequest {
        ca_types,
        grace_period,
        target_phase,
        mode,
        schedule,
    })
}

/// Rotates one or both cluster CAs per `req`.
///
/// `HostCA` is always attempted before `UserCA` when both are requested.
/// Processing stops at the first CAS or transition failure — the driver
/// never retries a conflict, and a partial fan-out (one type rotated, the
/// other not attempted) is a permitted, self-healing outcome: the next
/// call to this function repairs it, because the already-rotated CA has
/// moved to a legal next state.
///
/// # Errors
///
/// Returns [`Error::BadParameter`] if the request itself cannot be
/// normalized (unknown CA type or phase name). Per-CA failures are
/// reported inside the returned outcomes, not as the outer `Result`.
pub fn rotate_cert_authority(
    ctx: &RotationContext<'_>,
    req: &RotationRequest,
) -> Result<Vec<RotationOutcome>> {
    let normalized = normalize(req, &ctx.defaults, ctx.clock)?;
    debug!(
        target_phase = %normalized.target_phase,
        mode = ?normalized.mode,
        ca_types = normalized.ca_types.len(),
        "normalized rotation request"
    );

    let mut outcomes = Vec::with_capacity(normalized.ca_types.len());
    for ca_type in &normalized.ca_types {
        let outcome = rotate_one(ctx, &normalized, *ca_type);
        let failed = matches!(outcome, RotationOutcome::Failed { .. });
        outcomes.push(outcome);
        if failed {
            break;
        }
    }

    Ok(outcomes)
}

fn rotate_one(ctx: &RotationContext<'_>, normalized: &NormalizedRequest, ca_type: CaType) -> RotationOutcome {
    let attempt = (|| -> Result<CaRecord> {
        let current = ctx.store.get(ca_type, ctx.cluster_name, true)?;
        let transition_req = TransitionRequest {
            target_phase: normalized.target_phase,
            mode: normalized.mode,
            grace_period: normalized.grace_period,
            schedule: normalized.schedule,
            tls_ca_ttl: ctx.defaults.tls_ca_ttl,
            clock: ctx.clock,
            keygen: ctx.keygen,
        };
        let next = transition(&transition_req, &current)?;
        ctx.store.compare_and_swap(&next, &current)?;
        Ok(next)
    })();

    match attempt {
        Ok(next) => {
            if next.rotation.state == RotationState::Standby {
                info!(%ca_type, "certificate authority rotation complete");
            } else {
                info!(%ca_type, phase = %next.rotation.phase, "certificate authority rotation advanced");
            }
            RotationOutcome::Rotated {
                ca_type,
                phase: next.rotation.phase,
                state: next.rotation.state,
            }
        }
        Err(error) => {
            warn!(%ca_type, %error, "certificate authority rotation failed");
            RotationOutcome::Failed { ca_type, error }
        }
    }
}

/// Applies a CA update received from a trusted peer cluster: copies the
/// peer's checking keys, TLS key pairs, and rotation descriptor onto the
/// local cache of that peer's CA. Never generates key material and never
/// touches the engine.
///
/// # Errors
///
/// Returns [`Error::BadParameter`] if `peer` is `None` or `peer.cluster_name`
/// equals this cluster's own name (refusing to let a peer rewrite the
/// local trust root).
pub fn rotate_external_cert_authority(
    ctx: &RotationContext<'_>,
    peer: Option<&CaRecord>,
) -> Result<()> {
    let peer = peer.ok_or_else(|| Error::BadParameter("external rotation input must not be nil".into()))?;

    if peer.cluster_name == ctx.cluster_name {
        return Err(Error::BadParameter(format!(
            "refusing to apply an external update to the local cluster's own certificate authority: {}",
            ctx.cluster_name
        )));
    }

    let current = ctx.store.get(peer.ca_type, &peer.cluster_name, false)?;
    let mut next = current.clone();
    next.checking_keys = peer.checking_keys.clone();
    next.tls_key_pairs = peer.tls_key_pairs.clone();
    next.rotation = peer.rotation.clone();

    ctx.store.compare_and_swap(&next, &current)?;
    info!(
        ca_type = %peer.ca_type,
        cluster_name = %peer.cluster_name,
        "applied external certificate authority update"
    );
    Ok(())
}
