//! The auto-rotation background loop: periodically advances any CA whose
//! rotation is in `Auto` mode once its schedule says it's time, and
//! degrades a CA back to `Manual` mode if an auto tick can't make progress.

use tracing::warn;

use crate::driver::{RotationContext, RotationOutcome};
use crate::engine::{transition, TransitionRequest};
use crate::error::Error;
use crate::model::{CaRecord, CaType, RotationMode, RotationPhase, RotationState};

/// Runs one tick of the auto-rotation loop over every CA type.
///
/// A CA is skipped (no entry in the returned vector) when it isn't
/// currently an in-progress auto rotation, or when its schedule hasn't
/// reached the next deadline yet. A CA whose phase is `Rollback` is
/// never driven automatically — a human decided to roll back, and only a
/// human should carry it to completion — so such a CA is downgraded to
/// `Manual` and reported as a failure.
#[must_use]
pub fn run_auto_tick(ctx: &RotationContext<'_>) -> Vec<RotationOutcome> {
    CaType::all()
        .into_iter()
        .filter_map(|ca_type| tick_one(ctx, ca_type))
        .collect()
}

fn tick_one(ctx: &RotationContext<'_>, ca_type: CaType) -> Option<RotationOutcome> {
    let current = match ctx.store.get(ca_type, ctx.cluster_name, true) {
        Ok(record) => record,
        Err(error) => {
            warn!(%ca_type, %error, "auto-rotation tick could not load certificate authority");
            return Some(RotationOutcome::Failed { ca_type, error });
        }
    };

    if current.rotation.mode != Some(RotationMode::Auto) {
        return None;
    }
    if current.rotation.state != RotationState::InProgress {
        return None;
    }

    let schedule = current.rotation.schedule?;
    let now = ctx.clock.now();

    let target_phase = match current.rotation.phase {
        RotationPhase::UpdateClients if now >= schedule.update_servers => RotationPhase::UpdateServers,
        RotationPhase::UpdateServers if now >= schedule.standby => RotationPhase::Standby,
        RotationPhase::UpdateClients | RotationPhase::UpdateServers => return None,
        RotationPhase::Rollback | RotationPhase::Standby => {
            let error = Error::BadParameter(format!(
                "auto-rotation loop refuses to drive phase {}",
                current.rotation.phase
            ));
            warn!(%ca_type, %error, "downgrading to manual mode");
            degrade_to_manual(ctx, ca_type, &current);
            return Some(RotationOutcome::Failed { ca_type, error });
        }
    };

    let grace_period = current
        .rotation
        .grace_period
        .unwrap_or(ctx.defaults.default_grace_period);

    let transition_req = TransitionRequest {
        target_phase,
        mode: RotationMode::Auto,
        grace_period,
        schedule,
        tls_ca_ttl: ctx.defaults.tls_ca_ttl,
        clock: ctx.clock,
        keygen: ctx.keygen,
    };

    match transition(&transition_req, &current) {
        Ok(next) => match ctx.store.compare_and_swap(&next, &current) {
            Ok(()) => Some(RotationOutcome::Rotated {
                ca_type,
                phase: next.rotation.phase,
                state: next.rotation.state,
            }),
            Err(error) => {
                warn!(%ca_type, %error, "auto-rotation CAS conflict, downgrading to manual mode");
                degrade_to_manual(ctx, ca_type, &current);
                Some(RotationOutcome::Failed { ca_type, error })
            }
        },
        Err(error) => {
            warn!(%ca_type, %error, "auto-rotation transition failed, downgrading to manual mode");
            degrade_to_manual(ctx, ca_type, &current);
            Some(RotationOutcome::Failed { ca_type, error })
        }
    }
}

/// Best-effort: flips a CA back to manual mode after an auto tick can't
/// make progress on it. Failure here is logged, not propagated — the
/// caller already has the original error to report, and the next tick
/// will simply try (and likely fail to progress) again.
fn degrade_to_manual(ctx: &RotationContext<'_>, ca_type: CaType, current: &CaRecord) {
    let mut manual = current.clone();
    manual.rotation.mode = Some(RotationMode::Manual);
    if let Err(error) = ctx.store.compare_and_swap(&manual, current) {
        warn!(%ca_type, %error, "failed to downgrade certificate authority to manual mode");
    }
}
