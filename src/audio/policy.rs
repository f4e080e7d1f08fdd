//! Spatial audio policy
//!
//! Maps two participants' raw game state and the session phase to the gain
//! and stereo position of the remote participant's audio route. Pure and
//! deterministic: the same inputs always produce the same decision, and the
//! caller applies the result to the route's controls.

use crate::game::{GamePhase, PlayerState};

/// Depth offset placing remote voices slightly behind the listening plane
pub const PAN_DEPTH: f32 = -0.5;

/// Sentinel offset for unknown positions, also the clamp bound
pub const UNKNOWN_OFFSET: f32 = 999.0;

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixDecision {
    /// Gain in range 0.0 to 1.0
    pub gain: f32,
    /// Position to apply, or `None` to keep the route's last position
    pub pan: Option<(f32, f32, f32)>,
}

/// Compute gain and position for one remote participant.
///
/// Rules, in precedence order:
/// 1. Planar offset is remote minus local; Discussion (or Lobby with
///    spatial audio disabled) centers it to (0, 0).
/// 2. Non-numeric offset components become the far-away sentinel (999);
///    both components clamp to ±999.
/// 3. A concealed (in-vent) remote is silent and keeps its last position.
/// 4. Two dead participants hear each other; the living never hear the dead.
/// 5. Lobby, Discussion and Tasks are audible; any other phase is silent.
/// 6. Last of all, audible routes beyond `audible_radius` are silenced
///    (this deliberately applies to dead pairs as well).
pub fn compute_mix(
    phase: GamePhase,
    spatial_enabled: bool,
    local: &PlayerState,
    remote: &PlayerState,
    audible_radius: f32,
) -> MixDecision {
    let mut dx = remote.x - local.x;
    let mut dy = remote.y - local.y;

    if phase == GamePhase::Discussion || (phase == GamePhase::Lobby && !spatial_enabled) {
        dx = 0.0;
        dy = 0.0;
    }

    if dx.is_nan() {
        dx = UNKNOWN_OFFSET;
    }
    if dy.is_nan() {
        dy = UNKNOWN_OFFSET;
    }
    dx = dx.clamp(-UNKNOWN_OFFSET, UNKNOWN_OFFSET);
    dy = dy.clamp(-UNKNOWN_OFFSET, UNKNOWN_OFFSET);

    let pan = Some((dx, dy, PAN_DEPTH));

    if remote.in_vent {
        return MixDecision { gain: 0.0, pan: None };
    }

    let mut decision = if local.is_dead && remote.is_dead {
        MixDecision { gain: 1.0, pan }
    } else if !local.is_dead && remote.is_dead {
        MixDecision { gain: 0.0, pan: None }
    } else {
        match phase {
            GamePhase::Lobby | GamePhase::Discussion | GamePhase::Tasks => {
                MixDecision { gain: 1.0, pan }
            }
            _ => MixDecision { gain: 0.0, pan: None },
        }
    };

    // Distance cutoff is evaluated last and overrides every audible rule.
    if decision.gain == 1.0 && (dx * dx + dy * dy).sqrt() > audible_radius {
        decision.gain = 0.0;
    }

    decision
}
