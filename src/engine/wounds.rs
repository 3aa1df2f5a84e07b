// Wound and status routing per actor classification.
//
// Every caller that changes wounds goes through `WoundPolicy`: where the
// wound total is stored, which direction a hit moves it, and whether an
// up-check threshold applies are all decided here.

use super::actor::{Classification, StatusList};
use super::config::*;

/// Storage strategy for one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WoundPolicy {
    /// Wounds live in the actor's `"Wounds"` action value.
    ActorWounds { threshold: i32 },
    /// Wounds are fight-local and live on the shot's count.
    ShotWounds { threshold: Option<i32> },
    /// The shot's count is a headcount; each wound removes one.
    Headcount,
}

impl WoundPolicy {
    pub fn for_classification(classification: Classification) -> Self {
        match classification {
            Classification::Pc => WoundPolicy::ActorWounds {
                threshold: PC_UP_CHECK_THRESHOLD,
            },
            Classification::Boss | Classification::UberBoss => WoundPolicy::ShotWounds {
                threshold: Some(BOSS_UP_CHECK_THRESHOLD),
            },
            Classification::Mook => WoundPolicy::Headcount,
            Classification::FeaturedFoe
            | Classification::Ally
            | Classification::Vehicle
            | Classification::Unclassified => WoundPolicy::ShotWounds { threshold: None },
        }
    }

    pub fn threshold(self) -> Option<i32> {
        match self {
            WoundPolicy::ActorWounds { threshold } => Some(threshold),
            WoundPolicy::ShotWounds { threshold } => threshold,
            WoundPolicy::Headcount => None,
        }
    }
}

/// Requested wound change. A replacement wins over a delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WoundChange {
    pub delta: Option<i32>,
    pub replacement: Option<i32>,
}

/// The new stored value and the record it belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WoundWrite {
    Actor(i32),
    Shot(i32),
}

impl WoundWrite {
    pub fn value(self) -> i32 {
        match self {
            WoundWrite::Actor(v) | WoundWrite::Shot(v) => v,
        }
    }
}

/// Route a wound change. `actor_wounds` is the actor's current `"Wounds"`,
/// `shot_count` the shot's current count. Stored values floor at zero.
pub fn route(
    policy: WoundPolicy,
    actor_wounds: i32,
    shot_count: i32,
    change: WoundChange,
) -> Option<WoundWrite> {
    let current = match policy {
        WoundPolicy::ActorWounds { .. } => actor_wounds,
        WoundPolicy::ShotWounds { .. } | WoundPolicy::Headcount => shot_count,
    };
    let next = match (change.replacement, change.delta) {
        (Some(value), _) => value,
        (None, Some(delta)) => match policy {
            WoundPolicy::Headcount => current.saturating_sub(delta),
            _ => current.saturating_add(delta),
        },
        (None, None) => return None,
    }
    .max(0);

    Some(match policy {
        WoundPolicy::ActorWounds { .. } => WoundWrite::Actor(next),
        _ => WoundWrite::Shot(next),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOutcome {
    AtOrAbove,
    Below,
}

pub fn evaluate_threshold(policy: WoundPolicy, wounds: i32) -> Option<ThresholdOutcome> {
    policy.threshold().map(|threshold| {
        if wounds >= threshold {
            ThresholdOutcome::AtOrAbove
        } else {
            ThresholdOutcome::Below
        }
    })
}

/// Merge explicit status edits with the threshold outcome: current ∪ add,
/// minus remove, then `up_check_required` added or removed per the threshold.
pub fn resolve_status(
    current: &StatusList,
    add: &[String],
    remove: &[String],
    threshold: Option<ThresholdOutcome>,
) -> StatusList {
    let mut next = current.clone();
    for tag in add {
        next.add(tag.as_str());
    }
    for tag in remove {
        next.remove(tag);
    }
    match threshold {
        Some(ThresholdOutcome::AtOrAbove) => {
            next.add(STATUS_UP_CHECK_REQUIRED);
        }
        Some(ThresholdOutcome::Below) => {
            next.remove(STATUS_UP_CHECK_REQUIRED);
        }
        None => {}
    }
    next
}
