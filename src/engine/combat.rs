// Combat action processor: applies a batch of shot/actor updates atomically.

use serde::{Deserialize, Serialize};

use super::actor::{ActionValues, Actor, Classification};
use super::config::*;
use super::wounds::{self, WoundChange, WoundPolicy, WoundWrite};
use crate::db::{ActorChanges, Database, Fight, Shot, ShotChanges, UnitOfWork};
use crate::error::{CombatError, Result};

fn default_event_type() -> String {
    EVENT_COMBAT_ACTION.to_string()
}

/// Narrative event recorded alongside an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default = "default_event_type")]
    pub event_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for EventPayload {
    fn default() -> Self {
        Self {
            event_type: default_event_type(),
            description: String::new(),
            details: serde_json::Value::Null,
        }
    }
}

/// One entry of a combat action batch. Every field except `shot_id` is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombatUpdate {
    pub shot_id: i64,
    /// New turn-order count.
    pub shot_count: Option<i32>,
    /// Wound delta, routed by the target's classification.
    pub wounds: Option<i32>,
    pub impairments: Option<i32>,
    /// New mook count / fight-local wound total.
    pub count: Option<i32>,
    /// Partial action value map merged onto the actor.
    pub action_values: Option<ActionValues>,
    #[serde(default)]
    pub add_status: Vec<String>,
    #[serde(default)]
    pub remove_status: Vec<String>,
    pub event: Option<EventPayload>,
}

/// The two independent writes one update resolves to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePlan {
    pub shot: ShotChanges,
    pub actor: ActorChanges,
    pub wound_write: Option<WoundWrite>,
}

/// Work out what one update writes, given the shot and its actor as they are
/// now. Without an actor nothing can be classified, so only the explicit shot
/// fields apply.
pub fn plan_update(update: &CombatUpdate, shot: &Shot, actor: Option<&Actor>) -> UpdatePlan {
    let mut plan = UpdatePlan {
        shot: ShotChanges {
            shot_count: update.shot_count,
            impairments: update.impairments.map(|i| i.max(0)),
            ..Default::default()
        },
        ..Default::default()
    };

    let Some(actor) = actor else {
        plan.shot.count = update.count.map(|c| c.max(0));
        return plan;
    };

    let classification = actor.classification();
    let policy = WoundPolicy::for_classification(classification);
    let wounds_value = update
        .action_values
        .as_ref()
        .and_then(|av| av.number(AV_WOUNDS));
    let replacement = match policy {
        WoundPolicy::ActorWounds { .. } => wounds_value,
        WoundPolicy::ShotWounds { .. } => update.count.or(wounds_value),
        WoundPolicy::Headcount => update.count,
    };
    let change = WoundChange {
        delta: update.wounds,
        replacement,
    };
    let wound_write = wounds::route(policy, actor.action_values.wounds(), shot.count, change);
    plan.wound_write = wound_write;

    plan.shot.count = match wound_write {
        Some(WoundWrite::Shot(value)) => Some(value),
        _ => update.count.map(|c| c.max(0)),
    };

    // Action values: partial merge, then the routed wound total on top.
    if update.action_values.is_some() || matches!(wound_write, Some(WoundWrite::Actor(_))) {
        let mut merged = actor.action_values.clone();
        if let Some(incoming) = &update.action_values {
            merged.merge(incoming);
            // Shot-local wound totals never land in the actor's map.
            if !matches!(policy, WoundPolicy::ActorWounds { .. }) {
                merged.restore(AV_WOUNDS, &actor.action_values);
            }
        }
        if let Some(WoundWrite::Actor(value)) = wound_write {
            merged.set_wounds(value);
        }
        if merged != actor.action_values {
            plan.actor.action_values = Some(merged);
        }
    }

    let threshold = wound_write.and_then(|w| wounds::evaluate_threshold(policy, w.value()));
    if threshold.is_some() || !update.add_status.is_empty() || !update.remove_status.is_empty() {
        let status = wounds::resolve_status(
            &actor.status,
            &update.add_status,
            &update.remove_status,
            threshold,
        );
        if status != actor.status {
            plan.actor.status = Some(status);
        }
    }

    // PC impairments persist across fights, so they live on the actor too.
    if classification == Classification::Pc {
        plan.actor.impairments = plan.shot.impairments;
    }

    plan
}

/// Apply a batch of combat updates to one fight. Either every update lands or
/// none do.
pub async fn apply_combat_action(
    db: &Database,
    fight_id: i64,
    updates: &[CombatUpdate],
) -> Result<Fight> {
    super::track("combat_action", async {
        if updates.is_empty() {
            return Err(CombatError::validation("combat action has no updates"));
        }

        let mut uow = UnitOfWork::begin(db, fight_id).await?;

        // Tenancy is checked for the whole batch before anything is written.
        for update in updates {
            uow.fight_shot(update.shot_id).await?;
        }

        for update in updates {
            if let Some(event) = &update.event {
                uow.append_event(&event.event_type, &event.description, event.details.clone())
                    .await?;
            }

            // Re-read: an earlier update in the batch may have touched this shot.
            let shot = uow.fight_shot(update.shot_id).await?;
            let reference = shot.actor_ref()?;
            let actor = uow.actor(reference).await?;
            if actor.is_none() {
                tracing::warn!(
                    fight_id,
                    shot_id = shot.id,
                    actor = reference.entity(),
                    actor_id = reference.id(),
                    "actor not found, applying shot-level changes only"
                );
            }

            let plan = plan_update(update, &shot, actor.as_ref());
            uow.update_shot(&shot, &plan.shot).await?;
            if let Some(actor) = &actor {
                uow.update_actor(actor, &plan.actor).await?;
            }
        }

        let writes = uow.writes();
        let fight = uow.commit().await?;
        tracing::info!(
            fight_id,
            updates = updates.len(),
            writes,
            "combat action applied"
        );
        Ok(fight)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::actor::{ActionValue, ActorRef, StatusList};

    fn shot(count: i32) -> Shot {
        Shot {
            id: 1,
            fight_id: 1,
            character_id: Some(1),
            vehicle_id: None,
            shot_count: 10,
            count,
            impairments: 0,
            location: None,
            driver_id: None,
            driving_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn character(kind: &str, wounds: i32) -> Actor {
        Actor {
            reference: ActorRef::Character(1),
            name: kind.to_string(),
            action_values: [("Type", ActionValue::from(kind)), ("Wounds", wounds.into())]
                .into_iter()
                .collect(),
            status: StatusList::new(),
            impairments: 0,
            updated_at: String::new(),
        }
    }

    fn wound(delta: i32) -> CombatUpdate {
        CombatUpdate {
            shot_id: 1,
            wounds: Some(delta),
            ..Default::default()
        }
    }

    #[test]
    fn test_pc_wounds_land_on_actor() {
        let pc = character("PC", 30);
        let plan = plan_update(&wound(5), &shot(0), Some(&pc));
        assert_eq!(plan.wound_write, Some(WoundWrite::Actor(35)));
        let av = plan.actor.action_values.unwrap();
        assert_eq!(av.wounds(), 35);
        assert!(plan.actor.status.unwrap().contains(STATUS_UP_CHECK_REQUIRED));
        assert_eq!(plan.shot.count, None);
    }

    #[test]
    fn test_boss_wounds_land_on_shot() {
        let boss = character("Boss", 0);
        let plan = plan_update(&wound(12), &shot(40), Some(&boss));
        assert_eq!(plan.shot.count, Some(52));
        assert!(plan.actor.action_values.is_none());
        assert!(plan.actor.status.unwrap().contains(STATUS_UP_CHECK_REQUIRED));
    }

    #[test]
    fn test_mook_hits_reduce_count_without_status() {
        let mook = character("Mook", 0);
        let plan = plan_update(&wound(4), &shot(10), Some(&mook));
        assert_eq!(plan.shot.count, Some(6));
        assert!(plan.actor.is_empty());
    }

    #[test]
    fn test_featured_foe_has_no_threshold() {
        let foe = character("Featured Foe", 0);
        let plan = plan_update(&wound(80), &shot(0), Some(&foe));
        assert_eq!(plan.shot.count, Some(80));
        assert!(plan.actor.status.is_none());
    }

    #[test]
    fn test_missing_actor_keeps_shot_fields() {
        let update = CombatUpdate {
            shot_id: 1,
            shot_count: Some(4),
            wounds: Some(7),
            count: Some(3),
            ..Default::default()
        };
        let plan = plan_update(&update, &shot(0), None);
        assert_eq!(plan.shot.shot_count, Some(4));
        assert_eq!(plan.shot.count, Some(3));
        assert!(plan.actor.is_empty());
        assert_eq!(plan.wound_write, None);
    }

    #[test]
    fn test_pc_impairments_mirror_to_actor() {
        let pc = character("PC", 0);
        let update = CombatUpdate {
            shot_id: 1,
            impairments: Some(2),
            ..Default::default()
        };
        let plan = plan_update(&update, &shot(0), Some(&pc));
        assert_eq!(plan.shot.impairments, Some(2));
        assert_eq!(plan.actor.impairments, Some(2));

        let boss = character("Boss", 0);
        let plan = plan_update(&update, &shot(0), Some(&boss));
        assert_eq!(plan.actor.impairments, None);
    }

    #[test]
    fn test_wounds_replacement_via_action_values() {
        let pc = character("PC", 40);
        let update = CombatUpdate {
            shot_id: 1,
            wounds: Some(3),
            action_values: Some([("Wounds", 10)].into_iter().collect()),
            ..Default::default()
        };
        let mut pc_flagged = pc.clone();
        pc_flagged.status.add(STATUS_UP_CHECK_REQUIRED);
        let plan = plan_update(&update, &shot(0), Some(&pc_flagged));
        assert_eq!(plan.actor.action_values.unwrap().wounds(), 10);
        assert!(!plan.actor.status.unwrap().contains(STATUS_UP_CHECK_REQUIRED));
    }

    #[test]
    fn test_boss_wounds_value_replaces_shot_count() {
        let boss = character("Boss", 0);
        let update = CombatUpdate {
            shot_id: 1,
            action_values: Some([("Wounds", 60)].into_iter().collect()),
            ..Default::default()
        };
        let plan = plan_update(&update, &shot(10), Some(&boss));
        assert_eq!(plan.wound_write, Some(WoundWrite::Shot(60)));
        assert_eq!(plan.shot.count, Some(60));
        assert!(plan.actor.action_values.is_none());
        assert!(plan.actor.status.unwrap().contains(STATUS_UP_CHECK_REQUIRED));
    }

    #[test]
    fn test_mook_wounds_value_is_dropped() {
        let mook = character("Mook", 0);
        let update = CombatUpdate {
            shot_id: 1,
            action_values: Some([("Wounds", 3), ("Guns", 8)].into_iter().collect()),
            ..Default::default()
        };
        let plan = plan_update(&update, &shot(10), Some(&mook));
        assert_eq!(plan.shot.count, None);
        let av = plan.actor.action_values.unwrap();
        assert_eq!(av.wounds(), 0);
        assert_eq!(av.number("Guns"), Some(8));
    }

    #[tokio::test]
    async fn test_missing_actor_applies_shot_fields_in_a_batch() {
        let db = Database::in_memory().await.unwrap();
        let fight = db.create_fight("Dockyard", None).await.unwrap();
        // A shot whose character row is gone.
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(db.pool())
            .await
            .unwrap();
        let (orphan,): (i64,) = sqlx::query_as(
            "INSERT INTO shots (fight_id, character_id, shot_count) VALUES (?, 999, 10) RETURNING id",
        )
        .bind(fight.id)
        .fetch_one(db.pool())
        .await
        .unwrap();

        let update = CombatUpdate {
            shot_id: orphan,
            shot_count: Some(4),
            wounds: Some(7),
            count: Some(3),
            ..Default::default()
        };
        apply_combat_action(&db, fight.id, &[update]).await.unwrap();

        let stored = db.get_shot(orphan).await.unwrap().unwrap();
        assert_eq!(stored.shot_count, 4);
        assert_eq!(stored.count, 3);
        assert!(db.get_character(999).await.unwrap().is_none());
    }

    #[test]
    fn test_event_payload_defaults() {
        let payload: EventPayload = serde_json::from_str(r#"{"description":"Bang"}"#).unwrap();
        assert_eq!(payload.event_type, "combat_action");
        assert!(payload.details.is_null());
    }
}
