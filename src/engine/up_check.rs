// Up-check recovery: resolves an incapacitated character's roll to stay in the fight.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::actor::{ActorRef, StatusList};
use super::config::*;
use crate::db::{ActorChanges, Database, Fight, UnitOfWork};
use crate::error::{CombatError, Result};
use crate::metrics;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpCheckParams {
    pub shot_id: i64,
    pub success: bool,
    /// The roll, recorded in the event only.
    pub swerve: Option<i32>,
    /// Spend one Fortune on the roll (PCs only).
    #[serde(default)]
    pub fortune_spent: bool,
}

/// Status list after an up-check. Wounds are not touched either way.
pub fn transition(status: &StatusList, success: bool) -> StatusList {
    let mut next = status.clone();
    next.remove(STATUS_UP_CHECK_REQUIRED);
    if !success {
        next.add(STATUS_OUT_OF_FIGHT);
    }
    next
}

pub async fn apply_up_check(db: &Database, fight_id: i64, params: &UpCheckParams) -> Result<Fight> {
    super::track("up_check", async {
        let mut uow = UnitOfWork::begin(db, fight_id).await?;
        let shot = uow.fight_shot(params.shot_id).await?;
        let reference = shot.actor_ref()?;
        let ActorRef::Character(character_id) = reference else {
            return Err(CombatError::validation(format!(
                "shot {} is a vehicle; only characters make up-checks",
                shot.id
            )));
        };
        let actor = uow
            .actor(reference)
            .await?
            .ok_or_else(|| CombatError::not_found("character", character_id))?;

        let mut changes = ActorChanges {
            status: Some(transition(&actor.status, params.success)),
            ..Default::default()
        };

        let fortune_spent = params.fortune_spent && actor.is_pc();
        if fortune_spent {
            let fortune = actor.action_values.fortune();
            if fortune < 1 {
                return Err(CombatError::InsufficientResource(format!(
                    "{} has no Fortune to spend",
                    actor.name
                )));
            }
            let mut action_values = actor.action_values.clone();
            action_values.set_fortune(fortune - 1);
            changes.action_values = Some(action_values);
        }

        let updated = uow.update_actor(&actor, &changes).await?;
        let status: Vec<&str> = updated.status.iter().collect();
        let outcome = if params.success { "passed" } else { "failed" };
        uow.append_event(
            EVENT_UP_CHECK,
            &format!("{} {outcome} an up-check", actor.name),
            json!({
                "character_id": character_id,
                "shot_id": shot.id,
                "success": params.success,
                "swerve": params.swerve,
                "fortune_spent": fortune_spent,
                "status": status,
            }),
        )
        .await?;

        let fight = uow.commit().await?;
        metrics::UP_CHECKS_TOTAL
            .with_label_values(&[if params.success { "success" } else { "failure" }])
            .inc();
        tracing::info!(
            fight_id,
            shot_id = shot.id,
            character_id,
            success = params.success,
            "up-check resolved"
        );
        Ok(fight)
    })
    .await
}
