// Chase subsystem: vehicle action values, pursuer/evader positions, driver shot costs.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::actor::{ActionValue, ActionValues, ActorRef};
use super::config::*;
use super::ledger;
use crate::db::{ActorChanges, ChasePosition, ChaseRelationship, Database, Fight, UnitOfWork};
use crate::error::{CombatError, Result};

/// Which side of the relationship the updating shot is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChaseRole {
    #[default]
    Pursuer,
    Evader,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChaseUpdate {
    pub vehicle_id: i64,
    /// The vehicle's own shot.
    pub shot_id: Option<i64>,
    /// Deltas for additive keys, replacements for everything else.
    #[serde(default)]
    pub action_values: ActionValues,
    pub position: Option<ChasePosition>,
    pub target_shot_id: Option<i64>,
    #[serde(default)]
    pub role: ChaseRole,
    pub shot_cost: Option<i32>,
    pub driver_shot_id: Option<i64>,
}

impl ChaseUpdate {
    /// Shot ids this update references, for the tenancy check.
    fn shot_ids(&self) -> impl Iterator<Item = i64> {
        [self.shot_id, self.target_shot_id, self.driver_shot_id]
            .into_iter()
            .flatten()
    }

    fn validate(&self) -> Result<()> {
        if let Some(position) = self.position {
            let (Some(shot_id), Some(target)) = (self.shot_id, self.target_shot_id) else {
                return Err(CombatError::validation(format!(
                    "position {position:?} for vehicle {} needs both shot_id and target_shot_id",
                    self.vehicle_id
                )));
            };
            if shot_id == target {
                return Err(CombatError::validation(format!(
                    "shot {shot_id} cannot chase itself"
                )));
            }
        }
        if self.shot_cost.is_some() && self.driver_shot_id.is_none() && self.shot_id.is_none() {
            return Err(CombatError::validation(format!(
                "shot_cost for vehicle {} has no shot to charge",
                self.vehicle_id
            )));
        }
        Ok(())
    }
}

/// Resolve the (pursuer, evader) shot pair for a role.
pub fn orient(role: ChaseRole, shot_id: i64, target_shot_id: i64) -> (i64, i64) {
    match role {
        ChaseRole::Pursuer => (shot_id, target_shot_id),
        ChaseRole::Evader => (target_shot_id, shot_id),
    }
}

/// Merge incoming chase values onto the stored map. Additive keys accumulate;
/// every other key is replaced.
pub fn merge_chase_values(current: &ActionValues, incoming: &ActionValues) -> Result<ActionValues> {
    let mut merged = current.clone();
    for (key, value) in incoming.iter() {
        if ADDITIVE_CHASE_KEYS.contains(&key.as_str()) {
            let delta = value.as_number().ok_or_else(|| {
                CombatError::validation(format!("{key} delta must be numeric, got {value:?}"))
            })?;
            let total = current.number(key).unwrap_or(0).saturating_add(delta);
            merged.insert(key.clone(), ActionValue::Number(total));
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    Ok(merged)
}

/// A vehicle is only reachable through a fight it has a shot in, and an
/// update's own shot must be that vehicle's. Unknown vehicles pass here and
/// are skipped when the batch is applied.
async fn check_vehicle_in_fight(uow: &mut UnitOfWork, update: &ChaseUpdate) -> Result<()> {
    let reference = ActorRef::Vehicle(update.vehicle_id);
    if uow.actor(reference).await?.is_none() {
        return Ok(());
    }
    let fight_id = uow.fight().id;
    let own_shot = match update.shot_id {
        Some(shot_id) => Some(uow.fight_shot(shot_id).await?),
        None => uow.find_shot_by_actor(reference).await?,
    };
    match own_shot {
        Some(shot) if shot.vehicle_id == Some(update.vehicle_id) => Ok(()),
        _ => Err(CombatError::tenancy("vehicle", update.vehicle_id, fight_id)),
    }
}

pub async fn apply_chase_action(
    db: &Database,
    fight_id: i64,
    updates: &[ChaseUpdate],
) -> Result<Fight> {
    super::track("chase_action", async {
        if updates.is_empty() {
            return Err(CombatError::validation("chase action has no updates"));
        }

        let mut uow = UnitOfWork::begin(db, fight_id).await?;
        for update in updates {
            update.validate()?;
            for shot_id in update.shot_ids() {
                uow.fight_shot(shot_id).await?;
            }
            check_vehicle_in_fight(&mut uow, update).await?;
        }

        let mut spends = Vec::new();
        let mut applied = 0usize;
        for update in updates {
            let Some(vehicle) = uow.actor(ActorRef::Vehicle(update.vehicle_id)).await? else {
                tracing::warn!(
                    fight_id,
                    vehicle_id = update.vehicle_id,
                    "vehicle not found, skipping chase update"
                );
                continue;
            };
            applied += 1;

            if !update.action_values.is_empty() {
                let merged = merge_chase_values(&vehicle.action_values, &update.action_values)?;
                let changes = ActorChanges {
                    action_values: Some(merged),
                    ..Default::default()
                };
                uow.update_actor(&vehicle, &changes).await?;
            }

            if let (Some(position), Some(shot_id), Some(target)) =
                (update.position, update.shot_id, update.target_shot_id)
            {
                let (pursuer, evader) = orient(update.role, shot_id, target);
                let relationship = uow.find_or_create_chase(pursuer, evader).await?;
                uow.update_chase(&relationship, position).await?;
            }

            if let Some(cost) = update.shot_cost {
                if let Some(charged) = update.driver_shot_id.or(update.shot_id) {
                    spends.push((charged, cost));
                }
            }
        }

        // Driver costs land after every vehicle and position write.
        for (shot_id, cost) in spends {
            let shot = uow.fight_shot(shot_id).await?;
            ledger::spend(&mut uow, &shot, cost).await?;
        }

        let description = format!("{} chase update(s), {applied} applied", updates.len());
        uow.append_event(
            EVENT_CHASE_ACTION,
            &description,
            json!({ "updates": updates.len(), "applied": applied }),
        )
        .await?;

        let fight = uow.commit().await?;
        tracing::info!(
            fight_id,
            updates = updates.len(),
            applied,
            "chase action applied"
        );
        Ok(fight)
    })
    .await
}

pub async fn list_relationships(db: &Database, fight_id: i64) -> Result<Vec<ChaseRelationship>> {
    db.get_fight(fight_id)
        .await?
        .ok_or_else(|| CombatError::not_found("fight", fight_id))?;
    Ok(db.list_chase_relationships(fight_id).await?)
}
