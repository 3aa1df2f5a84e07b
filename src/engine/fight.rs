// Fight aggregate: lifecycle, joining actors, the sequence clock and the read view.

use serde::Serialize;
use serde_json::json;

use super::actor::{Actor, ActorRef, RecoveryState};
use super::config::*;
use super::ledger;
use crate::db::{Database, Effect, Fight, FightEvent, NewShot, Shot, UnitOfWork};
use crate::error::{CombatError, Result};

/// A shot with its actor resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ShotView {
    #[serde(flatten)]
    pub shot: Shot,
    pub actor: Option<Actor>,
    pub recovery_state: Option<RecoveryState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FightView {
    #[serde(flatten)]
    pub fight: Fight,
    pub current_shot: Option<i32>,
    /// In turn order.
    pub shots: Vec<ShotView>,
    pub effects: Vec<Effect>,
}

pub async fn create_fight(db: &Database, name: &str, campaign_id: Option<i64>) -> Result<Fight> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CombatError::validation("fight name must not be empty"));
    }
    let fight = db.create_fight(name, campaign_id).await?;
    tracing::info!(fight_id = fight.id, name, "fight created");
    Ok(fight)
}

pub async fn get_fight(db: &Database, fight_id: i64) -> Result<Fight> {
    db.get_fight(fight_id)
        .await?
        .ok_or_else(|| CombatError::not_found("fight", fight_id))
}

pub async fn list_fights(db: &Database) -> Result<Vec<Fight>> {
    Ok(db.list_fights().await?)
}

pub async fn fight_view(db: &Database, fight_id: i64) -> Result<FightView> {
    let fight = get_fight(db, fight_id).await?;
    let shots = ledger::turn_order(db.list_shots(fight_id).await?);
    let current_shot = ledger::current_shot(&shots);

    let mut views = Vec::with_capacity(shots.len());
    for shot in shots {
        let actor = match shot.actor_ref() {
            Ok(reference) => db.get_actor(reference).await?,
            Err(e) => {
                tracing::warn!(shot_id = shot.id, error = %e, "shot has no resolvable actor");
                None
            }
        };
        let recovery_state = actor.as_ref().map(|a| a.status.recovery_state());
        views.push(ShotView {
            shot,
            actor,
            recovery_state,
        });
    }

    Ok(FightView {
        fight,
        current_shot,
        shots: views,
        effects: db.list_effects(fight_id).await?,
    })
}

/// Join an actor to a fight.
pub async fn add_shot(db: &Database, fight_id: i64, new: &NewShot) -> Result<Shot> {
    super::track("add_shot", async {
        let reference = match (new.character_id, new.vehicle_id) {
            (Some(id), None) => ActorRef::Character(id),
            (None, Some(id)) => ActorRef::Vehicle(id),
            _ => {
                return Err(CombatError::validation(
                    "a shot needs exactly one of character_id or vehicle_id",
                ))
            }
        };
        if new.count < 0 {
            return Err(CombatError::validation("count must not be negative"));
        }

        let mut uow = UnitOfWork::begin(db, fight_id).await?;
        let actor = uow
            .actor(reference)
            .await?
            .ok_or_else(|| CombatError::not_found(reference.entity(), reference.id()))?;
        for linked in [new.driver_id, new.driving_id].into_iter().flatten() {
            uow.fight_shot(linked).await?;
        }

        let shot = uow.insert_shot(new).await?;
        uow.append_event(
            EVENT_JOIN,
            &format!("{} joined the fight", actor.name),
            json!({ "shot_id": shot.id, "shot_count": shot.shot_count, "actor": reference }),
        )
        .await?;
        uow.commit().await?;

        tracing::info!(fight_id, shot_id = shot.id, actor = %actor.name, "actor joined fight");
        Ok(shot)
    })
    .await
}

/// Move the fight to its next sequence and drop effects that have run out.
pub async fn advance_sequence(db: &Database, fight_id: i64) -> Result<Fight> {
    super::track("advance_sequence", async {
        let mut uow = UnitOfWork::begin(db, fight_id).await?;
        let advanced = uow.advance_sequence().await?;
        let expired = uow.expire_effects(advanced.sequence).await?;
        uow.append_event(
            EVENT_SEQUENCE,
            &format!("Sequence {} begins", advanced.sequence),
            json!({ "sequence": advanced.sequence, "expired_effects": expired }),
        )
        .await?;
        let fight = uow.commit().await?;
        tracing::info!(fight_id, sequence = fight.sequence, expired, "sequence advanced");
        Ok(fight)
    })
    .await
}

/// Soft-delete. Archived fights reject every further action.
pub async fn archive_fight(db: &Database, fight_id: i64) -> Result<Fight> {
    let mut uow = UnitOfWork::begin(db, fight_id).await?;
    uow.archive_fight().await?;
    let fight = uow.commit().await?;
    tracing::info!(fight_id, "fight archived");
    Ok(fight)
}

pub async fn list_events(db: &Database, fight_id: i64) -> Result<Vec<FightEvent>> {
    get_fight(db, fight_id).await?;
    Ok(db.list_events(fight_id).await?)
}
