// Transactional unit of work: every read and write one combat action makes.
//
// A unit of work holds a single SQLite transaction. Dropping it without
// calling `commit` rolls everything back, so a failed batch leaves nothing
// behind.

use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{Sqlite, Transaction};

use super::{
    actor_table, ActorRow, ChasePosition, ChaseRelationship, Database, Effect, Fight, FightEvent,
    Shot, ACTOR_COLUMNS, CHASE_COLUMNS, EFFECT_COLUMNS, EVENT_COLUMNS, FIGHT_COLUMNS, NOW,
    SHOT_COLUMNS,
};
use crate::engine::actor::{ActionValues, Actor, ActorRef, StatusList};
use crate::error::{CombatError, Result};
use crate::metrics;

/// Shot fields to write. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShotChanges {
    pub shot_count: Option<i32>,
    pub count: Option<i32>,
    pub impairments: Option<i32>,
    pub location: Option<String>,
}

impl ShotChanges {
    pub fn is_empty(&self) -> bool {
        self.shot_count.is_none()
            && self.count.is_none()
            && self.impairments.is_none()
            && self.location.is_none()
    }
}

/// Actor fields to write. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorChanges {
    pub action_values: Option<ActionValues>,
    pub status: Option<StatusList>,
    pub impairments: Option<i32>,
}

impl ActorChanges {
    pub fn is_empty(&self) -> bool {
        self.action_values.is_none() && self.status.is_none() && self.impairments.is_none()
    }
}

/// A new turn-order entry for an actor joining a fight.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewShot {
    pub character_id: Option<i64>,
    pub vehicle_id: Option<i64>,
    #[serde(default)]
    pub shot_count: i32,
    #[serde(default)]
    pub count: i32,
    pub location: Option<String>,
    pub driver_id: Option<i64>,
    pub driving_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewEffect {
    pub shot_id: i64,
    pub name: String,
    pub action_value: String,
    pub change: String,
    pub expires_after_sequence: i32,
}

pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    fight: Fight,
    writes: usize,
    events: usize,
}

impl UnitOfWork {
    /// Open a transaction scoped to one fight.
    ///
    /// The first statement writes the fight row, which takes SQLite's write
    /// lock immediately: concurrent actions wait on the busy timeout rather
    /// than failing when a read lock is upgraded later.
    pub async fn begin(db: &Database, fight_id: i64) -> Result<Self> {
        let mut tx = db.pool().begin().await?;
        let sql = format!(
            "UPDATE fights SET sequence = sequence WHERE id = ? RETURNING {FIGHT_COLUMNS}"
        );
        let fight = sqlx::query_as::<_, Fight>(&sql)
            .bind(fight_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CombatError::not_found("fight", fight_id))?;

        if fight.archived {
            return Err(CombatError::validation(format!(
                "fight {fight_id} is archived"
            )));
        }

        Ok(Self {
            tx,
            fight,
            writes: 0,
            events: 0,
        })
    }

    pub fn fight(&self) -> &Fight {
        &self.fight
    }

    /// Number of writes recorded so far (events included).
    pub fn writes(&self) -> usize {
        self.writes
    }

    // ── Shots ─────────────────────────────────────────────────────────

    pub async fn shot(&mut self, id: i64) -> Result<Option<Shot>> {
        let sql = format!("SELECT {SHOT_COLUMNS} FROM shots WHERE id = ?");
        let shot = sqlx::query_as::<_, Shot>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(shot)
    }

    /// Load a shot and check it belongs to this fight.
    pub async fn fight_shot(&mut self, id: i64) -> Result<Shot> {
        let shot = self
            .shot(id)
            .await?
            .ok_or_else(|| CombatError::not_found("shot", id))?;
        if shot.fight_id != self.fight.id {
            return Err(CombatError::tenancy("shot", id, self.fight.id));
        }
        Ok(shot)
    }

    pub async fn find_shot_by_actor(&mut self, actor: ActorRef) -> Result<Option<Shot>> {
        let column = match actor {
            ActorRef::Character(_) => "character_id",
            ActorRef::Vehicle(_) => "vehicle_id",
        };
        let sql = format!(
            "SELECT {SHOT_COLUMNS} FROM shots WHERE fight_id = ? AND {column} = ? ORDER BY id LIMIT 1"
        );
        let shot = sqlx::query_as::<_, Shot>(&sql)
            .bind(self.fight.id)
            .bind(actor.id())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(shot)
    }

    pub async fn insert_shot(&mut self, new: &NewShot) -> Result<Shot> {
        let sql = format!(
            "INSERT INTO shots (fight_id, character_id, vehicle_id, shot_count, count, location, driver_id, driving_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {SHOT_COLUMNS}"
        );
        let shot = sqlx::query_as::<_, Shot>(&sql)
            .bind(self.fight.id)
            .bind(new.character_id)
            .bind(new.vehicle_id)
            .bind(new.shot_count)
            .bind(new.count)
            .bind(new.location.as_deref())
            .bind(new.driver_id)
            .bind(new.driving_id)
            .fetch_one(&mut *self.tx)
            .await?;
        self.writes += 1;
        Ok(shot)
    }

    /// Write shot fields. An empty change set is skipped and returns the shot as given.
    pub async fn update_shot(&mut self, shot: &Shot, changes: &ShotChanges) -> Result<Shot> {
        if changes.is_empty() {
            return Ok(shot.clone());
        }
        let sql = format!(
            "UPDATE shots SET \
                shot_count = COALESCE(?, shot_count), \
                count = COALESCE(?, count), \
                impairments = COALESCE(?, impairments), \
                location = COALESCE(?, location), \
                updated_at = {NOW} \
             WHERE id = ? RETURNING {SHOT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Shot>(&sql)
            .bind(changes.shot_count)
            .bind(changes.count)
            .bind(changes.impairments)
            .bind(changes.location.as_deref())
            .bind(shot.id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| CombatError::not_found("shot", shot.id))?;
        self.writes += 1;
        Ok(updated)
    }

    // ── Actors ────────────────────────────────────────────────────────

    pub async fn actor(&mut self, reference: ActorRef) -> Result<Option<Actor>> {
        let table = actor_table(reference);
        let sql = format!("SELECT {ACTOR_COLUMNS} FROM {table} WHERE id = ?");
        let row = sqlx::query_as::<_, ActorRow>(&sql)
            .bind(reference.id())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| match reference {
            ActorRef::Character(_) => r.into_actor(ActorRef::Character),
            ActorRef::Vehicle(_) => r.into_actor(ActorRef::Vehicle),
        }))
    }

    /// Write actor fields. An empty change set is skipped and returns the actor as given.
    pub async fn update_actor(&mut self, actor: &Actor, changes: &ActorChanges) -> Result<Actor> {
        if changes.is_empty() {
            return Ok(actor.clone());
        }
        let table = actor_table(actor.reference);
        let sql = format!(
            "UPDATE {table} SET \
                action_values = COALESCE(?, action_values), \
                status = COALESCE(?, status), \
                impairments = COALESCE(?, impairments), \
                updated_at = {NOW} \
             WHERE id = ? RETURNING {ACTOR_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ActorRow>(&sql)
            .bind(changes.action_values.as_ref().map(Json))
            .bind(changes.status.as_ref().map(Json))
            .bind(changes.impairments)
            .bind(actor.reference.id())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| {
                CombatError::not_found(actor.reference.entity(), actor.reference.id())
            })?;
        self.writes += 1;
        Ok(match actor.reference {
            ActorRef::Character(_) => row.into_actor(ActorRef::Character),
            ActorRef::Vehicle(_) => row.into_actor(ActorRef::Vehicle),
        })
    }

    // ── Chase relationships ───────────────────────────────────────────

    /// Find the relationship for this shot pair, creating it if needed.
    pub async fn find_or_create_chase(
        &mut self,
        pursuer_id: i64,
        evader_id: i64,
    ) -> Result<ChaseRelationship> {
        let inserted = sqlx::query(
            "INSERT INTO chase_relationships (fight_id, pursuer_id, evader_id) VALUES (?, ?, ?) \
             ON CONFLICT(fight_id, pursuer_id, evader_id) DO NOTHING",
        )
        .bind(self.fight.id)
        .bind(pursuer_id)
        .bind(evader_id)
        .execute(&mut *self.tx)
        .await?;
        if inserted.rows_affected() > 0 {
            self.writes += 1;
        }

        let sql = format!(
            "SELECT {CHASE_COLUMNS} FROM chase_relationships \
             WHERE fight_id = ? AND pursuer_id = ? AND evader_id = ?"
        );
        let relationship = sqlx::query_as::<_, ChaseRelationship>(&sql)
            .bind(self.fight.id)
            .bind(pursuer_id)
            .bind(evader_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(relationship)
    }

    pub async fn update_chase(
        &mut self,
        relationship: &ChaseRelationship,
        position: ChasePosition,
    ) -> Result<ChaseRelationship> {
        if relationship.position == position {
            return Ok(relationship.clone());
        }
        let sql = format!(
            "UPDATE chase_relationships SET position = ?, updated_at = {NOW} \
             WHERE id = ? RETURNING {CHASE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, ChaseRelationship>(&sql)
            .bind(position)
            .bind(relationship.id)
            .fetch_one(&mut *self.tx)
            .await?;
        self.writes += 1;
        Ok(updated)
    }

    // ── Events ────────────────────────────────────────────────────────

    pub async fn append_event(
        &mut self,
        event_type: &str,
        description: &str,
        details: serde_json::Value,
    ) -> Result<FightEvent> {
        let details = if details.is_null() {
            serde_json::json!({})
        } else {
            details
        };
        let sql = format!(
            "INSERT INTO fight_events (fight_id, event_type, description, details) \
             VALUES (?, ?, ?, ?) RETURNING {EVENT_COLUMNS}"
        );
        let event = sqlx::query_as::<_, FightEvent>(&sql)
            .bind(self.fight.id)
            .bind(event_type)
            .bind(description)
            .bind(Json(&details))
            .fetch_one(&mut *self.tx)
            .await?;
        self.writes += 1;
        self.events += 1;
        Ok(event)
    }

    // ── Effects ───────────────────────────────────────────────────────

    pub async fn add_effect(&mut self, effect: &NewEffect) -> Result<Effect> {
        let sql = format!(
            "INSERT INTO effects (fight_id, shot_id, name, action_value, change, expires_after_sequence) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {EFFECT_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Effect>(&sql)
            .bind(self.fight.id)
            .bind(effect.shot_id)
            .bind(&effect.name)
            .bind(&effect.action_value)
            .bind(&effect.change)
            .bind(effect.expires_after_sequence)
            .fetch_one(&mut *self.tx)
            .await?;
        self.writes += 1;
        Ok(created)
    }

    /// Delete effects that expired before `sequence`. Returns how many went.
    pub async fn expire_effects(&mut self, sequence: i32) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM effects WHERE fight_id = ? AND expires_after_sequence < ?")
                .bind(self.fight.id)
                .bind(sequence)
                .execute(&mut *self.tx)
                .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            self.writes += 1;
        }
        Ok(removed)
    }

    // ── Fight ─────────────────────────────────────────────────────────

    pub async fn advance_sequence(&mut self) -> Result<Fight> {
        let sql = format!(
            "UPDATE fights SET sequence = sequence + 1 WHERE id = ? RETURNING {FIGHT_COLUMNS}"
        );
        self.fight = sqlx::query_as::<_, Fight>(&sql)
            .bind(self.fight.id)
            .fetch_one(&mut *self.tx)
            .await?;
        self.writes += 1;
        Ok(self.fight.clone())
    }

    pub async fn archive_fight(&mut self) -> Result<Fight> {
        let sql = format!(
            "UPDATE fights SET archived = 1, active = 0 WHERE id = ? RETURNING {FIGHT_COLUMNS}"
        );
        self.fight = sqlx::query_as::<_, Fight>(&sql)
            .bind(self.fight.id)
            .fetch_one(&mut *self.tx)
            .await?;
        self.writes += 1;
        Ok(self.fight.clone())
    }

    /// Touch the fight's freshness marker and commit. The touch happens once,
    /// here, after every other write of the action.
    pub async fn commit(mut self) -> Result<Fight> {
        let sql =
            format!("UPDATE fights SET updated_at = {NOW} WHERE id = ? RETURNING {FIGHT_COLUMNS}");
        let fight = sqlx::query_as::<_, Fight>(&sql)
            .bind(self.fight.id)
            .fetch_one(&mut *self.tx)
            .await?;
        self.tx.commit().await?;

        metrics::EVENTS_APPENDED_TOTAL.inc_by(self.events as u64);
        tracing::debug!(
            fight_id = fight.id,
            writes = self.writes,
            events = self.events,
            "unit of work committed"
        );
        Ok(fight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (Database, Fight, Actor) {
        let db = Database::in_memory().await.unwrap();
        let fight = db.create_fight("Junkyard", None).await.unwrap();
        let car = db
            .create_vehicle("Tow Truck", &ActionValues::new())
            .await
            .unwrap();
        (db, fight, car)
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let (db, fight, car) = seeded().await;
        {
            let mut uow = UnitOfWork::begin(&db, fight.id).await.unwrap();
            uow.insert_shot(&NewShot {
                vehicle_id: Some(car.reference.id()),
                ..Default::default()
            })
            .await
            .unwrap();
            uow.append_event("note", "never lands", serde_json::Value::Null)
                .await
                .unwrap();
        }
        assert!(db.list_shots(fight.id).await.unwrap().is_empty());
        assert!(db.list_events(fight.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shot_lookup_by_actor() {
        let (db, fight, car) = seeded().await;
        let mut uow = UnitOfWork::begin(&db, fight.id).await.unwrap();
        assert!(uow.find_shot_by_actor(car.reference).await.unwrap().is_none());

        let shot = uow
            .insert_shot(&NewShot {
                vehicle_id: Some(car.reference.id()),
                shot_count: 8,
                ..Default::default()
            })
            .await
            .unwrap();
        let found = uow.find_shot_by_actor(car.reference).await.unwrap().unwrap();
        assert_eq!(found.id, shot.id);
        assert!(uow
            .find_shot_by_actor(ActorRef::Character(car.reference.id()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_changes_skip_the_write() {
        let (db, fight, car) = seeded().await;
        let mut uow = UnitOfWork::begin(&db, fight.id).await.unwrap();
        let shot = uow
            .insert_shot(&NewShot {
                vehicle_id: Some(car.reference.id()),
                ..Default::default()
            })
            .await
            .unwrap();
        let writes = uow.writes();

        uow.update_shot(&shot, &ShotChanges::default()).await.unwrap();
        uow.update_actor(&car, &ActorChanges::default()).await.unwrap();
        assert_eq!(uow.writes(), writes);

        let changes = ShotChanges {
            impairments: Some(-1),
            ..Default::default()
        };
        let err = uow.update_shot(&shot, &changes).await.unwrap_err();
        assert_eq!(err.kind(), "validation_failure");
    }

    #[tokio::test]
    async fn test_chase_pair_is_unique() {
        let (db, fight, car) = seeded().await;
        let mut uow = UnitOfWork::begin(&db, fight.id).await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let shot = uow
                .insert_shot(&NewShot {
                    vehicle_id: Some(car.reference.id()),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(shot.id);
        }

        let first = uow.find_or_create_chase(ids[0], ids[1]).await.unwrap();
        assert_eq!(first.position, ChasePosition::Far);
        let near = uow.update_chase(&first, ChasePosition::Near).await.unwrap();
        let again = uow.find_or_create_chase(ids[0], ids[1]).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.position, near.position);
    }

    #[tokio::test]
    async fn test_missing_and_archived_fights() {
        let (db, fight, _) = seeded().await;
        let err = UnitOfWork::begin(&db, 77).await.err().unwrap();
        assert_eq!(err.kind(), "not_found");

        let mut uow = UnitOfWork::begin(&db, fight.id).await.unwrap();
        uow.archive_fight().await.unwrap();
        uow.commit().await.unwrap();
        let err = UnitOfWork::begin(&db, fight.id).await.err().unwrap();
        assert_eq!(err.kind(), "validation_failure");
    }
}
