// Database access layer (SQLite via sqlx).

mod unit_of_work;

pub use unit_of_work::{ActorChanges, NewEffect, NewShot, ShotChanges, UnitOfWork};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;

use crate::engine::actor::{ActionValues, Actor, ActorRef, StatusList};
use crate::error::{CombatError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fight {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub sequence: i32,
    pub archived: bool,
    pub campaign_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shot {
    pub id: i64,
    pub fight_id: i64,
    pub character_id: Option<i64>,
    pub vehicle_id: Option<i64>,
    pub shot_count: i32,
    pub count: i32,
    pub impairments: i32,
    pub location: Option<String>,
    pub driver_id: Option<i64>,
    pub driving_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Shot {
    /// The actor behind this shot. Exactly one of character/vehicle is set.
    pub fn actor_ref(&self) -> Result<ActorRef> {
        match (self.character_id, self.vehicle_id) {
            (Some(id), None) => Ok(ActorRef::Character(id)),
            (None, Some(id)) => Ok(ActorRef::Vehicle(id)),
            _ => Err(CombatError::validation(format!(
                "shot {} must reference exactly one of character or vehicle",
                self.id
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FightEvent {
    pub id: i64,
    pub fight_id: i64,
    pub event_type: String,
    pub description: String,
    pub details: Json<serde_json::Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChasePosition {
    Near,
    Far,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChaseRelationship {
    pub id: i64,
    pub fight_id: i64,
    pub pursuer_id: i64,
    pub evader_id: i64,
    pub position: ChasePosition,
    pub created_at: String,
    pub updated_at: String,
}

/// A timed numeric bonus attached to a shot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Effect {
    pub id: i64,
    pub fight_id: i64,
    pub shot_id: i64,
    pub name: String,
    pub action_value: String,
    pub change: String,
    pub expires_after_sequence: i32,
    pub created_at: String,
}

/// Row shape shared by the `characters` and `vehicles` tables.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ActorRow {
    pub id: i64,
    pub name: String,
    pub action_values: Json<ActionValues>,
    pub status: Json<StatusList>,
    pub impairments: i32,
    pub updated_at: String,
}

impl ActorRow {
    pub(crate) fn into_actor(self, reference: fn(i64) -> ActorRef) -> Actor {
        Actor {
            reference: reference(self.id),
            name: self.name,
            action_values: self.action_values.0,
            status: self.status.0,
            impairments: self.impairments,
            updated_at: self.updated_at,
        }
    }
}

pub(crate) fn actor_table(reference: ActorRef) -> &'static str {
    match reference {
        ActorRef::Character(_) => "characters",
        ActorRef::Vehicle(_) => "vehicles",
    }
}

pub(crate) const FIGHT_COLUMNS: &str =
    "id, name, active, sequence, archived, campaign_id, created_at, updated_at";
pub(crate) const SHOT_COLUMNS: &str = "id, fight_id, character_id, vehicle_id, shot_count, count, impairments, location, driver_id, driving_id, created_at, updated_at";
pub(crate) const ACTOR_COLUMNS: &str = "id, name, action_values, status, impairments, updated_at";
pub(crate) const EVENT_COLUMNS: &str =
    "id, fight_id, event_type, description, details, created_at";
pub(crate) const CHASE_COLUMNS: &str =
    "id, fight_id, pursuer_id, evader_id, position, created_at, updated_at";
pub(crate) const EFFECT_COLUMNS: &str =
    "id, fight_id, shot_id, name, action_value, change, expires_after_sequence, created_at";

/// SQLite expression for "now" with millisecond resolution.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> std::result::Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Single-connection in-memory database. The connection is never recycled,
    /// so the data lives as long as the pool.
    pub async fn in_memory() -> std::result::Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> std::result::Result<(), sqlx::Error> {
        let now = NOW;
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS fights (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1,
                    sequence INTEGER NOT NULL DEFAULT 0 CHECK (sequence >= 0),
                    archived INTEGER NOT NULL DEFAULT 0,
                    campaign_id INTEGER,
                    created_at TEXT NOT NULL DEFAULT ({now}),
                    updated_at TEXT NOT NULL DEFAULT ({now})
                )
            "#
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS characters (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    action_values TEXT NOT NULL DEFAULT '{{}}',
                    status TEXT NOT NULL DEFAULT '[]',
                    impairments INTEGER NOT NULL DEFAULT 0 CHECK (impairments >= 0),
                    created_at TEXT NOT NULL DEFAULT ({now}),
                    updated_at TEXT NOT NULL DEFAULT ({now})
                )
            "#
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS vehicles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    action_values TEXT NOT NULL DEFAULT '{{}}',
                    status TEXT NOT NULL DEFAULT '[]',
                    impairments INTEGER NOT NULL DEFAULT 0 CHECK (impairments >= 0),
                    created_at TEXT NOT NULL DEFAULT ({now}),
                    updated_at TEXT NOT NULL DEFAULT ({now})
                )
            "#
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS shots (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    fight_id INTEGER NOT NULL REFERENCES fights(id),
                    character_id INTEGER REFERENCES characters(id),
                    vehicle_id INTEGER REFERENCES vehicles(id),
                    shot_count INTEGER NOT NULL DEFAULT 0,
                    count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
                    impairments INTEGER NOT NULL DEFAULT 0 CHECK (impairments >= 0),
                    location TEXT,
                    driver_id INTEGER REFERENCES shots(id),
                    driving_id INTEGER REFERENCES shots(id),
                    created_at TEXT NOT NULL DEFAULT ({now}),
                    updated_at TEXT NOT NULL DEFAULT ({now}),
                    CHECK ((character_id IS NULL) <> (vehicle_id IS NULL))
                )
            "#
            ),
            "CREATE INDEX IF NOT EXISTS idx_shots_fight ON shots(fight_id)".to_string(),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS chase_relationships (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    fight_id INTEGER NOT NULL REFERENCES fights(id),
                    pursuer_id INTEGER NOT NULL REFERENCES shots(id),
                    evader_id INTEGER NOT NULL REFERENCES shots(id),
                    position TEXT NOT NULL DEFAULT 'far' CHECK (position IN ('near', 'far')),
                    created_at TEXT NOT NULL DEFAULT ({now}),
                    updated_at TEXT NOT NULL DEFAULT ({now}),
                    UNIQUE(fight_id, pursuer_id, evader_id),
                    CHECK (pursuer_id <> evader_id)
                )
            "#
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS fight_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    fight_id INTEGER NOT NULL REFERENCES fights(id),
                    event_type TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    details TEXT NOT NULL DEFAULT '{{}}',
                    created_at TEXT NOT NULL DEFAULT ({now})
                )
            "#
            ),
            "CREATE INDEX IF NOT EXISTS idx_fight_events_fight ON fight_events(fight_id)"
                .to_string(),
            // Events are append-only.
            r#"
                CREATE TRIGGER IF NOT EXISTS fight_events_no_update
                BEFORE UPDATE ON fight_events
                BEGIN
                    SELECT RAISE(ABORT, 'fight events are append-only');
                END
            "#
            .to_string(),
            r#"
                CREATE TRIGGER IF NOT EXISTS fight_events_no_delete
                BEFORE DELETE ON fight_events
                BEGIN
                    SELECT RAISE(ABORT, 'fight events are append-only');
                END
            "#
            .to_string(),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS effects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    fight_id INTEGER NOT NULL REFERENCES fights(id),
                    shot_id INTEGER NOT NULL REFERENCES shots(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    action_value TEXT NOT NULL,
                    change TEXT NOT NULL,
                    expires_after_sequence INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT ({now})
                )
            "#
            ),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    // ── Fights ────────────────────────────────────────────────────────

    pub async fn create_fight(
        &self,
        name: &str,
        campaign_id: Option<i64>,
    ) -> std::result::Result<Fight, sqlx::Error> {
        let sql = format!(
            "INSERT INTO fights (name, campaign_id) VALUES (?, ?) RETURNING {FIGHT_COLUMNS}"
        );
        sqlx::query_as::<_, Fight>(&sql)
            .bind(name)
            .bind(campaign_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_fight(&self, id: i64) -> std::result::Result<Option<Fight>, sqlx::Error> {
        let sql = format!("SELECT {FIGHT_COLUMNS} FROM fights WHERE id = ?");
        sqlx::query_as::<_, Fight>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fights that have not been archived, most recently touched first.
    pub async fn list_fights(&self) -> std::result::Result<Vec<Fight>, sqlx::Error> {
        let sql = format!(
            "SELECT {FIGHT_COLUMNS} FROM fights WHERE archived = 0 ORDER BY updated_at DESC, id DESC"
        );
        sqlx::query_as::<_, Fight>(&sql).fetch_all(&self.pool).await
    }

    // ── Actors ────────────────────────────────────────────────────────
    //
    // Character and vehicle CRUD belongs to the surrounding application;
    // these inserts are the seeding surface it (and the tests) use.

    pub async fn create_character(
        &self,
        name: &str,
        action_values: &ActionValues,
    ) -> std::result::Result<Actor, sqlx::Error> {
        self.insert_actor(ActorRef::Character(0), name, action_values)
            .await
    }

    pub async fn create_vehicle(
        &self,
        name: &str,
        action_values: &ActionValues,
    ) -> std::result::Result<Actor, sqlx::Error> {
        self.insert_actor(ActorRef::Vehicle(0), name, action_values)
            .await
    }

    async fn insert_actor(
        &self,
        kind: ActorRef,
        name: &str,
        action_values: &ActionValues,
    ) -> std::result::Result<Actor, sqlx::Error> {
        let table = actor_table(kind);
        let sql = format!(
            "INSERT INTO {table} (name, action_values) VALUES (?, ?) RETURNING {ACTOR_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ActorRow>(&sql)
            .bind(name)
            .bind(Json(action_values))
            .fetch_one(&self.pool)
            .await?;
        Ok(match kind {
            ActorRef::Character(_) => row.into_actor(ActorRef::Character),
            ActorRef::Vehicle(_) => row.into_actor(ActorRef::Vehicle),
        })
    }

    pub async fn get_actor(
        &self,
        reference: ActorRef,
    ) -> std::result::Result<Option<Actor>, sqlx::Error> {
        let table = actor_table(reference);
        let sql = format!("SELECT {ACTOR_COLUMNS} FROM {table} WHERE id = ?");
        let row = sqlx::query_as::<_, ActorRow>(&sql)
            .bind(reference.id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| match reference {
            ActorRef::Character(_) => r.into_actor(ActorRef::Character),
            ActorRef::Vehicle(_) => r.into_actor(ActorRef::Vehicle),
        }))
    }

    pub async fn get_character(&self, id: i64) -> std::result::Result<Option<Actor>, sqlx::Error> {
        self.get_actor(ActorRef::Character(id)).await
    }

    pub async fn get_vehicle(&self, id: i64) -> std::result::Result<Option<Actor>, sqlx::Error> {
        self.get_actor(ActorRef::Vehicle(id)).await
    }

    // ── Shots ─────────────────────────────────────────────────────────

    pub async fn get_shot(&self, id: i64) -> std::result::Result<Option<Shot>, sqlx::Error> {
        let sql = format!("SELECT {SHOT_COLUMNS} FROM shots WHERE id = ?");
        sqlx::query_as::<_, Shot>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_shots(&self, fight_id: i64) -> std::result::Result<Vec<Shot>, sqlx::Error> {
        let sql = format!("SELECT {SHOT_COLUMNS} FROM shots WHERE fight_id = ? ORDER BY id");
        sqlx::query_as::<_, Shot>(&sql)
            .bind(fight_id)
            .fetch_all(&self.pool)
            .await
    }

    // ── Events, effects, chase relationships ──────────────────────────

    pub async fn list_events(
        &self,
        fight_id: i64,
    ) -> std::result::Result<Vec<FightEvent>, sqlx::Error> {
        let sql =
            format!("SELECT {EVENT_COLUMNS} FROM fight_events WHERE fight_id = ? ORDER BY id");
        sqlx::query_as::<_, FightEvent>(&sql)
            .bind(fight_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_effects(&self, fight_id: i64) -> std::result::Result<Vec<Effect>, sqlx::Error> {
        let sql = format!("SELECT {EFFECT_COLUMNS} FROM effects WHERE fight_id = ? ORDER BY id");
        sqlx::query_as::<_, Effect>(&sql)
            .bind(fight_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_chase_relationships(
        &self,
        fight_id: i64,
    ) -> std::result::Result<Vec<ChaseRelationship>, sqlx::Error> {
        let sql = format!(
            "SELECT {CHASE_COLUMNS} FROM chase_relationships WHERE fight_id = ? ORDER BY id"
        );
        sqlx::query_as::<_, ChaseRelationship>(&sql)
            .bind(fight_id)
            .fetch_all(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::actor::ActionValue;

    async fn test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_fights() {
        let db = test_db().await;

        let fight = db.create_fight("Dockside Brawl", Some(4)).await.unwrap();
        assert_eq!(fight.name, "Dockside Brawl");
        assert!(fight.active);
        assert!(!fight.archived);
        assert_eq!(fight.sequence, 0);
        assert_eq!(fight.campaign_id, Some(4));

        db.create_fight("Rooftop Chase", None).await.unwrap();
        let fights = db.list_fights().await.unwrap();
        assert_eq!(fights.len(), 2);

        assert!(db.get_fight(fight.id).await.unwrap().is_some());
        assert!(db.get_fight(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_actor_round_trip() {
        let db = test_db().await;

        let av: ActionValues = [("Type", ActionValue::from("PC")), ("Wounds", 3.into())]
            .into_iter()
            .collect();
        let pc = db.create_character("Johnny Tso", &av).await.unwrap();
        assert!(pc.is_pc());
        assert_eq!(pc.action_values.wounds(), 3);
        assert!(pc.status.is_empty());

        let fetched = db.get_character(pc.reference.id()).await.unwrap().unwrap();
        assert_eq!(fetched.action_values, av);

        let car = db
            .create_vehicle("Muscle Car", &ActionValues::new())
            .await
            .unwrap();
        assert!(matches!(car.reference, ActorRef::Vehicle(_)));
        assert!(db.get_vehicle(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shot_requires_exactly_one_actor() {
        let db = test_db().await;
        let fight = db.create_fight("F", None).await.unwrap();

        let neither = sqlx::query("INSERT INTO shots (fight_id) VALUES (?)")
            .bind(fight.id)
            .execute(db.pool())
            .await;
        let err = CombatError::from(neither.unwrap_err());
        assert_eq!(err.kind(), "validation_failure");
    }

    #[tokio::test]
    async fn test_negative_sequence_rejected() {
        let db = test_db().await;
        let fight = db.create_fight("F", None).await.unwrap();

        let result = sqlx::query("UPDATE fights SET sequence = -1 WHERE id = ?")
            .bind(fight.id)
            .execute(db.pool())
            .await;
        let err = CombatError::from(result.unwrap_err());
        assert_eq!(err.kind(), "validation_failure");
    }

    #[tokio::test]
    async fn test_events_are_append_only() {
        let db = test_db().await;
        let fight = db.create_fight("F", None).await.unwrap();
        sqlx::query("INSERT INTO fight_events (fight_id, event_type) VALUES (?, 'note')")
            .bind(fight.id)
            .execute(db.pool())
            .await
            .unwrap();

        let update = sqlx::query("UPDATE fight_events SET description = 'edited'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM fight_events").execute(db.pool()).await;
        assert!(delete.is_err());
        assert_eq!(db.list_events(fight.id).await.unwrap().len(), 1);
    }
}
