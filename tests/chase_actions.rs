// Integration tests for the chase subsystem: additive vehicle values,
// relationship lookup by shot pair, driver shot costs.

use serde_json::json;

use shot_counter_backend::db::{ChasePosition, Database, NewShot, Shot};
use shot_counter_backend::engine::actor::{ActionValues, Actor};
use shot_counter_backend::engine::chase::{
    apply_chase_action, list_relationships, ChaseRole, ChaseUpdate,
};
use shot_counter_backend::engine::config::*;
use shot_counter_backend::engine::fight;

async fn test_db() -> Database {
    Database::in_memory().await.unwrap()
}

fn action_values(value: serde_json::Value) -> ActionValues {
    serde_json::from_value(value).unwrap()
}

async fn join_vehicle(db: &Database, fight_id: i64, name: &str, av: serde_json::Value) -> (Actor, Shot) {
    let vehicle = db.create_vehicle(name, &action_values(av)).await.unwrap();
    let shot = fight::add_shot(
        db,
        fight_id,
        &NewShot {
            vehicle_id: Some(vehicle.reference.id()),
            shot_count: 10,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    (vehicle, shot)
}

async fn join_driver(db: &Database, fight_id: i64) -> Shot {
    let driver = db
        .create_character("Wheelman", &action_values(json!({"Type": "PC"})))
        .await
        .unwrap();
    fight::add_shot(
        db,
        fight_id,
        &NewShot {
            character_id: Some(driver.reference.id()),
            shot_count: 10,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

fn values_update(vehicle: &Actor, values: serde_json::Value) -> ChaseUpdate {
    ChaseUpdate {
        vehicle_id: vehicle.reference.id(),
        action_values: action_values(values),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_chase_points_accumulate() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Freeway", None).await.unwrap();
    let (car, _) = join_vehicle(&db, f.id, "Muscle Car", json!({"Chase Points": 2, "Handling": 8})).await;

    let update = values_update(&car, json!({"Chase Points": "+3", "Handling": 9}));
    apply_chase_action(&db, f.id, &[update.clone()]).await.unwrap();
    apply_chase_action(&db, f.id, &[update]).await.unwrap();

    let stored = db.get_vehicle(car.reference.id()).await.unwrap().unwrap();
    assert_eq!(stored.action_values.chase_points(), 8);
    assert_eq!(stored.action_values.number("Handling"), Some(9));
}

#[tokio::test]
async fn test_additive_values_accumulate_within_a_batch() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Harbor", None).await.unwrap();
    let (boat, _) = join_vehicle(&db, f.id, "Speedboat", json!({"Condition Points": 1})).await;

    let update = values_update(&boat, json!({"Condition Points": 4}));
    apply_chase_action(&db, f.id, &[update.clone(), update])
        .await
        .unwrap();

    let stored = db.get_vehicle(boat.reference.id()).await.unwrap().unwrap();
    assert_eq!(stored.action_values.condition_points(), 9);
}

#[tokio::test]
async fn test_role_swap_finds_same_relationship() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Canyon", None).await.unwrap();
    let (car_a, shot_a) = join_vehicle(&db, f.id, "Interceptor", json!({})).await;
    let (car_b, shot_b) = join_vehicle(&db, f.id, "Getaway Van", json!({})).await;

    let pursue = ChaseUpdate {
        vehicle_id: car_a.reference.id(),
        shot_id: Some(shot_a.id),
        target_shot_id: Some(shot_b.id),
        position: Some(ChasePosition::Near),
        ..Default::default()
    };
    apply_chase_action(&db, f.id, &[pursue]).await.unwrap();

    let evade = ChaseUpdate {
        vehicle_id: car_b.reference.id(),
        shot_id: Some(shot_b.id),
        target_shot_id: Some(shot_a.id),
        position: Some(ChasePosition::Far),
        role: ChaseRole::Evader,
        ..Default::default()
    };
    apply_chase_action(&db, f.id, &[evade]).await.unwrap();

    let relationships = list_relationships(&db, f.id).await.unwrap();
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].pursuer_id, shot_a.id);
    assert_eq!(relationships[0].evader_id, shot_b.id);
    assert_eq!(relationships[0].position, ChasePosition::Far);
}

#[tokio::test]
async fn test_driver_pays_shot_cost() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Tunnel", None).await.unwrap();
    let (car, car_shot) = join_vehicle(&db, f.id, "Taxi", json!({})).await;
    let driver = join_driver(&db, f.id).await;

    let update = ChaseUpdate {
        shot_cost: Some(3),
        driver_shot_id: Some(driver.id),
        shot_id: Some(car_shot.id),
        ..values_update(&car, json!({"Chase Points": 1}))
    };
    apply_chase_action(&db, f.id, &[update]).await.unwrap();

    assert_eq!(db.get_shot(driver.id).await.unwrap().unwrap().shot_count, 7);
    assert_eq!(db.get_shot(car_shot.id).await.unwrap().unwrap().shot_count, 10);
}

#[tokio::test]
async fn test_missing_vehicle_is_skipped() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Bridge", None).await.unwrap();
    let (car, _) = join_vehicle(&db, f.id, "Sedan", json!({"Chase Points": 0})).await;

    let ghost = ChaseUpdate {
        vehicle_id: 999,
        ..Default::default()
    };
    let real = values_update(&car, json!({"Chase Points": 2}));
    apply_chase_action(&db, f.id, &[ghost, real]).await.unwrap();

    let stored = db.get_vehicle(car.reference.id()).await.unwrap().unwrap();
    assert_eq!(stored.action_values.chase_points(), 2);

    let events = db.list_events(f.id).await.unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EVENT_CHASE_ACTION);
    assert_eq!(last.details.0["updates"], 2);
    assert_eq!(last.details.0["applied"], 1);
}

#[tokio::test]
async fn test_failed_update_rolls_back_batch() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Airfield", None).await.unwrap();
    let (car, _) = join_vehicle(&db, f.id, "Jeep", json!({"Chase Points": 5})).await;
    let events_before = db.list_events(f.id).await.unwrap().len();

    let good = values_update(&car, json!({"Chase Points": 3}));
    let bad = values_update(&car, json!({"Chase Points": "a lot"}));
    let err = apply_chase_action(&db, f.id, &[good, bad])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_failure");

    let stored = db.get_vehicle(car.reference.id()).await.unwrap().unwrap();
    assert_eq!(stored.action_values.chase_points(), 5);
    assert_eq!(db.list_events(f.id).await.unwrap().len(), events_before);
}

#[tokio::test]
async fn test_foreign_shot_is_tenancy_violation() {
    let db = test_db().await;
    let home = fight::create_fight(&db, "Home", None).await.unwrap();
    let away = fight::create_fight(&db, "Away", None).await.unwrap();
    let (car, shot) = join_vehicle(&db, home.id, "Bike", json!({})).await;
    let (_, foreign) = join_vehicle(&db, away.id, "Truck", json!({})).await;

    let update = ChaseUpdate {
        vehicle_id: car.reference.id(),
        shot_id: Some(shot.id),
        target_shot_id: Some(foreign.id),
        position: Some(ChasePosition::Near),
        ..Default::default()
    };
    let err = apply_chase_action(&db, home.id, &[update]).await.unwrap_err();
    assert_eq!(err.kind(), "tenancy_violation");
    assert!(list_relationships(&db, home.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_spend_rolls_back_batch() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Quarry", None).await.unwrap();
    let (car, car_shot) = join_vehicle(&db, f.id, "Pickup", json!({"Chase Points": 5})).await;

    let update = ChaseUpdate {
        shot_id: Some(car_shot.id),
        shot_cost: Some(-2),
        ..values_update(&car, json!({"Chase Points": 3}))
    };
    let err = apply_chase_action(&db, f.id, &[update]).await.unwrap_err();
    assert_eq!(err.kind(), "validation_failure");

    let stored = db.get_vehicle(car.reference.id()).await.unwrap().unwrap();
    assert_eq!(stored.action_values.chase_points(), 5);
    assert_eq!(db.get_shot(car_shot.id).await.unwrap().unwrap().shot_count, 10);
    let chase_events = db
        .list_events(f.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EVENT_CHASE_ACTION)
        .count();
    assert_eq!(chase_events, 0);
}

#[tokio::test]
async fn test_vehicle_from_another_fight_is_tenancy_violation() {
    let db = test_db().await;
    let home = fight::create_fight(&db, "Home", None).await.unwrap();
    let away = fight::create_fight(&db, "Away", None).await.unwrap();
    let (_, home_shot) = join_vehicle(&db, home.id, "Bike", json!({})).await;
    let (truck, _) = join_vehicle(&db, away.id, "Truck", json!({"Chase Points": 1})).await;

    let borrowed_shot = ChaseUpdate {
        shot_id: Some(home_shot.id),
        ..values_update(&truck, json!({"Chase Points": 4}))
    };
    let err = apply_chase_action(&db, home.id, &[borrowed_shot])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tenancy_violation");

    let no_shot = values_update(&truck, json!({"Chase Points": 4}));
    let err = apply_chase_action(&db, home.id, &[no_shot])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tenancy_violation");

    let stored = db.get_vehicle(truck.reference.id()).await.unwrap().unwrap();
    assert_eq!(stored.action_values.chase_points(), 1);
}

#[tokio::test]
async fn test_shot_of_another_vehicle_is_tenancy_violation() {
    let db = test_db().await;
    let f = fight::create_fight(&db, "Overpass", None).await.unwrap();
    let (car, _) = join_vehicle(&db, f.id, "Coupe", json!({"Chase Points": 0})).await;
    let (_, van_shot) = join_vehicle(&db, f.id, "Van", json!({})).await;

    let mismatched = ChaseUpdate {
        shot_id: Some(van_shot.id),
        ..values_update(&car, json!({"Chase Points": 2}))
    };
    let err = apply_chase_action(&db, f.id, &[mismatched])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tenancy_violation");

    let stored = db.get_vehicle(car.reference.id()).await.unwrap().unwrap();
    assert_eq!(stored.action_values.chase_points(), 0);
}
