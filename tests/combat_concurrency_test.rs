//! Concurrency tests against a file-backed database with a real connection pool

mod common;

use std::sync::Arc;

use common::TabletopTest;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tabletop::combat::{ActionValue, ApplyRequest, CombatError, CombatService, NextTurnRequest, StartRequest};
use tabletop::db::Database;
use tabletop::encounter::RosterMember;
use tabletop::events::MemorySink;

async fn file_service(dir: &tempfile::TempDir) -> CombatService {
    let path = dir.path().join("campaign.db");
    let db = Database::new(path.to_str()).await.expect("Failed to open database");
    CombatService::new(db.pool().clone(), Arc::new(MemorySink::new()))
}

fn member(name: &str, side: &str, hp: i64) -> RosterMember {
    let mut stats = serde_json::Map::new();
    stats.insert("hp".to_string(), json!(hp));
    RosterMember::new(name, side).with_stats(stats)
}

#[tokio::test]
async fn test_next_turn_race_has_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(&dir).await;

    let started = service
        .start(StartRequest {
            campaign_id: "camp".to_string(),
            encounter_id: None,
            roster: vec![member("A", "party", 10), member("B", "monsters", 10), member("C", "monsters", 10)],
        })
        .await
        .unwrap();

    let request = NextTurnRequest {
        combat_id: started.combat_id.clone(),
        version: started.version,
    };
    let results = join_all((0..4).map(|_| service.next_turn(request.clone()))).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, CombatError::VersionConflict { .. }), "{:?}", err);
        }
    }

    let view = service.state(&started.combat_id).await.unwrap();
    assert_eq!(view.version, 2);
    assert_eq!(view.turn_index, 1);
    assert_eq!(view.round, 1);
}

#[tokio::test]
async fn test_same_combatant_edits_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(&dir).await;

    let started = service
        .start(StartRequest {
            campaign_id: "camp".to_string(),
            encounter_id: None,
            roster: vec![member("Ogre", "monsters", 50)],
        })
        .await
        .unwrap();
    let ogre = started.initiative_order[0].id.clone();

    let hits = (0..3).map(|_| {
        service.apply(ApplyRequest {
            combat_id: started.combat_id.clone(),
            target_combatant_id: ogre.clone(),
            action: "damage".to_string(),
            value: Some(ActionValue::Number(5)),
            condition: None,
        })
    });
    for result in join_all(hits).await {
        result.unwrap();
    }

    let view = service.state(&started.combat_id).await.unwrap();
    assert_eq!(view.combatants[0].current_hp, 35);
    assert_eq!(view.version, 1);
}

#[tokio::test]
async fn test_http_next_turn_race() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("http.db").to_string_lossy().into_owned();
    let tabletop = TabletopTest::start_with_db(Some(path)).await.unwrap();

    let started = tabletop
        .start_combat("camp", &[("A", "party", Value::Null), ("B", "monsters", Value::Null)])
        .await
        .unwrap();
    let body = json!({"combat_id": started["combat_id"], "version": 1});

    let (first, second) = tokio::join!(
        tabletop.post("/combat/next_turn", &body),
        tabletop.post("/combat/next_turn", &body)
    );
    let mut statuses = vec![first.unwrap().status().as_u16(), second.unwrap().status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 409]);

    let resp = tabletop
        .get(&format!("/combat/{}", started["combat_id"].as_str().unwrap()))
        .await
        .unwrap();
    let state: Value = resp.json().await.unwrap();
    assert_eq!(state["version"], 2);
}
