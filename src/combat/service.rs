//! Combat orchestration
//!
//! Each operation reads through [`CombatStore`], runs the pure transition,
//! and commits it together with its audit event in one transaction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::mutation::{Action, ActionValue, Combatant};
use super::session::{CombatSession, CombatStatus};
use super::stats::{resolve_hp, resolve_initiative};
use super::store::CombatStore;
use super::CombatError;
use crate::db::CommitOutcome;
use crate::encounter::{validate_roster, EncounterService, RosterMember};
use crate::events::{make_summary, summarize_roster, Event, EventLog, EventSink};

/// Attempts at a per-combatant compare-and-swap before giving up
pub const ROW_WRITE_ATTEMPTS: usize = 5;

/// `combat.start` input
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    #[serde(alias = "campaignId")]
    pub campaign_id: String,
    #[serde(default, alias = "encounterId")]
    pub encounter_id: Option<String>,
    /// Takes precedence over the encounter's roster when non-empty
    #[serde(default)]
    pub roster: Vec<RosterMember>,
}

/// One slot of the initiative order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiativeEntry {
    pub id: String,
    pub name: String,
    pub side: String,
    pub initiative: i64,
}

/// `combat.start` output
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub combat_id: String,
    pub round: i64,
    pub version: i64,
    pub initiative_order: Vec<InitiativeEntry>,
    pub summary: String,
}

/// `combat.apply` input
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyRequest {
    #[serde(alias = "combatId")]
    pub combat_id: String,
    #[serde(alias = "targetCombatantId", alias = "target")]
    pub target_combatant_id: String,
    pub action: String,
    #[serde(default)]
    pub value: Option<ActionValue>,
    #[serde(default)]
    pub condition: Option<String>,
}

/// `combat.apply` output
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub target_combatant_id: String,
    pub current_hp: i64,
    pub temp_hp: i64,
    pub conditions: Vec<String>,
    pub notes: Option<String>,
    pub summary: String,
}

/// `combat.next_turn` input
#[derive(Debug, Clone, Deserialize)]
pub struct NextTurnRequest {
    #[serde(alias = "combatId")]
    pub combat_id: String,
    /// Version the caller last observed
    pub version: i64,
}

/// The combatant whose turn it is
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveCombatant {
    pub id: String,
    pub name: String,
    pub side: String,
    pub current_hp: i64,
    pub temp_hp: i64,
}

impl From<&Combatant> for ActiveCombatant {
    fn from(c: &Combatant) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            side: c.side.clone(),
            current_hp: c.current_hp,
            temp_hp: c.temp_hp,
        }
    }
}

/// `combat.next_turn` output
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub active_combatant: Option<ActiveCombatant>,
    pub round: i64,
    pub turn_index: i64,
    pub version: i64,
    pub summary: String,
}

/// `combat.state` output
#[derive(Debug, Clone, Serialize)]
pub struct CombatView {
    pub combat_id: String,
    pub campaign_id: String,
    pub encounter_id: Option<String>,
    pub round: i64,
    pub turn_index: i64,
    pub version: i64,
    pub status: CombatStatus,
    pub active_combatant_id: Option<String>,
    /// Full records in initiative order
    pub combatants: Vec<Combatant>,
}

/// Combat service
#[derive(Debug, Clone)]
pub struct CombatService {
    store: CombatStore,
    encounters: EncounterService,
    events: Arc<dyn EventSink>,
}

impl CombatService {
    pub fn new(pool: SqlitePool, events: Arc<dyn EventSink>) -> Self {
        Self {
            store: CombatStore::new(pool.clone()),
            encounters: EncounterService::new(pool, events.clone()),
            events,
        }
    }

    pub fn store(&self) -> &CombatStore {
        &self.store
    }

    /// Start a combat from an inline roster or a saved encounter
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome, CombatError> {
        if request.campaign_id.trim().is_empty() {
            return Err(CombatError::InvalidInput("campaign_id is required".to_string()));
        }

        let roster = if !request.roster.is_empty() {
            request.roster
        } else if let Some(encounter_id) = request.encounter_id.as_deref() {
            self.encounters
                .get(encounter_id)
                .await?
                .ok_or_else(|| CombatError::not_found("encounter", encounter_id))?
                .roster
        } else {
            Vec::new()
        };

        if roster.is_empty() {
            return Err(CombatError::EmptyRoster);
        }
        validate_roster(&roster)?;

        let session = CombatSession::new(&request.campaign_id, request.encounter_id.as_deref());
        let size = roster.len();

        let mut combatants: Vec<Combatant> = roster
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let stats = member.stats.as_ref();
                let hp = resolve_hp(stats);
                Combatant {
                    id: uuid::Uuid::new_v4().to_string(),
                    combat_id: session.id.clone(),
                    name: member.name.clone(),
                    side: member.side.clone(),
                    max_hp: hp.max,
                    current_hp: hp.current,
                    temp_hp: 0,
                    initiative: resolve_initiative(stats, i, size),
                    conditions: Vec::new(),
                    notes: None,
                    stats: member.stats.clone().unwrap_or_default(),
                    position: i as i64,
                    revision: 0,
                }
            })
            .collect();

        // Stable: equal initiative keeps declaration order
        combatants.sort_by(|a, b| b.initiative.cmp(&a.initiative));

        let initiative_order: Vec<InitiativeEntry> = combatants
            .iter()
            .map(|c| InitiativeEntry {
                id: c.id.clone(),
                name: c.name.clone(),
                side: c.side.clone(),
                initiative: c.initiative,
            })
            .collect();

        let summary = make_summary(
            "Combat started",
            &summarize_roster(combatants.iter().map(|c| (c.name.as_str(), c.side.as_str()))),
            Some(&format!("{} acts first", combatants[0].name)),
        );
        let event = Event::new(
            "combat.start",
            Some(&session.campaign_id),
            summary.clone(),
            json!({
                "combat_id": session.id,
                "encounter_id": session.encounter_id,
                "initiative_order": initiative_order,
            }),
        );

        let mut tx = self.store.pool().begin().await?;
        CombatStore::insert_session(&mut tx, &session).await?;
        for combatant in &combatants {
            CombatStore::insert_combatant(&mut tx, combatant).await?;
        }
        EventLog::append(&mut tx, &event).await?;
        tx.commit().await?;

        self.events.publish(&event);
        info!(
            "Started combat {} in campaign {} with {} combatants",
            session.id, session.campaign_id, size
        );

        Ok(StartOutcome {
            combat_id: session.id,
            round: session.round,
            version: session.version,
            initiative_order,
            summary,
        })
    }

    /// Apply one action to one combatant.
    ///
    /// Only the target row is compared-and-swapped; the session version is
    /// left alone, so edits to different combatants never conflict.
    pub async fn apply(&self, request: ApplyRequest) -> Result<ApplyOutcome, CombatError> {
        let mut combatant = self.locate(&request.combat_id, &request.target_combatant_id).await?;
        let action = Action::from_request(
            &request.action,
            request.value.as_ref(),
            request.condition.as_deref(),
        )?;
        let campaign_id = self
            .store
            .get_session(&request.combat_id)
            .await?
            .map(|s| s.campaign_id);

        for attempt in 1..=ROW_WRITE_ATTEMPTS {
            if attempt > 1 {
                combatant = self.locate(&request.combat_id, &request.target_combatant_id).await?;
            }

            let mutation = action.apply(&combatant);

            let mut tx = self.store.pool().begin().await?;
            match CombatStore::commit_combatant(&mut tx, &mutation.combatant).await? {
                CommitOutcome::Committed => {}
                CommitOutcome::Aborted => {
                    tx.rollback().await?;
                    debug!(
                        "Combatant {} changed underneath {} (attempt {}), re-reading",
                        combatant.id,
                        action.tag(),
                        attempt
                    );
                    continue;
                }
            }

            let updated = mutation.combatant;
            let event = Event::new(
                format!("combat.{}", action.tag()),
                campaign_id.as_deref(),
                mutation.summary.clone(),
                json!({
                    "combat_id": updated.combat_id,
                    "combatant_id": updated.id,
                    "current_hp": updated.current_hp,
                    "temp_hp": updated.temp_hp,
                    "conditions": updated.conditions,
                }),
            );
            EventLog::append(&mut tx, &event).await?;
            tx.commit().await?;

            self.events.publish(&event);
            debug!("{}", mutation.summary);

            return Ok(ApplyOutcome {
                target_combatant_id: updated.id,
                current_hp: updated.current_hp,
                temp_hp: updated.temp_hp,
                conditions: updated.conditions,
                notes: updated.notes,
                summary: mutation.summary,
            });
        }

        warn!(
            "Gave up writing combatant {} after {} attempts",
            request.target_combatant_id, ROW_WRITE_ATTEMPTS
        );
        Err(CombatError::WriteContention(request.target_combatant_id))
    }

    /// Advance to the next turn if the caller's version is still current
    pub async fn next_turn(&self, request: NextTurnRequest) -> Result<TurnOutcome, CombatError> {
        let mut session = self
            .store
            .get_session(&request.combat_id)
            .await?
            .ok_or_else(|| CombatError::not_found("combat", &request.combat_id))?;

        if let Err(err) = session.check_version(request.version) {
            warn!(
                "Stale next_turn on combat {}: caller has version {}, stored {}",
                session.id, request.version, session.version
            );
            return Err(err);
        }

        let combatants = self.store.list_combatants(&session.id).await?;
        let advance = session.advance(request.version, combatants.len())?;

        let mut tx = self.store.pool().begin().await?;
        if let CommitOutcome::Aborted = CombatStore::commit_advance(&mut tx, &session.id, &advance).await? {
            tx.rollback().await?;
            let actual = self
                .store
                .session_version(&session.id)
                .await?
                .unwrap_or(advance.from_version);
            warn!(
                "Lost next_turn race on combat {} at version {} (now {})",
                session.id, advance.from_version, actual
            );
            return Err(CombatError::VersionConflict {
                combat_id: session.id,
                expected: request.version,
                actual,
            });
        }

        session.apply(&advance);
        let active = combatants.get(session.turn_index as usize);
        let active_name = active.map(|c| c.name.as_str()).unwrap_or("nobody");

        let summary = make_summary(
            "Combat next turn",
            active_name,
            Some(&format!(
                "round {}, turn {}",
                session.round,
                session.turn_index + 1
            )),
        );
        let event = Event::new(
            "combat.next_turn",
            Some(&session.campaign_id),
            summary.clone(),
            json!({
                "combat_id": session.id,
                "round": session.round,
                "turn_index": session.turn_index,
                "version": session.version,
                "active_combatant_id": active.map(|c| c.id.clone()),
            }),
        );
        EventLog::append(&mut tx, &event).await?;
        tx.commit().await?;

        self.events.publish(&event);
        info!(
            "Combat {} advanced to round {} turn {} (version {})",
            session.id, session.round, session.turn_index, session.version
        );

        Ok(TurnOutcome {
            active_combatant: active.map(ActiveCombatant::from),
            round: session.round,
            turn_index: session.turn_index,
            version: session.version,
            summary,
        })
    }

    /// Current session state with every combatant
    pub async fn state(&self, combat_id: &str) -> Result<CombatView, CombatError> {
        let session = self
            .store
            .get_session(combat_id)
            .await?
            .ok_or_else(|| CombatError::not_found("combat", combat_id))?;
        let combatants = self.store.list_combatants(combat_id).await?;

        Ok(CombatView {
            active_combatant_id: combatants
                .get(session.turn_index as usize)
                .map(|c| c.id.clone()),
            combat_id: session.id,
            campaign_id: session.campaign_id,
            encounter_id: session.encounter_id,
            round: session.round,
            turn_index: session.turn_index,
            version: session.version,
            status: session.status,
            combatants,
        })
    }

    async fn locate(&self, combat_id: &str, combatant_id: &str) -> Result<Combatant, CombatError> {
        let combatant = self
            .store
            .get_combatant(combatant_id)
            .await?
            .ok_or_else(|| CombatError::not_found("combatant", combatant_id))?;

        if combatant.combat_id != combat_id {
            return Err(CombatError::WrongSession {
                combatant_id: combatant_id.to_string(),
                combat_id: combat_id.to_string(),
            });
        }
        Ok(combatant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_pool;
    use crate::encounter::BuildRequest;
    use crate::events::MemorySink;
    use crate::error::ErrorKind;
    use serde_json::Value;

    fn member(name: &str, side: &str, stats: Value) -> RosterMember {
        RosterMember {
            name: name.to_string(),
            side: side.to_string(),
            stats: stats.as_object().cloned(),
        }
    }

    async fn service() -> (CombatService, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (CombatService::new(test_pool().await, sink.clone()), sink)
    }

    fn start_request(roster: Vec<RosterMember>) -> StartRequest {
        StartRequest {
            campaign_id: "camp".to_string(),
            encounter_id: None,
            roster,
        }
    }

    fn apply_request(combat_id: &str, target: &str, action: &str, value: Option<ActionValue>) -> ApplyRequest {
        ApplyRequest {
            combat_id: combat_id.to_string(),
            target_combatant_id: target.to_string(),
            action: action.to_string(),
            value,
            condition: None,
        }
    }

    #[tokio::test]
    async fn test_start_orders_by_initiative() {
        let (service, sink) = service().await;
        let outcome = service
            .start(start_request(vec![
                member("Goblin", "monsters", json!({"initiative": 12, "hp": 7})),
                member("Aria", "party", json!({"initiative": 18, "maxHp": 10})),
                member("Borin", "party", json!({"dex_mod": 12})),
            ]))
            .await
            .unwrap();

        assert_eq!(outcome.round, 1);
        assert_eq!(outcome.version, 1);
        let names: Vec<&str> = outcome.initiative_order.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Aria", "Goblin", "Borin"]);
        assert_eq!(sink.kinds(), vec!["combat.start"]);
        assert_eq!(
            outcome.summary,
            "Combat started: 3 combatants (2 party, 1 monsters) - Aria acts first"
        );
    }

    #[tokio::test]
    async fn test_fallback_initiative_keeps_declaration_order() {
        let (service, _) = service().await;
        let outcome = service
            .start(start_request(vec![
                RosterMember::new("A", "side1"),
                RosterMember::new("B", "side2"),
            ]))
            .await
            .unwrap();

        let names: Vec<&str> = outcome.initiative_order.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(outcome.initiative_order[0].initiative > outcome.initiative_order[1].initiative);
    }

    #[tokio::test]
    async fn test_start_empty_roster() {
        let (service, sink) = service().await;
        let err = service.start(start_request(Vec::new())).await.unwrap_err();
        assert!(matches!(err, CombatError::EmptyRoster));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_start_from_encounter() {
        let (service, _) = service().await;
        let built = service
            .encounters
            .build(BuildRequest {
                campaign_id: "camp".to_string(),
                name: "Crypt".to_string(),
                difficulty: "hard".to_string(),
                roster: vec![
                    RosterMember::new("Skeleton", "undead"),
                    RosterMember::new("Zombie", "undead"),
                ],
                notes: None,
            })
            .await
            .unwrap();

        let outcome = service
            .start(StartRequest {
                campaign_id: "camp".to_string(),
                encounter_id: Some(built.encounter_id.clone()),
                roster: Vec::new(),
            })
            .await
            .unwrap();
        let names: Vec<&str> = outcome.initiative_order.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Skeleton", "Zombie"]);

        let view = service.state(&outcome.combat_id).await.unwrap();
        assert_eq!(view.encounter_id, Some(built.encounter_id));
    }

    #[tokio::test]
    async fn test_start_missing_encounter() {
        let (service, _) = service().await;
        let err = service
            .start(StartRequest {
                campaign_id: "camp".to_string(),
                encounter_id: Some("nope".to_string()),
                roster: Vec::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_apply_damage_absorbs_temp_hp() {
        let (service, sink) = service().await;
        let outcome = service
            .start(start_request(vec![member("Aria", "party", json!({"hp": 10}))]))
            .await
            .unwrap();
        let aria = outcome.initiative_order[0].id.clone();

        service
            .apply(apply_request(&outcome.combat_id, &aria, "temp_hp", Some(ActionValue::Number(5))))
            .await
            .unwrap();
        let applied = service
            .apply(apply_request(&outcome.combat_id, &aria, "damage", Some(ActionValue::Number(7))))
            .await
            .unwrap();

        assert_eq!(applied.temp_hp, 0);
        assert_eq!(applied.current_hp, 8);
        assert_eq!(applied.summary, "Combat damage: Aria - hp 8/10");
        assert_eq!(sink.kinds(), vec!["combat.start", "combat.temp_hp", "combat.damage"]);

        // Row edits leave the session version alone
        let view = service.state(&outcome.combat_id).await.unwrap();
        assert_eq!(view.version, 1);
    }

    #[tokio::test]
    async fn test_apply_condition_idempotent() {
        let (service, _) = service().await;
        let outcome = service
            .start(start_request(vec![RosterMember::new("Aria", "party")]))
            .await
            .unwrap();
        let aria = outcome.initiative_order[0].id.clone();

        for _ in 0..2 {
            let mut request = apply_request(&outcome.combat_id, &aria, "add_condition", None);
            request.condition = Some("prone".to_string());
            let applied = service.apply(request).await.unwrap();
            assert_eq!(applied.conditions, vec!["prone"]);
        }
    }

    #[tokio::test]
    async fn test_apply_wrong_session_and_missing() {
        let (service, _) = service().await;
        let first = service
            .start(start_request(vec![RosterMember::new("Aria", "party")]))
            .await
            .unwrap();
        let second = service
            .start(start_request(vec![RosterMember::new("Borin", "party")]))
            .await
            .unwrap();

        let err = service
            .apply(apply_request(
                &second.combat_id,
                &first.initiative_order[0].id,
                "heal",
                Some(ActionValue::Number(1)),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::WrongSession { .. }));

        let err = service
            .apply(apply_request(&first.combat_id, "ghost", "heal", Some(ActionValue::Number(1))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_apply_invalid_action() {
        let (service, sink) = service().await;
        let outcome = service
            .start(start_request(vec![RosterMember::new("Aria", "party")]))
            .await
            .unwrap();
        let err = service
            .apply(apply_request(&outcome.combat_id, &outcome.initiative_order[0].id, "fireball", None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_next_turn_wraps_round() {
        let (service, _) = service().await;
        let outcome = service
            .start(start_request(vec![
                RosterMember::new("A", "party"),
                RosterMember::new("B", "party"),
                RosterMember::new("C", "monsters"),
            ]))
            .await
            .unwrap();

        let mut version = outcome.version;
        let mut last = None;
        for _ in 0..3 {
            let turn = service
                .next_turn(NextTurnRequest {
                    combat_id: outcome.combat_id.clone(),
                    version,
                })
                .await
                .unwrap();
            version = turn.version;
            last = Some(turn);
        }

        let last = last.unwrap();
        assert_eq!(last.turn_index, 0);
        assert_eq!(last.round, 2);
        assert_eq!(last.version, 4);
        assert_eq!(last.active_combatant.unwrap().name, "A");
        assert_eq!(last.summary, "Combat next turn: A - round 2, turn 1");
    }

    #[tokio::test]
    async fn test_next_turn_stale_version() {
        let (service, sink) = service().await;
        let outcome = service
            .start(start_request(vec![RosterMember::new("A", "party")]))
            .await
            .unwrap();

        let err = service
            .next_turn(NextTurnRequest {
                combat_id: outcome.combat_id.clone(),
                version: 7,
            })
            .await
            .unwrap_err();
        match err {
            CombatError::VersionConflict { expected, actual, .. } => {
                assert_eq!(expected, 7);
                assert_eq!(actual, 1);
            }
            other => panic!("expected version conflict, got {:?}", other),
        }

        let view = service.state(&outcome.combat_id).await.unwrap();
        assert_eq!(view.version, 1);
        assert_eq!(view.turn_index, 0);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_next_turn_single_winner() {
        let (service, _) = service().await;
        let outcome = service
            .start(start_request(vec![
                RosterMember::new("A", "party"),
                RosterMember::new("B", "monsters"),
            ]))
            .await
            .unwrap();

        let request = NextTurnRequest {
            combat_id: outcome.combat_id.clone(),
            version: outcome.version,
        };
        let (first, second) = futures_util::join!(
            service.next_turn(request.clone()),
            service.next_turn(request.clone())
        );

        let results = [first, second];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(results.iter().any(|r| matches!(r, Err(CombatError::VersionConflict { .. }))));

        let view = service.state(&outcome.combat_id).await.unwrap();
        assert_eq!(view.version, 2);
        assert_eq!(view.turn_index, 1);
    }

    #[tokio::test]
    async fn test_state_missing() {
        let (service, _) = service().await;
        let err = service.state("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_state_tracks_active() {
        let (service, _) = service().await;
        let outcome = service
            .start(start_request(vec![
                RosterMember::new("A", "party"),
                RosterMember::new("B", "monsters"),
            ]))
            .await
            .unwrap();
        let view = service.state(&outcome.combat_id).await.unwrap();
        assert_eq!(view.active_combatant_id, Some(outcome.initiative_order[0].id.clone()));
        assert_eq!(view.combatants.len(), 2);
        assert_eq!(view.status, CombatStatus::Active);
    }
}
