// Boost resolver: one actor spends shots (and optionally Fortune) to buff another.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::config::*;
use super::ledger;
use crate::db::{ActorChanges, Database, Fight, NewEffect, UnitOfWork};
use crate::error::{CombatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostType {
    Attack,
    Defense,
}

impl BoostType {
    pub fn as_str(self) -> &'static str {
        match self {
            BoostType::Attack => "attack",
            BoostType::Defense => "defense",
        }
    }

    pub fn bonus(self, fortune: bool) -> i32 {
        match (self, fortune) {
            (BoostType::Attack, false) => BOOST_ATTACK_BONUS,
            (BoostType::Attack, true) => BOOST_ATTACK_FORTUNE_BONUS,
            (BoostType::Defense, false) => BOOST_DEFENSE_BONUS,
            (BoostType::Defense, true) => BOOST_DEFENSE_FORTUNE_BONUS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostParams {
    pub booster_shot_id: i64,
    pub target_shot_id: i64,
    pub boost_type: BoostType,
    #[serde(default)]
    pub use_fortune: bool,
}

pub async fn apply_boost(db: &Database, fight_id: i64, params: &BoostParams) -> Result<Fight> {
    super::track("boost", async {
        let mut uow = UnitOfWork::begin(db, fight_id).await?;
        let booster_shot = uow.fight_shot(params.booster_shot_id).await?;
        let target_shot = uow.fight_shot(params.target_shot_id).await?;

        let booster_ref = booster_shot.actor_ref()?;
        let booster = uow
            .actor(booster_ref)
            .await?
            .ok_or_else(|| CombatError::not_found(booster_ref.entity(), booster_ref.id()))?;
        let target_ref = target_shot.actor_ref()?;
        let target = uow
            .actor(target_ref)
            .await?
            .ok_or_else(|| CombatError::not_found(target_ref.entity(), target_ref.id()))?;

        // Fortune is checked before anything is written.
        let fortune_used = params.use_fortune && booster.is_pc();
        let fortune_changes = if fortune_used {
            let fortune = booster.action_values.fortune();
            if fortune < 1 {
                return Err(CombatError::InsufficientResource(format!(
                    "{} has no Fortune for a boost",
                    booster.name
                )));
            }
            let mut action_values = booster.action_values.clone();
            action_values.set_fortune(fortune - 1);
            Some(ActorChanges {
                action_values: Some(action_values),
                ..Default::default()
            })
        } else {
            None
        };

        ledger::spend(&mut uow, &booster_shot, BOOST_SHOT_COST).await?;
        if let Some(changes) = &fortune_changes {
            uow.update_actor(&booster, changes).await?;
        }

        let bonus = params.boost_type.bonus(fortune_used);
        let action_value = match params.boost_type {
            BoostType::Attack => target.action_values.main_attack().to_string(),
            BoostType::Defense => AV_DEFENSE.to_string(),
        };
        let sequence = uow.fight().sequence;
        uow.add_effect(&NewEffect {
            shot_id: target_shot.id,
            name: BOOST_EFFECT_NAME.to_string(),
            action_value: action_value.clone(),
            change: format!("+{bonus}"),
            expires_after_sequence: sequence,
        })
        .await?;

        uow.append_event(
            EVENT_BOOST,
            &format!(
                "{} boosted {}'s {} by +{bonus}",
                booster.name,
                target.name,
                params.boost_type.as_str()
            ),
            json!({
                "booster_shot_id": booster_shot.id,
                "target_shot_id": target_shot.id,
                "boost_type": params.boost_type,
                "action_value": action_value,
                "bonus": bonus,
                "fortune_used": fortune_used,
            }),
        )
        .await?;

        let fight = uow.commit().await?;
        tracing::info!(
            fight_id,
            booster_shot_id = booster_shot.id,
            target_shot_id = target_shot.id,
            bonus,
            fortune_used,
            "boost applied"
        );
        Ok(fight)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bonus_table() {
        assert_eq!(BoostType::Attack.bonus(false), 1);
        assert_eq!(BoostType::Attack.bonus(true), 2);
        assert_eq!(BoostType::Defense.bonus(false), 3);
        assert_eq!(BoostType::Defense.bonus(true), 5);
    }

    #[test]
    fn test_params_parse() {
        let params: BoostParams = serde_json::from_str(
            r#"{"booster_shot_id":1,"target_shot_id":2,"boost_type":"defense"}"#,
        )
        .unwrap();
        assert_eq!(params.boost_type, BoostType::Defense);
        assert!(!params.use_fortune);
    }
}
