// Shot ledger: spending and setting shot counts, and the derived turn order.
//
// The ledger never floors a count. A negative shot count means the actor is
// deep in deficit and simply sorts after everyone else.

use crate::db::{Shot, ShotChanges, UnitOfWork};
use crate::error::{CombatError, Result};

/// Deduct `cost` from the shot's count.
pub async fn spend(uow: &mut UnitOfWork, shot: &Shot, cost: i32) -> Result<Shot> {
    if cost < 0 {
        return Err(CombatError::validation(format!(
            "shot cost must not be negative (got {cost})"
        )));
    }
    set(uow, shot, shot.shot_count.saturating_sub(cost)).await
}

/// Give `amount` back to the shot's count.
pub async fn refund(uow: &mut UnitOfWork, shot: &Shot, amount: i32) -> Result<Shot> {
    if amount < 0 {
        return Err(CombatError::validation(format!(
            "refund must not be negative (got {amount})"
        )));
    }
    set(uow, shot, shot.shot_count.saturating_add(amount)).await
}

/// Replace the shot's count. Always writes, so `updated_at` moves.
pub async fn set(uow: &mut UnitOfWork, shot: &Shot, shot_count: i32) -> Result<Shot> {
    let changes = ShotChanges {
        shot_count: Some(shot_count),
        ..Default::default()
    };
    let updated = uow.update_shot(shot, &changes).await?;
    tracing::debug!(
        shot_id = shot.id,
        from = shot.shot_count,
        to = updated.shot_count,
        "shot count set"
    );
    Ok(updated)
}

/// Sort shots into turn order: highest count first, ties by shot id.
pub fn turn_order(mut shots: Vec<Shot>) -> Vec<Shot> {
    shots.sort_by(|a, b| {
        b.shot_count
            .cmp(&a.shot_count)
            .then_with(|| a.id.cmp(&b.id))
    });
    shots
}

/// The shot count that acts next, if anyone is in the fight.
pub fn current_shot(shots: &[Shot]) -> Option<i32> {
    shots.iter().map(|s| s.shot_count).max()
}
