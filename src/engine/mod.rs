// Combat resolution engine.

pub mod actor;
pub mod boost;
pub mod chase;
pub mod combat;
pub mod config;
pub mod fight;
pub mod ledger;
pub mod up_check;
pub mod wounds;

use std::future::Future;

use crate::error::Result;
use crate::metrics;

/// Time an engine operation and count its outcome.
pub(crate) async fn track<T, F>(action: &'static str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timer = metrics::ACTION_DURATION_SECONDS
        .with_label_values(&[action])
        .start_timer();
    let result = operation.await;
    timer.observe_duration();

    match &result {
        Ok(_) => metrics::ACTIONS_TOTAL.with_label_values(&[action]).inc(),
        Err(e) => {
            metrics::ACTION_FAILURES_TOTAL
                .with_label_values(&[action, e.kind()])
                .inc();
            tracing::debug!(action, kind = e.kind(), error = %e, "engine action rejected");
        }
    }
    result
}
