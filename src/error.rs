// Error taxonomy shared by every combat action.

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Why a combat action was rejected. Every variant aborts the whole batch;
/// a missing secondary actor inside a batch is logged and skipped instead of
/// being raised.
#[derive(Debug, Error)]
pub enum CombatError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{entity} {id} does not belong to fight {fight_id}")]
    TenancyViolation {
        entity: &'static str,
        id: i64,
        fight_id: i64,
    },

    #[error("insufficient resource: {0}")]
    InsufficientResource(String),

    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CombatError>;

impl CombatError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CombatError::NotFound { entity, id }
    }

    pub fn tenancy(entity: &'static str, id: i64, fight_id: i64) -> Self {
        CombatError::TenancyViolation {
            entity,
            id,
            fight_id,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CombatError::ValidationFailure(msg.into())
    }

    /// Stable tag for API bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            CombatError::NotFound { .. } => "not_found",
            CombatError::TenancyViolation { .. } => "tenancy_violation",
            CombatError::InsufficientResource(_) => "insufficient_resource",
            CombatError::ValidationFailure(_) => "validation_failure",
            CombatError::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

impl From<sqlx::Error> for CombatError {
    fn from(e: sqlx::Error) -> Self {
        // Constraint violations are the storage rejecting an invariant, not an outage.
        if let sqlx::Error::Database(db) = &e {
            match db.kind() {
                ErrorKind::CheckViolation
                | ErrorKind::UniqueViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::ForeignKeyViolation => {
                    return CombatError::ValidationFailure(db.message().to_string());
                }
                _ => {}
            }
        }
        CombatError::PersistenceFailure(e)
    }
}

impl From<serde_json::Error> for CombatError {
    fn from(e: serde_json::Error) -> Self {
        CombatError::ValidationFailure(format!("malformed JSON: {e}"))
    }
}
