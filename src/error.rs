use thiserror::Error;

use crate::position_index::{Position, QubitId};

/// Everything that can go wrong while building a circuit. Construction is
/// deterministic, so none of these are worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError {
    /// Bad parameters: unknown basis or gate, shrinking growth target, zero
    /// rounds where at least one is required.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The instruction stream does not have the shape a step relies on, e.g. a
    /// detector reaching before the start of the record.
    #[error("inconsistent instruction stream: {0}")]
    Consistency(String),

    /// Two checks were generated at the same position.
    #[error("checks {existing} and {incoming} both resolve to position {position}")]
    IdentityCollision {
        position: Position,
        existing: QubitId,
        incoming: QubitId,
    },
}

pub type Result<T> = std::result::Result<T, CircuitError>;

impl CircuitError {
    pub fn config(msg: impl Into<String>) -> Self {
        CircuitError::Configuration(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        CircuitError::Consistency(msg.into())
    }
}
