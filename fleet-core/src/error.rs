use thiserror::Error;

/// Reasons a seed fleet or a simulator config is refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    #[error("fleet is already initialized")]
    AlreadyInitialized,

    #[error("seed fleet is empty")]
    EmptyFleet,

    #[error("robot at position {0} has an empty id")]
    EmptyId(usize),

    #[error("duplicate robot id '{0}'")]
    DuplicateId(String),

    #[error("robot '{id}' has a non-finite value on joint {axis}")]
    NonFiniteJoint { id: String, axis: &'static str },

    #[error("robot '{0}' has a non-finite heartbeat")]
    NonFiniteHeartbeat(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("malformed input: {0}")]
    Malformed(String),
}

pub type FleetResult<T> = Result<T, FleetError>;
