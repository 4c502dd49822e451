use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    /// Malformed or contradictory group configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("insufficient members: have {have}, need {need}")]
    InsufficientMembers { have: usize, need: usize },

    /// Two periods of one pass resolved to the same member. Indicates a bug.
    #[error("allocation conflict: member {member_id} assigned to periods {first} and {second}")]
    AllocationConflict {
        member_id: uuid::Uuid,
        first: usize,
        second: usize,
    },
}

impl ScheduleError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ScheduleError::InvalidConfiguration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
