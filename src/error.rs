// ⛔ Fail-fast errors for task materialization
// Everything else (per-item persistence, remote sources) is recovered and reported

use thiserror::Error;

/// Errors that abort a materialization before any task is written
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgendaError {
    #[error("invalid year {year}: must be between {min} and {max}")]
    InvalidYear { year: i32, min: i32, max: i32 },

    #[error("invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("no responsible party: email not found and no administrator registered")]
    NoResponsibleParty,

    #[error("no obligations defined for month {0}")]
    EmptyMonth(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AgendaError::InvalidYear { year: 1999, min: 2000, max: 2027 };
        assert_eq!(err.to_string(), "invalid year 1999: must be between 2000 and 2027");

        assert_eq!(
            AgendaError::InvalidMonth(13).to_string(),
            "invalid month 13: must be between 1 and 12"
        );
    }
}
