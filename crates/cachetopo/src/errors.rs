use thiserror::Error;

use crate::types::CacheLevel;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to run `{program}`: {reason}")]
    Execution { program: String, reason: String },

    #[error("could not parse {what} from `{program}` output")]
    Parse { program: String, what: String },

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("physical core count is zero, cannot normalize {level} cache size")]
    DivisionHazard { level: CacheLevel },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TopologyError {
    pub fn execution(program: &str, reason: impl Into<String>) -> Self {
        TopologyError::Execution {
            program: program.to_string(),
            reason: reason.into(),
        }
    }

    pub fn parse(program: &str, what: impl Into<String>) -> Self {
        TopologyError::Parse {
            program: program.to_string(),
            what: what.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;
