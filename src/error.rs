//! Error types returned by the consumer and the options resolver.

use std::fmt;

use serde_json::Value;

use crate::options::OptionType;

/// Boxed error used for faults raised by processors and message providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Raised when the options of a run cannot be resolved.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("option \"{key}\" does not exist, defined options are: {}", .known.join(", "))]
    UndefinedOption { key: String, known: Vec<String> },

    #[error("option \"{key}\" with value {actual} is expected to be of type {}", join_types(.expected))]
    InvalidType {
        key: String,
        expected: Vec<OptionType>,
        actual: Value,
    },

    #[error("option \"{key}\" with value {value} is invalid, accepted values are: {}", join_values(.allowed))]
    InvalidValue {
        key: String,
        value: Value,
        allowed: Vec<Value>,
    },
}

fn join_types(types: &[OptionType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The lifecycle point at which a processor fault happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialize,
    Process,
    Sleep,
    Terminate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Initialize => "initialize",
            Stage::Process => "process",
            Stage::Sleep => "sleep",
            Stage::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`Consumer::consume`](crate::Consumer::consume).
///
/// A processor asking to stop is not an error and never shows up here.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("invalid consumer options: {0}")]
    Config(#[from] ConfigError),

    #[error("processor failed during {stage}: {source}")]
    Processor {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("message provider failed: {0}")]
    Provider(#[source] BoxError),
}

impl ConsumerError {
    pub(crate) fn processor(stage: Stage, source: BoxError) -> Self {
        Self::Processor { stage, source }
    }

    /// The stage of a processor fault, if this is one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Processor { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
