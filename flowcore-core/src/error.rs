use crate::document::DocumentError;
use crate::intent::{Intent, ProcessInstanceIntent};
use crate::types::{ElementType, Key};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ─── ErrorType ────────────────────────────────────────────────

/// Tag carried by every failure and every incident.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    ExtractValueError,
    ConditionError,
    IoMappingError,
    JobNoRetries,
    CalledElementError,
    FormNotFound,
    DecisionEvaluationError,
    UnhandledErrorEvent,
    #[default]
    UnknownError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::ExtractValueError => "EXTRACT_VALUE_ERROR",
            ErrorType::ConditionError => "CONDITION_ERROR",
            ErrorType::IoMappingError => "IO_MAPPING_ERROR",
            ErrorType::JobNoRetries => "JOB_NO_RETRIES",
            ErrorType::CalledElementError => "CALLED_ELEMENT_ERROR",
            ErrorType::FormNotFound => "FORM_NOT_FOUND",
            ErrorType::DecisionEvaluationError => "DECISION_EVALUATION_ERROR",
            ErrorType::UnhandledErrorEvent => "UNHANDLED_ERROR_EVENT",
            ErrorType::UnknownError => "UNKNOWN",
        };
        f.write_str(name)
    }
}

// ─── Failure ──────────────────────────────────────────────────

/// A recoverable modelling or data problem. Always becomes an incident.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{error_type}: {message}")]
pub struct Failure {
    pub message: String,
    pub error_type: ErrorType,
    /// Scope the failure refers to, when it differs from the element instance.
    pub variable_scope_key: Option<Key>,
}

impl Failure {
    pub fn new(message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            message: message.into(),
            error_type,
            variable_scope_key: None,
        }
    }

    pub fn with_scope(message: impl Into<String>, error_type: ErrorType, scope_key: Key) -> Self {
        Self {
            message: message.into(),
            error_type,
            variable_scope_key: Some(scope_key),
        }
    }
}

// ─── EngineError ──────────────────────────────────────────────

/// Defects: the engine was asked for something that can never be valid.
/// Fatal to the command being processed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Expected element instance {key} to transition from {from:?} to {to:?}, but the lifecycle does not allow it")]
    IllegalTransition {
        key: Key,
        from: ProcessInstanceIntent,
        to: ProcessInstanceIntent,
    },

    #[error("Expected element instance {key} to be re-entered only while resolving an incident, but it is already in state {state:?}")]
    UnexpectedReentry {
        key: Key,
        state: ProcessInstanceIntent,
    },

    #[error("Expected to terminate element instance {0}, but it is already terminating")]
    AlreadyTerminating(Key),

    #[error("Expected element instance {0} to exist, but it was not found")]
    ElementInstanceNotFound(Key),

    #[error("Expected process definition {0} to be part of the element graph")]
    ProcessNotFound(Key),

    #[error("Expected element '{element_id}' of type {element_type} in process definition {definition_key}, but it is not part of the element graph")]
    ElementNotFound {
        definition_key: Key,
        element_id: String,
        element_type: ElementType,
    },

    #[error("Expected flow scope instance {0} to exist, but it was not found")]
    MissingFlowScope(Key),

    #[error("Expected element '{0}' to be a container of other elements")]
    NotAContainer(String),

    #[error("Expected a processor for element type {0}")]
    NoProcessor(ElementType),

    #[error("Counter '{counter}' of element instance {key} would become negative")]
    CounterUnderflow { key: Key, counter: &'static str },

    #[error("Expected element instance {key} to have no pending execution paths when it ends, but {active_children} children and {active_sequence_flows} sequence flows are active")]
    PendingExecutionPaths {
        key: Key,
        active_children: u32,
        active_sequence_flows: u32,
    },

    #[error("Record value does not match intent {0:?}")]
    MismatchedRecord(Intent),

    #[error("Corrupt document in state: {0}")]
    Document(#[from] DocumentError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

// ─── ProcessingError ──────────────────────────────────────────

/// Outcome of a fallible step inside element processing.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Failure(#[from] Failure),
    #[error(transparent)]
    Defect(#[from] EngineError),
}

impl From<DocumentError> for ProcessingError {
    fn from(err: DocumentError) -> Self {
        ProcessingError::Defect(EngineError::Document(err))
    }
}

pub type ProcessingResult<T> = std::result::Result<T, ProcessingError>;
