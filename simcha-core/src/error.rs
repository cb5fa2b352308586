//! Error types for SIMCHA call handling

use crate::{EntityId, EntityKind, NationalId};
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {kind:?} with id {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("Insert failed for {kind:?} with id {id}: already exists")]
    DuplicateInsert { kind: EntityKind, id: EntityId },

    #[error("Update failed for {kind:?} with id {id}: {reason}")]
    UpdateFailed {
        kind: EntityKind,
        id: EntityId,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Caller identification errors. All variants are terminal: a fabricated
/// ID is indistinguishable from a typo, so there is no retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("No student matches national id {national_id}")]
    CallerNotFound { national_id: NationalId },

    #[error("Student {student_id} has no active class for year {year}")]
    NoActiveClass { student_id: EntityId, year: i32 },

    #[error("Student {student_id} is not a class representative for year {year}")]
    NotRepresentative { student_id: EntityId, year: i32 },

    #[error("Student {student_id} is not in class {class_id}")]
    NotInClass {
        student_id: EntityId,
        class_id: EntityId,
    },
}

/// Input collection errors from the menu engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Input for step {step:?} is outside the grammar")]
    OutOfGrammar { step: String },

    #[error("Input {entered:?} for step {step:?} is not in the allow-list")]
    NotAllowed { step: String, entered: String },

    #[error("Step {step:?} exhausted {attempts} collection attempts")]
    MaxAttempts { step: String, attempts: u8 },
}

/// Failures surfaced by the voice gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Caller hung up")]
    Hangup,

    #[error("Caller input timed out")]
    Timeout,

    #[error("Gateway transport failure: {reason}")]
    Transport { reason: String },
}

/// Message catalog errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("No message for key {key:?}")]
    MissingMessage { key: String },

    #[error("Message {key:?} still contains placeholder {placeholder:?} after substitution")]
    UnboundPlaceholder { key: String, placeholder: String },

    #[error("Catalog parse failed: {reason}")]
    Parse { reason: String },
}

/// Flow-level failures that are not input or storage problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    /// A required catalog is empty; operator-actionable.
    #[error("Required catalog {kind:?} is empty")]
    EmptyCatalog { kind: EntityKind },

    #[error("Caller has no event eligible for {flow}")]
    NoEligibleEvent { flow: String },

    #[error("Flow {flow} requires a resolved caller identity")]
    IdentityRequired { flow: String },
}

/// Unified error type for all call-handling operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

impl CallError {
    /// Whether the failure came from the caller dropping the call.
    /// A hung-up call gets no farewell announcement; everything else does.
    pub fn is_hangup(&self) -> bool {
        matches!(self, CallError::Gateway(GatewayError::Hangup))
    }
}

/// Result type alias for call-handling operations.
pub type CallResult<T> = Result<T, CallError>;
