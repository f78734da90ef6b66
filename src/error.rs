//! Error taxonomy for composition
//!
//! Declaration errors are caller mistakes reported before or while reading a
//! declaration. Invariant violations are composer bugs and abort the build.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("unknown HTTP method '{0}'")]
    UnknownMethod(String),

    #[error("method {verb} declared twice on path '{path}'")]
    DuplicateMethod { path: String, verb: String },

    #[error("path '{path}' declares OPTIONS while CORS synthesizes its own OPTIONS method")]
    CorsMethodConflict { path: String },

    #[error("path segment '{path}' has more than one resource modification")]
    DuplicateResourceModification { path: String },

    #[error("path '{path}' has more than one CORS modification")]
    DuplicateCorsModification { path: String },

    #[error("path '{path}' has no segment '{segment}' to modify")]
    UnknownSlot { path: String, segment: String },

    #[error("function '{0}' has no execution role: the shared role is suppressed and its private role was removed")]
    MissingRole(String),

    #[error("function '{function}' declares both {first} and {second} as its role")]
    ConflictingRole {
        function: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("function '{function}' declares both {first} and {second} as its code")]
    ConflictingCode {
        function: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("function '{0}' has no code location")]
    MissingCode(String),

    #[error("function id '{0}' is declared more than once")]
    DuplicateFunction(String),

    #[error("function id must contain at least one letter, got '{0}'")]
    InvalidFunctionId(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("logical identifier '{0}' allocated twice")]
    DuplicateLogicalName(String),

    #[error("resource kind '{0}' is not registered")]
    UnknownKind(String),

    #[error("resource '{logical}' of kind {kind} has no attribute '{attribute}'")]
    UnknownAttribute {
        logical: String,
        kind: String,
        attribute: String,
    },

    #[error("deployment '{deployment}' does not depend on method '{method}'")]
    MissingDependency { deployment: String, method: String },

    #[error("output '{0}' declared twice")]
    DuplicateOutput(String),
}

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("resource '{logical}' of kind {kind} is missing required property '{property}'")]
    MissingProperty {
        logical: String,
        kind: String,
        property: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ComposeError {
    fn from(e: serde_json::Error) -> Self {
        ComposeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for ComposeError {
    fn from(e: serde_yaml::Error) -> Self {
        ComposeError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ComposeError>;
