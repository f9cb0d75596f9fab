//! Build-time and refresh errors. Surfaced to the operator log, never to the
//! end user.

use thiserror::Error;

use crate::client::ClientError;

use super::model::TenantId;

/// A handler declaration broke a calling-convention or platform rule.
/// `method` is always qualified as `Module::method`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaBuildError {
    #[error("`{method}`: first parameter must be the command context")]
    MissingContext { method: String },

    #[error("`{method}`: parameter {position} has no option metadata")]
    MissingOptionMetadata { method: String, position: usize },

    #[error("`{method}`: option `{option}` has unsupported type `{type_name}`")]
    UnsupportedOptionType { method: String, option: String, type_name: &'static str },

    #[error("`{method}`: button listener must take exactly one button context parameter")]
    InvalidButtonListener { method: String },

    #[error("`{method}`: button prefix must not be empty")]
    EmptyButtonPrefix { method: String },

    #[error("namespace `{namespace}` declared by both {first} and {second}")]
    DuplicateNamespace { namespace: String, first: String, second: String },

    #[error("`{method}`: sub-command `{name}` already exists in namespace `{namespace}`")]
    DuplicateSubCommand { namespace: String, name: String, method: String },

    #[error("`{method}`: option `{option}` declared more than once")]
    DuplicateOption { method: String, option: String },

    #[error("`{owner}`: {what} name {name:?} must be 1-32 characters of [a-z0-9_-]")]
    InvalidName { owner: String, what: &'static str, name: String },

    #[error("`{owner}`: {what} description must be 1-100 characters")]
    InvalidDescription { owner: String, what: &'static str },
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("schema build failed: {0}")]
    Build(#[from] SchemaBuildError),

    #[error("command registration failed: {0}")]
    Register(#[from] ClientError),

    #[error("no partition for tenant {0}")]
    UnknownTenant(TenantId),
}
