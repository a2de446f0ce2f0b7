//! Error types for dynomap.
//!
//! Store failures go through a single mapping function, [`map_sdk_error`],
//! which classifies an AWS SDK error by its service error code. Only the codes
//! the mapper reacts to are pulled out; everything else is carried unchanged
//! so callers keep the original diagnostic detail.

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

use crate::expressions::Operator;

/// Result alias used across the mapper.
pub type Result<T, E = MapperError> = std::result::Result<T, E>;

/// Boxed error carried for failures the mapper does not classify.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error returned by every mapper operation.
#[derive(Debug, Error)]
pub enum MapperError {
    /// The optimistic-concurrency condition failed. Another writer advanced
    /// the version first; re-read and retry with fresh data.
    #[error("version conflict on {entity}: stored version no longer matches {expected}")]
    VersionConflict { entity: String, expected: i64 },

    /// Best-effort signal that the addressed item does not exist.
    #[error("item not found in {entity}")]
    NotFound { entity: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MapperError {
    /// True when the failure is an optimistic-concurrency conflict.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, MapperError::VersionConflict { .. })
    }
}

/// Local validation failures. These are always raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entity type '{0}' is not registered")]
    UnregisteredEntity(String),

    #[error("index '{index}' is not declared on entity '{entity}'")]
    UnknownIndex { entity: String, index: String },

    #[error("sort key condition given but key '{partition_key}' declares no sort key")]
    NoSortKey { partition_key: String },

    #[error("operator '{operator}' expects {expected} value(s), got {actual}")]
    InvalidArity {
        operator: Operator,
        expected: usize,
        actual: usize,
    },

    #[error("operator '{0}' cannot be used in a key condition")]
    UnsupportedKeyOperator(Operator),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("entity '{entity}' declares sensitive fields but no field cipher is configured")]
    MissingCipher { entity: String },

    #[error("key generator for '{entity}' could not derive a primary key")]
    KeyDerivation { entity: String },

    #[error("alias '{alias}' is bound to two different values")]
    AliasCollision { alias: String },

    #[error("attribute '{0}' is managed by the mapper and cannot be set directly")]
    ReservedAttribute(String),

    #[error("invalid entity configuration: {0}")]
    InvalidEntity(String),

    #[error("attribute '{0}' is both written and removed in one update")]
    ConflictingDirectives(String),

    #[error("sensitive field '{field}' can only be replaced, not appended to or incremented")]
    SensitiveDirective { field: String },
}

/// Failures converting between entities, JSON and DynamoDB attribute values.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entity did not serialize to an attribute map")]
    NotAnObject,

    #[error("invalid number: '{0}'")]
    InvalidNumber(String),

    #[error("unsupported DynamoDB attribute value")]
    UnsupportedAttribute,

    #[error("invalid continuation token: {0}")]
    InvalidToken(String),
}

/// A reversible field transformation failed.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to encrypt field '{field}'")]
    Encrypt {
        field: String,
        #[source]
        source: CipherError,
    },

    #[error("failed to decrypt field '{field}'")]
    Decrypt {
        field: String,
        #[source]
        source: CipherError,
    },

    #[error("failed to encode field '{field}'")]
    Encode {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode field '{field}'")]
    Decode {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by a [`FieldCipher`](crate::encryption::FieldCipher).
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("KMS error: {0}")]
    Kms(String),

    #[error("no ciphertext returned from KMS")]
    MissingCiphertext,

    #[error("no plaintext returned from KMS")]
    MissingPlaintext,

    #[error("invalid ciphertext: {0}")]
    InvalidFormat(String),
}

/// Classified failure from the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("the condition expression evaluated to false")]
    ConditionalCheckFailed,

    #[error("transaction was canceled: {}", .reasons.join("; "))]
    TransactionCanceled { reasons: Vec<String> },

    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other failure, untouched.
    #[error(transparent)]
    Sdk(BoxError),
}

impl StoreError {
    /// True when a transaction was canceled because an item's condition failed.
    pub fn is_condition_cancellation(&self) -> bool {
        match self {
            StoreError::TransactionCanceled { reasons } => {
                reasons.iter().any(|r| r == "ConditionalCheckFailed")
            }
            _ => false,
        }
    }
}

/// Map any DynamoDB SDK error to a [`StoreError`].
///
/// This is the single entry point for store error handling.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err.code() {
        Some("ConditionalCheckFailedException") => StoreError::ConditionalCheckFailed,
        Some("ValidationException") => {
            let msg = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            StoreError::Validation(msg)
        }
        _ => StoreError::Sdk(Box::new(err)),
    }
}

/// Map a KMS SDK error to a [`CipherError`].
pub fn map_kms_error<E, R>(err: aws_sdk_kms::error::SdkError<E, R>) -> CipherError
where
    E: aws_sdk_kms::error::ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match (err.code(), err.message()) {
        (Some(code), Some(msg)) => CipherError::Kms(format!("{}: {}", code, msg)),
        (Some(code), None) => CipherError::Kms(code.to_string()),
        _ => CipherError::Kms(err.to_string()),
    }
}
