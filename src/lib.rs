//! # dynomap
//!
//! A typed entity mapper for DynamoDB.
//!
//! This crate handles:
//! - Serialization between serde types and DynamoDB items
//! - Key condition, filter, projection and update expression building
//! - Optimistic locking on a mapper-owned `versionNumber` attribute
//! - Envelope encryption of sensitive fields through AWS KMS
//! - AWS SDK calls via aws-sdk-dynamodb on the tokio runtime
//!
//! Register each entity type with an [`EntityConfig`], then go through a
//! [`DynamoMapper`] for reads and writes.

pub mod client;
pub mod config;
pub mod encryption;
pub mod entity;
pub mod errors;
pub mod expressions;
pub mod logging;
pub mod mapper;
pub mod serialization;
pub mod store;
pub mod transform;

pub use config::{ClientConfig, MapperConfig};
pub use encryption::{FieldCipher, KmsEncryptor};
pub use entity::{AuditFields, Entity, EntityConfig, EntityRegistry, KeyConfig, KeyValue, PrimaryKey};
pub use errors::{
    CipherError, ConfigError, MapperError, Result, SerializationError, StoreError, TransformError,
};
pub use expressions::{Filter, Operator, SortKeyCondition, UpdateDirectives, VERSION_ATTRIBUTE};
pub use logging::init_logging;
pub use mapper::{ContinuationToken, DynamoMapper, PutOptions, QueryPage, QueryParams};
pub use serialization::Attributes;
pub use store::{DynamoStore, TableStore};
