//! Entity mapper.
//!
//! [`DynamoMapper`] composes the expression builders, the field transform
//! engine and a [`TableStore`] into typed operations:
//! - `get` - Read a single entity by key
//! - `put` - Write an entity under optimistic locking
//! - `transact_put` - Write many entities in transactional chunks
//! - `update` - Apply update directives and return the new image
//! - `delete` - Delete an entity and return the prior image
//! - `query` - Query a table or secondary index page by page
//!
//! The mapper holds no per-call state. Clone it freely and share it across
//! tasks; optimistic locking on `versionNumber` is the only protection
//! against racing writers.

mod delete;
mod get;
mod put;
mod query;
mod transact;
mod update_op;

use std::fmt;
use std::sync::Arc;

use crate::config::{ClientConfig, MapperConfig};
use crate::encryption::FieldCipher;
use crate::entity::{Entity, EntityConfig, EntityRegistry};
use crate::errors::{ConfigError, Result};
use crate::serialization::{from_attributes, from_item, Attributes, Item};
use crate::store::{DynamoStore, TableStore};
use crate::transform::{decrypt_fields, encrypt_fields};

pub use put::PutOptions;
pub use query::{ContinuationToken, QueryPage, QueryParams};

/// Typed access to registered entities.
#[derive(Clone)]
pub struct DynamoMapper {
    store: Arc<dyn TableStore>,
    registry: Arc<EntityRegistry>,
    cipher: Option<Arc<dyn FieldCipher>>,
    config: MapperConfig,
}

impl fmt::Debug for DynamoMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoMapper")
            .field("registry", &self.registry)
            .field("cipher", &self.cipher.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DynamoMapper {
    pub fn new(store: Arc<dyn TableStore>, registry: EntityRegistry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            cipher: None,
            config: MapperConfig::default(),
        }
    }

    /// Mapper over the process-wide DynamoDB client, configured from the
    /// environment.
    pub async fn connect(client_config: &ClientConfig, registry: EntityRegistry) -> Self {
        let store = DynamoStore::shared(client_config).await;
        Self::new(Arc::new(store), registry).with_config(MapperConfig::from_env())
    }

    /// Cipher for entities that declare sensitive fields.
    pub fn with_cipher(mut self, cipher: Arc<dyn FieldCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    fn entity_config<T: Entity>(&self) -> Result<Arc<EntityConfig>> {
        Ok(self.registry.get::<T>()?)
    }

    /// The cipher `config` needs, if any. Entities with sensitive fields
    /// cannot be used without one.
    fn cipher_for(&self, config: &EntityConfig) -> Result<Option<&dyn FieldCipher>, ConfigError> {
        if config.sensitive_fields().is_empty() {
            return Ok(None);
        }
        match self.cipher.as_deref() {
            Some(cipher) => Ok(Some(cipher)),
            None => Err(ConfigError::MissingCipher {
                entity: config.entity_name().to_string(),
            }),
        }
    }

    /// Copy of `attrs` with sensitive fields encrypted.
    async fn encrypt(&self, config: &EntityConfig, attrs: &Attributes) -> Result<Attributes> {
        match self.cipher_for(config)? {
            Some(cipher) => Ok(encrypt_fields(cipher, config.sensitive_fields(), attrs).await?),
            None => Ok(attrs.clone()),
        }
    }

    async fn decrypt(&self, config: &EntityConfig, attrs: Attributes) -> Result<Attributes> {
        match self.cipher_for(config)? {
            Some(cipher) => Ok(decrypt_fields(cipher, config.sensitive_fields(), attrs).await?),
            None => Ok(attrs),
        }
    }

    /// Rebuild an entity from a store item.
    async fn reconstruct<T: Entity>(&self, config: &EntityConfig, item: Item) -> Result<T> {
        let attrs = self.decrypt(config, from_item(item)?).await?;
        Ok(from_attributes(attrs)?)
    }
}
