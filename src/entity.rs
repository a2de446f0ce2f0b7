//! Entity registration.
//!
//! Each entity type is bound once, at startup, to an [`EntityConfig`]
//! describing its table, key schema, secondary indexes, key generator and
//! sensitive fields. The [`EntityRegistry`] maps Rust types to their
//! configuration and is handed to the mapper.
//!
//! # Examples
//!
//! ```
//! use dynomap::{AuditFields, EntityConfig, EntityRegistry, KeyConfig, PrimaryKey};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Customer {
//!     customer_id: String,
//!     email: String,
//!     #[serde(flatten)]
//!     audit: AuditFields,
//! }
//!
//! let config = EntityConfig::builder("customers", KeyConfig::new("pk").with_sort_key("sk"))
//!     .index("byEmail", KeyConfig::new("email"))
//!     .key_generator(|attrs| {
//!         let id = attrs.get("customerId")?.as_str()?;
//!         Some(PrimaryKey::new(format!("CUSTOMER#{}", id)).with_sort_key("PROFILE"))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut registry = EntityRegistry::new();
//! registry.register::<Customer>(config);
//! ```

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::ConfigError;
use crate::serialization::{to_attribute_value, Attributes, Item};

/// Types the mapper can read and write.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Entity for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Key schema of a table or secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    partition_key: String,
    sort_key: Option<String>,
}

impl KeyConfig {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    /// Key attributes in JSON form. The sort key value is dropped when this
    /// schema has no sort key.
    pub fn key_attributes(&self, key: &PrimaryKey) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert(self.partition_key.clone(), key.partition_key.to_json());
        if let (Some(name), Some(value)) = (&self.sort_key, &key.sort_key) {
            attrs.insert(name.clone(), value.to_json());
        }
        attrs
    }

    /// Store key for `key`.
    pub fn build_key(&self, key: &PrimaryKey) -> Item {
        self.key_attributes(key)
            .iter()
            .map(|(k, v)| (k.clone(), to_attribute_value(v)))
            .collect()
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition_key.as_str()).chain(self.sort_key.as_deref())
    }
}

/// A key attribute value: DynamoDB keys are strings or numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    String(String),
    Number(Number),
}

impl KeyValue {
    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::String(s) => Value::String(s.clone()),
            KeyValue::Number(n) => Value::Number(n.clone()),
        }
    }

    /// Read a key value from an attribute, if it is a string or number.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(KeyValue::String(s.clone())),
            Value::Number(n) => Some(KeyValue::Number(n.clone())),
            _ => None,
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::String(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::String(value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Number(value.into())
    }
}

impl From<u64> for KeyValue {
    fn from(value: u64) -> Self {
        KeyValue::Number(value.into())
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        KeyValue::Number(value.into())
    }
}

impl From<KeyValue> for Value {
    fn from(value: KeyValue) -> Self {
        value.to_json()
    }
}

/// Primary key of a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub partition_key: KeyValue,
    pub sort_key: Option<KeyValue>,
}

impl PrimaryKey {
    pub fn new(partition_key: impl Into<KeyValue>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<KeyValue>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }
}

/// Derives an item's primary key from its attributes.
pub type KeyGenerator = Arc<dyn Fn(&Attributes) -> Option<PrimaryKey> + Send + Sync>;

/// Immutable per-type configuration.
pub struct EntityConfig {
    entity_name: String,
    table_name: String,
    table_key: KeyConfig,
    indexes: HashMap<String, KeyConfig>,
    key_generator: KeyGenerator,
    sensitive_fields: Vec<String>,
}

impl fmt::Debug for EntityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityConfig")
            .field("entity_name", &self.entity_name)
            .field("table_name", &self.table_name)
            .field("table_key", &self.table_key)
            .field("indexes", &self.indexes)
            .field("sensitive_fields", &self.sensitive_fields)
            .finish_non_exhaustive()
    }
}

impl EntityConfig {
    pub fn builder(table_name: impl Into<String>, table_key: KeyConfig) -> EntityConfigBuilder {
        EntityConfigBuilder {
            table_name: table_name.into(),
            table_key,
            indexes: HashMap::new(),
            key_generator: None,
            sensitive_fields: Vec::new(),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn table_key(&self) -> &KeyConfig {
        &self.table_key
    }

    pub fn sensitive_fields(&self) -> &[String] {
        &self.sensitive_fields
    }

    /// Key schema of a declared secondary index.
    pub fn index_key(&self, index: &str) -> Result<&KeyConfig, ConfigError> {
        self.indexes
            .get(index)
            .ok_or_else(|| ConfigError::UnknownIndex {
                entity: self.entity_name.clone(),
                index: index.to_string(),
            })
    }

    /// Run the key generator over an entity's attributes.
    pub fn generate_key(&self, attrs: &Attributes) -> Result<PrimaryKey, ConfigError> {
        (self.key_generator)(attrs).ok_or_else(|| ConfigError::KeyDerivation {
            entity: self.entity_name.clone(),
        })
    }
}

/// Builder for [`EntityConfig`].
pub struct EntityConfigBuilder {
    table_name: String,
    table_key: KeyConfig,
    indexes: HashMap<String, KeyConfig>,
    key_generator: Option<KeyGenerator>,
    sensitive_fields: Vec<String>,
}

impl EntityConfigBuilder {
    /// Declare a secondary index.
    pub fn index(mut self, name: impl Into<String>, key: KeyConfig) -> Self {
        self.indexes.insert(name.into(), key);
        self
    }

    /// Set the key generator. Without one, the key is read from the
    /// attributes named by the table key schema.
    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Attributes) -> Option<PrimaryKey> + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    /// Fields encrypted at rest.
    pub fn sensitive_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<EntityConfig, ConfigError> {
        if self.table_name.is_empty() {
            return Err(ConfigError::InvalidEntity("table name is empty".to_string()));
        }

        let all_keys = std::iter::once(&self.table_key).chain(self.indexes.values());
        let mut key_names = Vec::new();
        for key in all_keys {
            for name in key.names() {
                if name.is_empty() {
                    return Err(ConfigError::InvalidEntity(format!(
                        "empty key attribute name on table '{}'",
                        self.table_name
                    )));
                }
                key_names.push(name.to_string());
            }
        }

        if let Some(field) = self
            .sensitive_fields
            .iter()
            .find(|f| key_names.contains(f))
        {
            return Err(ConfigError::InvalidEntity(format!(
                "key attribute '{}' cannot be a sensitive field",
                field
            )));
        }

        let key_generator = match self.key_generator {
            Some(generator) => generator,
            None => default_key_generator(self.table_key.clone()),
        };

        Ok(EntityConfig {
            entity_name: String::new(),
            table_name: self.table_name,
            table_key: self.table_key,
            indexes: self.indexes,
            key_generator,
            sensitive_fields: self.sensitive_fields,
        })
    }
}

fn default_key_generator(key: KeyConfig) -> KeyGenerator {
    Arc::new(move |attrs: &Attributes| {
        let partition = KeyValue::from_json(attrs.get(key.partition_key())?)?;
        let mut primary = PrimaryKey::new(partition);
        if let Some(sort_name) = key.sort_key() {
            primary.sort_key = Some(KeyValue::from_json(attrs.get(sort_name)?)?);
        }
        Some(primary)
    })
}

/// Type-keyed registry of entity configurations.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: HashMap<TypeId, Arc<EntityConfig>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `T` to `config`. Registering a type twice replaces the binding.
    pub fn register<T: 'static>(&mut self, mut config: EntityConfig) -> &mut Self {
        config.entity_name = short_type_name::<T>().to_string();
        self.entries.insert(TypeId::of::<T>(), Arc::new(config));
        self
    }

    pub fn get<T: 'static>(&self) -> Result<Arc<EntityConfig>, ConfigError> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| ConfigError::UnregisteredEntity(short_type_name::<T>().to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Audit and version attributes carried by every entity.
///
/// Flatten it into an entity struct. The four audit fields are free-form and
/// caller-owned; `version_number` is owned by the mapper and must not be set
/// by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_number: Option<i64>,
}

impl AuditFields {
    /// Fresh audit fields stamped with the current UTC time.
    pub fn created_by(actor: impl Into<String>) -> Self {
        let actor = actor.into();
        let now = now_rfc3339();
        Self {
            created_on: Some(now.clone()),
            created_by: Some(actor.clone()),
            updated_on: Some(now),
            updated_by: Some(actor),
            version_number: None,
        }
    }

    /// Refresh `updatedOn`/`updatedBy`.
    pub fn touch(&mut self, actor: impl Into<String>) {
        self.updated_on = Some(now_rfc3339());
        self.updated_by = Some(actor.into());
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
