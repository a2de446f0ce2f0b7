use serde_json::Value;
use tracing::{debug, instrument, warn, Span};

use super::DynamoMapper;
use crate::entity::{Entity, EntityConfig};
use crate::errors::{ConfigError, MapperError, Result, StoreError};
use crate::expressions::{name_alias, render_condition, Expression, Operator, VERSION_ATTRIBUTE};
use crate::serialization::{from_attributes, to_attributes, to_item, Attributes};
use crate::store::PutItemInput;

/// Options for [`DynamoMapper::put_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Write unconditionally. The version is still advanced.
    pub skip_version_check: bool,
}

/// A put ready to be issued, alone or inside a transaction.
pub(super) struct PreparedPut {
    pub input: PutItemInput,
    /// Plaintext attributes as written, for building the returned entity.
    pub attributes: Attributes,
    /// Version the stored item must carry for the write to succeed.
    pub expected_version: i64,
}

impl DynamoMapper {
    /// Write `entity`, failing with [`MapperError::VersionConflict`] when the
    /// stored item has moved on since it was read.
    ///
    /// Returns the entity as written: key attributes filled in and
    /// `versionNumber` advanced by one.
    pub async fn put<T: Entity>(&self, entity: &T) -> Result<T> {
        self.put_with(entity, PutOptions::default()).await
    }

    #[instrument(skip_all, fields(entity = tracing::field::Empty, table = tracing::field::Empty))]
    pub async fn put_with<T: Entity>(&self, entity: &T, options: PutOptions) -> Result<T> {
        let config = self.entity_config::<T>()?;
        let span = Span::current();
        span.record("entity", config.entity_name());
        span.record("table", config.table_name());
        self.cipher_for(&config)?;

        let prepared = self.prepare_put(&config, entity, options).await?;
        match self.store.put_item(prepared.input).await {
            Ok(()) => {
                debug!(version = prepared.expected_version + 1, "put succeeded");
                Ok(from_attributes(prepared.attributes)?)
            }
            Err(StoreError::ConditionalCheckFailed) => {
                warn!(expected = prepared.expected_version, "version conflict on put");
                Err(MapperError::VersionConflict {
                    entity: config.entity_name().to_string(),
                    expected: prepared.expected_version,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize, key, version and encrypt `entity`.
    pub(super) async fn prepare_put<T: Entity>(
        &self,
        config: &EntityConfig,
        entity: &T,
        options: PutOptions,
    ) -> Result<PreparedPut> {
        let mut attributes = to_attributes(entity)?;

        let key = config.generate_key(&attributes)?;
        attributes.extend(config.table_key().key_attributes(&key));

        let current = attributes
            .get(VERSION_ATTRIBUTE)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        attributes.insert(VERSION_ATTRIBUTE.to_string(), Value::from(current + 1));

        let condition = if options.skip_version_check {
            None
        } else {
            Some(version_condition(current)?)
        };

        let stored = self.encrypt(config, &attributes).await?;
        Ok(PreparedPut {
            input: PutItemInput {
                table: config.table_name().to_string(),
                item: to_item(&stored),
                condition,
            },
            attributes,
            expected_version: current,
        })
    }
}

/// `#versionNumber = :versionNumber or attribute_not_exists(#versionNumber)`
fn version_condition(current: i64) -> Result<Expression, ConfigError> {
    let mut expr = Expression::new();
    let matches = render_condition(
        &mut expr,
        VERSION_ATTRIBUTE,
        Operator::Eq,
        &[Value::from(current)],
    )?;
    expr.push_clause(&matches, "or");
    expr.push_clause(
        &format!("attribute_not_exists({})", name_alias(VERSION_ATTRIBUTE)),
        "or",
    );
    Ok(expr)
}
