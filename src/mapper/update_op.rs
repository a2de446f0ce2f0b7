use tracing::{debug, instrument, Span};

use super::DynamoMapper;
use crate::entity::{Entity, PrimaryKey};
use crate::errors::{ConfigError, MapperError, Result, StoreError};
use crate::expressions::{build_update, UpdateDirectives};
use crate::store::UpdateItemInput;
use crate::transform::{ciphertext_key, cleared_fields, encrypt_fields};

impl DynamoMapper {
    /// Apply `directives` to the item at `key` and return its new image.
    ///
    /// Every update advances `versionNumber` by one. Sensitive fields take
    /// direct values only; setting one to a falsy value removes its stored
    /// ciphertext. A `ValidationException` from the store (wrong key shape,
    /// append or increment on a mistyped attribute) is reported as
    /// [`MapperError::NotFound`].
    #[instrument(skip_all, fields(entity = tracing::field::Empty, table = tracing::field::Empty))]
    pub async fn update<T: Entity>(&self, key: &PrimaryKey, directives: UpdateDirectives) -> Result<T> {
        let config = self.entity_config::<T>()?;
        let span = Span::current();
        span.record("entity", config.entity_name());
        span.record("table", config.table_name());
        directives.validate()?;

        let mut directives = directives;
        if let Some(cipher) = self.cipher_for(&config)? {
            let sensitive = config.sensitive_fields();
            if let Some(field) = sensitive
                .iter()
                .find(|f| directives.list_append.contains_key(*f) || directives.increment.contains_key(*f))
            {
                return Err(ConfigError::SensitiveDirective { field: field.clone() }.into());
            }

            let stale: Vec<String> = cleared_fields(sensitive, &directives.attributes)
                .map(|field| ciphertext_key(field))
                .collect();
            directives.attributes = encrypt_fields(cipher, sensitive, &directives.attributes).await?;
            directives.remove.extend(stale);
        }
        let update = build_update(&directives)?;

        let input = UpdateItemInput {
            table: config.table_name().to_string(),
            key: config.table_key().build_key(key),
            update,
        };
        match self.store.update_item(input).await {
            Ok(item) => self.reconstruct(&config, item).await,
            Err(StoreError::Validation(message)) => {
                debug!(%message, "update rejected, reporting not found");
                Err(MapperError::NotFound {
                    entity: config.entity_name().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
