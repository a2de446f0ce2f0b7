use tracing::{debug, instrument, Span};

use super::DynamoMapper;
use crate::entity::{Entity, PrimaryKey};
use crate::errors::Result;
use crate::store::GetItemInput;

impl DynamoMapper {
    /// Read one entity by key. Returns `None` when no item exists.
    ///
    /// `consistent_read` chooses a strongly consistent or eventual read;
    /// `None` falls back to the mapper's `consistent_reads` setting.
    #[instrument(skip_all, fields(entity = tracing::field::Empty, table = tracing::field::Empty))]
    pub async fn get<T: Entity>(&self, key: &PrimaryKey, consistent_read: Option<bool>) -> Result<Option<T>> {
        let config = self.entity_config::<T>()?;
        let span = Span::current();
        span.record("entity", config.entity_name());
        span.record("table", config.table_name());
        self.cipher_for(&config)?;

        let input = GetItemInput {
            table: config.table_name().to_string(),
            key: config.table_key().build_key(key),
            consistent_read: consistent_read.unwrap_or(self.config.consistent_reads),
        };

        match self.store.get_item(input).await? {
            Some(item) => Ok(Some(self.reconstruct(&config, item).await?)),
            None => {
                debug!("item not found");
                Ok(None)
            }
        }
    }
}
