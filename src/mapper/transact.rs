use futures::future::try_join_all;
use tracing::{debug, instrument, warn, Span};

use super::{DynamoMapper, PutOptions};
use crate::entity::Entity;
use crate::errors::{MapperError, Result, StoreError};
use crate::serialization::from_attributes;

impl DynamoMapper {
    /// Write `entities` with transactional puts, each under the same version
    /// check as [`put`](Self::put).
    ///
    /// A single entity is written with a plain put. More than
    /// `transaction_batch_size` entities are split into consecutive
    /// transactions; each chunk is atomic, but a failing chunk does not roll
    /// back the chunks already committed.
    #[instrument(
        skip_all,
        fields(
            entity = tracing::field::Empty,
            table = tracing::field::Empty,
            count = entities.len()
        )
    )]
    pub async fn transact_put<T: Entity>(&self, entities: &[T]) -> Result<Vec<T>> {
        match entities {
            [] => return Ok(Vec::new()),
            [single] => return Ok(vec![self.put(single).await?]),
            _ => {}
        }

        let config = self.entity_config::<T>()?;
        let span = Span::current();
        span.record("entity", config.entity_name());
        span.record("table", config.table_name());
        self.cipher_for(&config)?;

        let prepared = try_join_all(
            entities
                .iter()
                .map(|entity| self.prepare_put(&config, entity, PutOptions::default())),
        )
        .await?;

        let batch_size = self.config.transaction_batch_size.max(1);
        let batches = prepared.len().div_ceil(batch_size);
        if batches > 1 {
            warn!(batches, batch_size, "write split across transactions, atomic per chunk only");
        }

        for (index, chunk) in prepared.chunks(batch_size).enumerate() {
            let puts = chunk.iter().map(|p| p.input.clone()).collect();
            match self.store.transact_put(puts).await {
                Ok(()) => debug!(batch = index, size = chunk.len(), "transaction committed"),
                Err(e) if e.is_condition_cancellation() => {
                    let expected = match &e {
                        StoreError::TransactionCanceled { reasons } => reasons
                            .iter()
                            .position(|r| r == "ConditionalCheckFailed")
                            .and_then(|i| chunk.get(i))
                            .map_or(0, |p| p.expected_version),
                        _ => 0,
                    };
                    warn!(batch = index, expected, "version conflict in transaction");
                    return Err(MapperError::VersionConflict {
                        entity: config.entity_name().to_string(),
                        expected,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        prepared
            .into_iter()
            .map(|p| from_attributes(p.attributes).map_err(MapperError::from))
            .collect()
    }
}
