//! DynamoDB implementation of [`TableStore`].

use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Put, ReturnValue, TransactWriteItem};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use super::{
    DeleteItemInput, GetItemInput, PutItemInput, QueryInput, QueryOutput, TableStore,
    UpdateItemInput,
};
use crate::client::shared_client;
use crate::config::ClientConfig;
use crate::errors::{map_sdk_error, StoreError};
use crate::serialization::Item;

/// [`TableStore`] backed by `aws-sdk-dynamodb`.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
}

impl fmt::Debug for DynamoStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoStore").finish_non_exhaustive()
    }
}

impl DynamoStore {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Use the process-wide client, creating it from `config` on first use.
    pub async fn shared(config: &ClientConfig) -> Self {
        Self::new(shared_client(config).await.clone())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// DynamoDB rejects empty alias maps, so they are sent only when populated.
fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Pull the per-item cancellation reason codes out of a canceled transaction.
fn map_transact_error<R>(err: SdkError<TransactWriteItemsError, R>) -> StoreError
where
    R: fmt::Debug + Send + Sync + 'static,
{
    if let SdkError::ServiceError(service_err) = &err {
        if let TransactWriteItemsError::TransactionCanceledException(canceled) = service_err.err() {
            let reasons = canceled
                .cancellation_reasons
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|r| r.code().unwrap_or("None").to_string())
                .collect();
            return StoreError::TransactionCanceled { reasons };
        }
    }
    map_sdk_error(err)
}

fn build_transact_put(input: PutItemInput) -> Result<TransactWriteItem, StoreError> {
    let mut put = Put::builder()
        .table_name(input.table)
        .set_item(Some(input.item));

    if let Some(condition) = input.condition {
        put = put
            .condition_expression(condition.text)
            .set_expression_attribute_names(non_empty(condition.names))
            .set_expression_attribute_values(non_empty(condition.values));
    }

    let put = put.build().map_err(|e| StoreError::Sdk(Box::new(e)))?;
    Ok(TransactWriteItem::builder().put(put).build())
}

#[async_trait]
impl TableStore for DynamoStore {
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(input.table)
            .set_key(Some(input.key))
            .consistent_read(input.consistent_read)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(output.item)
    }

    async fn put_item(&self, input: PutItemInput) -> Result<(), StoreError> {
        let mut request = self
            .client
            .put_item()
            .table_name(input.table)
            .set_item(Some(input.item));

        if let Some(condition) = input.condition {
            request = request
                .condition_expression(condition.text)
                .set_expression_attribute_names(non_empty(condition.names))
                .set_expression_attribute_values(non_empty(condition.values));
        }

        request.send().await.map_err(map_sdk_error)?;
        Ok(())
    }

    async fn transact_put(&self, puts: Vec<PutItemInput>) -> Result<(), StoreError> {
        let items = puts
            .into_iter()
            .map(build_transact_put)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(items = items.len(), "transact_write_items");

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(map_transact_error)?;
        Ok(())
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<Item, StoreError> {
        let output = self
            .client
            .update_item()
            .table_name(input.table)
            .set_key(Some(input.key))
            .update_expression(input.update.text)
            .set_expression_attribute_names(non_empty(input.update.names))
            .set_expression_attribute_values(non_empty(input.update.values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(output.attributes.unwrap_or_default())
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<Option<Item>, StoreError> {
        let mut request = self
            .client
            .delete_item()
            .table_name(input.table)
            .set_key(Some(input.key))
            .return_values(ReturnValue::AllOld);

        if let Some(condition) = input.condition {
            request = request
                .condition_expression(condition.text)
                .set_expression_attribute_names(non_empty(condition.names))
                .set_expression_attribute_values(non_empty(condition.values));
        }

        let output = request.send().await.map_err(map_sdk_error)?;
        Ok(output.attributes.filter(|attrs| !attrs.is_empty()))
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        let mut request = self
            .client
            .query()
            .table_name(input.table)
            .key_condition_expression(input.key_condition)
            .set_filter_expression(input.filter)
            .set_projection_expression(input.projection)
            .set_expression_attribute_names(non_empty(input.names))
            .set_expression_attribute_values(non_empty::<AttributeValue>(input.values))
            .set_index_name(input.index_name)
            .set_limit(input.limit)
            .set_scan_index_forward(input.scan_forward)
            .set_exclusive_start_key(input.exclusive_start_key);

        if input.consistent_read {
            request = request.consistent_read(true);
        }

        let output = request.send().await.map_err(map_sdk_error)?;

        Ok(QueryOutput {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }
}
