//! Store boundary.
//!
//! The mapper talks to the key-value store only through [`TableStore`].
//! [`DynamoStore`] is the DynamoDB implementation; tests substitute an
//! in-memory one.

mod dynamodb;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::expressions::Expression;
use crate::serialization::Item;

pub use dynamodb::DynamoStore;

/// Point read.
#[derive(Debug, Clone)]
pub struct GetItemInput {
    pub table: String,
    pub key: Item,
    pub consistent_read: bool,
}

/// Conditional put. Also one element of a transactional write.
#[derive(Debug, Clone)]
pub struct PutItemInput {
    pub table: String,
    pub item: Item,
    pub condition: Option<Expression>,
}

/// Update returning the post-update image.
#[derive(Debug, Clone)]
pub struct UpdateItemInput {
    pub table: String,
    pub key: Item,
    pub update: Expression,
}

/// Delete returning the pre-delete image.
#[derive(Debug, Clone)]
pub struct DeleteItemInput {
    pub table: String,
    pub key: Item,
    pub condition: Option<Expression>,
}

/// One page of a query.
///
/// `names` and `values` are the merged aliases of the key condition, filter
/// and projection.
#[derive(Debug, Clone, Default)]
pub struct QueryInput {
    pub table: String,
    pub index_name: Option<String>,
    pub key_condition: String,
    pub filter: Option<String>,
    pub projection: Option<String>,
    pub names: std::collections::HashMap<String, String>,
    pub values: Item,
    pub limit: Option<i32>,
    pub scan_forward: Option<bool>,
    pub consistent_read: bool,
    pub exclusive_start_key: Option<Item>,
}

/// Items of one page plus the key to resume from.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// Primitives of the remote store.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, StoreError>;

    async fn put_item(&self, input: PutItemInput) -> Result<(), StoreError>;

    /// All-or-nothing write of `puts`, in order.
    async fn transact_put(&self, puts: Vec<PutItemInput>) -> Result<(), StoreError>;

    async fn update_item(&self, input: UpdateItemInput) -> Result<Item, StoreError>;

    /// Returns the deleted item, or `None` when nothing was there.
    async fn delete_item(&self, input: DeleteItemInput) -> Result<Option<Item>, StoreError>;

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError>;
}
