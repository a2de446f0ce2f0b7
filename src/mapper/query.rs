use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::types::AttributeValue;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::try_join_all;
use tracing::{debug, instrument, Span};

use super::DynamoMapper;
use crate::entity::{Entity, KeyValue};
use crate::errors::{Result, SerializationError};
use crate::expressions::{build_filter, build_key_condition, build_projection, Filter, SortKeyCondition};
use crate::serialization::Item;
use crate::store::QueryInput;
use crate::transform::ciphertext_key;

/// Opaque position to resume a query from.
///
/// Wraps the last evaluated key of a page. [`encode`](Self::encode) turns it
/// into a URL-safe string that can be handed to a client and passed back.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationToken(Item);

impl ContinuationToken {
    pub fn from_item(item: Item) -> Self {
        Self(item)
    }

    pub fn as_item(&self) -> &Item {
        &self.0
    }

    pub fn into_item(self) -> Item {
        self.0
    }

    /// Base64 of `{"attr": {"S": "..."}, ...}`. Key attributes are strings,
    /// numbers or binary; anything else is rejected.
    pub fn encode(&self) -> Result<String, SerializationError> {
        let mut tagged = BTreeMap::new();
        for (name, value) in &self.0 {
            let (tag, raw) = match value {
                AttributeValue::S(s) => ("S", s.clone()),
                AttributeValue::N(n) => ("N", n.clone()),
                AttributeValue::B(b) => ("B", URL_SAFE_NO_PAD.encode(b.as_ref())),
                _ => return Err(SerializationError::UnsupportedAttribute),
            };
            tagged.insert(name.as_str(), BTreeMap::from([(tag, raw)]));
        }
        let json = serde_json::to_vec(&tagged)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(token: &str) -> Result<Self, SerializationError> {
        let json = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| SerializationError::InvalidToken(e.to_string()))?;
        let tagged: HashMap<String, HashMap<String, String>> = serde_json::from_slice(&json)
            .map_err(|e| SerializationError::InvalidToken(e.to_string()))?;

        let mut item = Item::with_capacity(tagged.len());
        for (name, value) in tagged {
            let mut entries = value.into_iter();
            let value = match (entries.next(), entries.next()) {
                (Some((tag, raw)), None) => match tag.as_str() {
                    "S" => AttributeValue::S(raw),
                    "N" => AttributeValue::N(raw),
                    "B" => {
                        let bytes = URL_SAFE_NO_PAD
                            .decode(raw)
                            .map_err(|e| SerializationError::InvalidToken(e.to_string()))?;
                        AttributeValue::B(bytes.into())
                    }
                    other => {
                        return Err(SerializationError::InvalidToken(format!(
                            "unsupported type tag '{}' for '{}'",
                            other, name
                        )))
                    }
                },
                _ => {
                    return Err(SerializationError::InvalidToken(format!(
                        "'{}' must carry exactly one typed value",
                        name
                    )))
                }
            };
            item.insert(name, value);
        }
        Ok(Self(item))
    }
}

/// One query request.
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub partition_key: KeyValue,
    pub sort_key: Option<SortKeyCondition>,
    /// Secondary index to query instead of the table.
    pub index: Option<String>,
    pub filters: Vec<Filter>,
    /// Attributes to return. Empty returns whole items.
    pub projection: Vec<String>,
    pub limit: Option<i32>,
    pub scan_forward: Option<bool>,
    /// Overrides the mapper default. Ignored for index queries.
    pub consistent_read: Option<bool>,
    pub start: Option<ContinuationToken>,
}

impl QueryParams {
    pub fn new(partition_key: impl Into<KeyValue>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
            index: None,
            filters: Vec::new(),
            projection: Vec::new(),
            limit: None,
            scan_forward: None,
            consistent_read: None,
            start: None,
        }
    }

    pub fn sort_key(mut self, condition: SortKeyCondition) -> Self {
        self.sort_key = Some(condition);
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn project<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.scan_forward = Some(false);
        self
    }

    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = Some(consistent);
        self
    }

    pub fn start_after(mut self, token: ContinuationToken) -> Self {
        self.start = Some(token);
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct QueryPage<T> {
    pub items: Vec<T>,
    /// Present when more results may follow.
    pub next: Option<ContinuationToken>,
}

impl DynamoMapper {
    /// Query one page of entities sharing a partition key, on the table or a
    /// named secondary index.
    #[instrument(
        skip_all,
        fields(
            entity = tracing::field::Empty,
            table = tracing::field::Empty,
            index = params.index.as_deref()
        )
    )]
    pub async fn query<T: Entity>(&self, params: QueryParams) -> Result<QueryPage<T>> {
        let config = self.entity_config::<T>()?;
        let span = Span::current();
        span.record("entity", config.entity_name());
        span.record("table", config.table_name());
        self.cipher_for(&config)?;

        let key_config = match &params.index {
            Some(index) => config.index_key(index)?,
            None => config.table_key(),
        };

        let mut expr = build_key_condition(key_config, &params.partition_key, params.sort_key.as_ref())?;

        let filter = build_filter(&params.filters)?;
        if let Some(filter) = &filter {
            expr.merge_aliases(filter)?;
        }

        // Sensitive fields live under their ciphertext attribute.
        let projected: Vec<String> = params
            .projection
            .iter()
            .map(|attr| {
                if config.sensitive_fields().contains(attr) {
                    ciphertext_key(attr)
                } else {
                    attr.clone()
                }
            })
            .collect();
        let projection = build_projection(&projected)?;
        if let Some(projection) = &projection {
            expr.merge_aliases(projection)?;
        }

        let mut consistent_read = params.consistent_read.unwrap_or(self.config.consistent_reads);
        if consistent_read && params.index.is_some() {
            debug!("consistent read not supported on secondary indexes, ignoring");
            consistent_read = false;
        }

        let input = QueryInput {
            table: config.table_name().to_string(),
            index_name: params.index.clone(),
            key_condition: expr.text,
            filter: filter.map(|f| f.text),
            projection: projection.map(|p| p.text),
            names: expr.names,
            values: expr.values,
            limit: params.limit,
            scan_forward: params.scan_forward,
            consistent_read,
            exclusive_start_key: params.start.map(ContinuationToken::into_item),
        };

        let output = self.store.query(input).await?;
        debug!(
            count = output.items.len(),
            more = output.last_evaluated_key.is_some(),
            "query page fetched"
        );

        let items = try_join_all(
            output
                .items
                .into_iter()
                .map(|item| self.reconstruct::<T>(&config, item)),
        )
        .await?;

        Ok(QueryPage {
            items,
            next: output.last_evaluated_key.map(ContinuationToken::from_item),
        })
    }
}
