use tracing::{debug, instrument, Span};

use super::DynamoMapper;
use crate::entity::{Entity, PrimaryKey};
use crate::errors::{ConfigError, Result, StoreError};
use crate::expressions::{render_condition, Expression, Operator};
use crate::serialization::Attributes;
use crate::store::DeleteItemInput;

impl DynamoMapper {
    /// Delete the item at `key` and return it as it was.
    ///
    /// Every `(attribute, value)` in `expected` must match the stored item
    /// for the delete to happen. A missing item and a failed expectation both
    /// yield `Ok(None)`.
    #[instrument(skip_all, fields(entity = tracing::field::Empty, table = tracing::field::Empty))]
    pub async fn delete<T: Entity>(&self, key: &PrimaryKey, expected: &Attributes) -> Result<Option<T>> {
        let config = self.entity_config::<T>()?;
        let span = Span::current();
        span.record("entity", config.entity_name());
        span.record("table", config.table_name());
        self.cipher_for(&config)?;

        let input = DeleteItemInput {
            table: config.table_name().to_string(),
            key: config.table_key().build_key(key),
            condition: expected_condition(expected)?,
        };

        match self.store.delete_item(input).await {
            Ok(Some(item)) => Ok(Some(self.reconstruct(&config, item).await?)),
            Ok(None) => {
                debug!("nothing to delete");
                Ok(None)
            }
            Err(StoreError::ConditionalCheckFailed) => {
                debug!("delete expectation not met");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `#a = :a and #b = :b ...`, or `None` when nothing is expected.
fn expected_condition(expected: &Attributes) -> Result<Option<Expression>, ConfigError> {
    if expected.is_empty() {
        return Ok(None);
    }
    let mut expr = Expression::new();
    for (attribute, value) in expected {
        let clause = render_condition(&mut expr, attribute, Operator::Eq, std::slice::from_ref(value))?;
        expr.push_clause(&clause, "and");
    }
    Ok(Some(expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expected_condition() {
        let expected = json!({"status": "ACTIVE", "owner": "ann"});
        let expr = expected_condition(expected.as_object().unwrap())
            .unwrap()
            .unwrap();
        // serde_json::Map keeps keys sorted
        assert_eq!(expr.text, "#owner = :owner and #status = :status");
        assert_eq!(expr.names.len(), 2);
        assert_eq!(expr.values.len(), 2);
    }

    #[test]
    fn test_no_expectation_no_condition() {
        assert!(expected_condition(&Attributes::new()).unwrap().is_none());
    }
}
