//! Key condition builder.

use serde_json::Value;

use super::primitives::{render_condition, value_alias, Operator};
use super::Expression;
use crate::entity::{KeyConfig, KeyValue};
use crate::errors::ConfigError;

/// Constraint on the sort key of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKeyCondition {
    pub operator: Operator,
    pub values: Vec<Value>,
}

impl SortKeyCondition {
    pub fn new(operator: Operator, values: Vec<Value>) -> Self {
        Self { operator, values }
    }

    pub fn eq(value: impl Into<Value>) -> Self {
        Self::new(Operator::Eq, vec![value.into()])
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::new(Operator::Lt, vec![value.into()])
    }

    pub fn le(value: impl Into<Value>) -> Self {
        Self::new(Operator::Le, vec![value.into()])
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::new(Operator::Gt, vec![value.into()])
    }

    pub fn ge(value: impl Into<Value>) -> Self {
        Self::new(Operator::Ge, vec![value.into()])
    }

    pub fn begins_with(prefix: impl Into<Value>) -> Self {
        Self::new(Operator::BeginsWith, vec![prefix.into()])
    }

    pub fn between(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self::new(Operator::Between, vec![from.into(), to.into()])
    }
}

/// Build `#pk = :pk [and <sort clause>]` for `key`.
///
/// Only a single partition plus an optional sort constraint is expressible;
/// there is no OR form.
pub fn build_key_condition(
    key: &KeyConfig,
    partition: &KeyValue,
    sort: Option<&SortKeyCondition>,
) -> Result<Expression, ConfigError> {
    let mut expr = Expression::new();

    let pk = key.partition_key();
    let name = expr.bind_name(pk)?;
    let value = expr.bind_value(value_alias(pk), &partition.to_json())?;
    expr.push_clause(&format!("{} = {}", name, value), "and");

    if let Some(condition) = sort {
        let sk = key.sort_key().ok_or_else(|| ConfigError::NoSortKey {
            partition_key: pk.to_string(),
        })?;
        if !condition.operator.is_key_operator() {
            return Err(ConfigError::UnsupportedKeyOperator(condition.operator));
        }
        let clause = render_condition(&mut expr, sk, condition.operator, &condition.values)?;
        expr.push_clause(&clause, "and");
    }

    Ok(expr)
}
