//! Filter and projection builders.

use serde_json::Value;

use super::primitives::{render_condition, Operator};
use super::Expression;
use crate::errors::ConfigError;

/// A post-key-condition filter on one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub attribute: String,
    pub operator: Operator,
    pub values: Vec<Value>,
}

impl Filter {
    pub fn new(attribute: impl Into<String>, operator: Operator, values: Vec<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            values,
        }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, Operator::Eq, vec![value.into()])
    }

    pub fn compare(attribute: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::new(attribute, operator, vec![value.into()])
    }

    pub fn begins_with(attribute: impl Into<String>, prefix: impl Into<Value>) -> Self {
        Self::new(attribute, Operator::BeginsWith, vec![prefix.into()])
    }

    pub fn between(
        attribute: impl Into<String>,
        from: impl Into<Value>,
        to: impl Into<Value>,
    ) -> Self {
        Self::new(attribute, Operator::Between, vec![from.into(), to.into()])
    }

    pub fn exists(attribute: impl Into<String>) -> Self {
        Self::new(attribute, Operator::Exists, Vec::new())
    }
}

/// Join `filters` with `and`. Returns `None` for an empty list.
pub fn build_filter(filters: &[Filter]) -> Result<Option<Expression>, ConfigError> {
    if filters.is_empty() {
        return Ok(None);
    }

    let mut expr = Expression::new();
    for filter in filters {
        let clause = render_condition(&mut expr, &filter.attribute, filter.operator, &filter.values)?;
        expr.push_clause(&clause, "and");
    }
    Ok(Some(expr))
}

/// Render a projection list through the name aliases. Returns `None` for an
/// empty list.
pub fn build_projection<S: AsRef<str>>(attributes: &[S]) -> Result<Option<Expression>, ConfigError> {
    if attributes.is_empty() {
        return Ok(None);
    }

    let mut expr = Expression::new();
    let aliases = attributes
        .iter()
        .map(|attribute| expr.bind_name(attribute.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    expr.text = aliases.join(", ");
    Ok(Some(expr))
}
