//! Update expression builder.

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::primitives::value_alias;
use super::Expression;
use crate::errors::ConfigError;
use crate::serialization::{to_attribute_value, Attributes};

/// Mapper-owned optimistic-concurrency counter.
pub const VERSION_ATTRIBUTE: &str = "versionNumber";

const ZERO_ALIAS: &str = ":_zero";
const ONE_ALIAS: &str = ":_one";
const EMPTY_LIST_ALIAS: &str = ":_emptyList";

/// Partial update of one item.
///
/// The directive classes may be combined. A removed attribute cannot also be
/// written, and each written attribute should appear in only one class. Naming the same attribute twice is a caller
/// error: it is rejected when the two values disagree, and otherwise left to
/// the store to refuse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDirectives {
    /// Direct replacements. `null` writes a null marker.
    pub attributes: Attributes,
    /// Values appended to a list attribute, created empty when absent.
    pub list_append: BTreeMap<String, Vec<Value>>,
    /// Deltas added to a numeric attribute, zero when absent.
    pub increment: BTreeMap<String, Number>,
    /// Attributes deleted from the item.
    pub remove: BTreeSet<String>,
}

impl UpdateDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    pub fn append<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list_append
            .entry(attribute.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn increment(mut self, attribute: impl Into<String>, delta: impl Into<Number>) -> Self {
        self.increment.insert(attribute.into(), delta.into());
        self
    }

    pub fn remove(mut self, attribute: impl Into<String>) -> Self {
        self.remove.insert(attribute.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.list_append.is_empty()
            && self.increment.is_empty()
            && self.remove.is_empty()
    }

    /// Names written by a `SET` term.
    pub fn written(&self) -> impl Iterator<Item = &String> {
        self.attributes
            .keys()
            .chain(self.list_append.keys())
            .chain(self.increment.keys())
    }

    /// Reject caller-set `versionNumber` and attributes that are both
    /// written and removed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .written()
            .chain(self.remove.iter())
            .any(|name| name == VERSION_ATTRIBUTE)
        {
            return Err(ConfigError::ReservedAttribute(VERSION_ATTRIBUTE.to_string()));
        }
        if let Some(name) = self.written().find(|name| self.remove.contains(*name)) {
            return Err(ConfigError::ConflictingDirectives(name.clone()));
        }
        Ok(())
    }
}

/// Build the `SET [REMOVE]` expression for `directives`.
///
/// The first term always advances `versionNumber` by one, counting an absent
/// version as zero.
pub fn build_update(directives: &UpdateDirectives) -> Result<Expression, ConfigError> {
    directives.validate()?;

    let mut expr = Expression::new();
    let mut terms = Vec::new();

    let version = expr.bind_name(VERSION_ATTRIBUTE)?;
    let zero = expr.bind_attribute_value(ZERO_ALIAS.to_string(), AttributeValue::N("0".to_string()))?;
    let one = expr.bind_attribute_value(ONE_ALIAS.to_string(), AttributeValue::N("1".to_string()))?;
    terms.push(format!("{v} = if_not_exists({v}, {zero}) + {one}", v = version));

    for (attribute, value) in &directives.attributes {
        let name = expr.bind_name(attribute)?;
        let value = expr.bind_value(value_alias(attribute), value)?;
        terms.push(format!("{} = {}", name, value));
    }

    for (attribute, values) in &directives.list_append {
        let name = expr.bind_name(attribute)?;
        let empty = expr.bind_attribute_value(EMPTY_LIST_ALIAS.to_string(), AttributeValue::L(Vec::new()))?;
        let appended = AttributeValue::L(values.iter().map(to_attribute_value).collect());
        let value = expr.bind_attribute_value(value_alias(attribute), appended)?;
        terms.push(format!(
            "{n} = list_append(if_not_exists({n}, {empty}), {value})",
            n = name
        ));
    }

    for (attribute, delta) in &directives.increment {
        let name = expr.bind_name(attribute)?;
        let value = expr.bind_attribute_value(value_alias(attribute), AttributeValue::N(delta.to_string()))?;
        terms.push(format!("{n} = if_not_exists({n}, {zero}) + {value}", n = name));
    }

    expr.text = format!("SET {}", terms.join(", "));

    if !directives.remove.is_empty() {
        let removed = directives
            .remove
            .iter()
            .map(|attribute| expr.bind_name(attribute))
            .collect::<Result<Vec<_>, _>>()?;
        expr.text.push_str(" REMOVE ");
        expr.text.push_str(&removed.join(", "));
    }
    Ok(expr)
}
