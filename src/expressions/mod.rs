//! Expression builders.
//!
//! Each builder fills an [`Expression`]: the expression text plus the name and
//! value alias maps it references. The mapper merges the alias maps of the
//! key condition, filter and projection before issuing a query.
//!
//! - [`build_key_condition`] - partition equality plus optional sort clause
//! - [`build_filter`] - `and`-joined attribute filters
//! - [`build_projection`] - aliased attribute list
//! - [`build_update`] - `SET` expression with the version increment

mod filter;
mod key_condition;
mod primitives;
mod update;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::ConfigError;
use crate::serialization::to_attribute_value;

pub use filter::{build_filter, build_projection, Filter};
pub use key_condition::{build_key_condition, SortKeyCondition};
pub use primitives::{name_alias, range_aliases, render_condition, value_alias, Operator};
pub use update::{build_update, UpdateDirectives, VERSION_ATTRIBUTE};

/// Expression text with its name and value aliases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    pub text: String,
    /// `#alias` -> attribute name.
    pub names: HashMap<String, String>,
    /// `:alias` -> value.
    pub values: HashMap<String, AttributeValue>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Append a clause, joining with `joiner` when text already exists.
    pub(crate) fn push_clause(&mut self, clause: &str, joiner: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
            self.text.push_str(joiner);
            self.text.push(' ');
        }
        self.text.push_str(clause);
    }

    /// Register the name alias for `attribute` and return it.
    pub(crate) fn bind_name(&mut self, attribute: &str) -> Result<String, ConfigError> {
        let alias = name_alias(attribute);
        self.insert_name(alias.clone(), attribute.to_string())?;
        Ok(alias)
    }

    /// Register `value` under `alias` and return the alias.
    pub(crate) fn bind_value(&mut self, alias: String, value: &Value) -> Result<String, ConfigError> {
        self.bind_attribute_value(alias, to_attribute_value(value))
    }

    pub(crate) fn bind_attribute_value(
        &mut self,
        alias: String,
        value: AttributeValue,
    ) -> Result<String, ConfigError> {
        match self.values.get(&alias) {
            Some(existing) if *existing != value => Err(ConfigError::AliasCollision { alias }),
            Some(_) => Ok(alias),
            None => {
                self.values.insert(alias.clone(), value);
                Ok(alias)
            }
        }
    }

    fn insert_name(&mut self, alias: String, attribute: String) -> Result<(), ConfigError> {
        match self.names.get(&alias) {
            Some(existing) if *existing != attribute => Err(ConfigError::AliasCollision { alias }),
            Some(_) => Ok(()),
            None => {
                self.names.insert(alias, attribute);
                Ok(())
            }
        }
    }

    /// Merge another expression's alias maps into this one.
    ///
    /// Identical bindings are tolerated; an alias bound to two different
    /// names or values is an error.
    pub fn merge_aliases(&mut self, other: &Expression) -> Result<(), ConfigError> {
        for (alias, attribute) in &other.names {
            self.insert_name(alias.clone(), attribute.clone())?;
        }
        for (alias, value) in &other.values {
            self.bind_attribute_value(alias.clone(), value.clone())?;
        }
        Ok(())
    }
}
