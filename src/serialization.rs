//! Conversion between entities, JSON attribute maps and DynamoDB items.
//!
//! Entities are any serde type whose JSON form is an object. That object is
//! the entity's attribute map, and it converts one-to-one into a DynamoDB
//! item:
//!
//! | JSON            | DynamoDB |
//! |-----------------|----------|
//! | string          | `S`      |
//! | number          | `N`      |
//! | bool            | `BOOL`   |
//! | null            | `NULL`   |
//! | array           | `L`      |
//! | object          | `M`      |
//!
//! On the way back, sets (`SS`, `NS`, `BS`) read as arrays and binary values
//! read as base64 strings.

use aws_sdk_dynamodb::types::AttributeValue;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::errors::SerializationError;

/// An entity's attributes in JSON form.
pub type Attributes = Map<String, Value>;

/// An item in DynamoDB wire form.
pub type Item = HashMap<String, AttributeValue>;

/// Serialize an entity into its attribute map.
pub fn to_attributes<T: Serialize>(entity: &T) -> Result<Attributes, SerializationError> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        _ => Err(SerializationError::NotAnObject),
    }
}

/// Rebuild an entity from its attribute map.
pub fn from_attributes<T: DeserializeOwned>(attrs: Attributes) -> Result<T, SerializationError> {
    Ok(serde_json::from_value(Value::Object(attrs))?)
}

/// Convert an attribute map to a DynamoDB item.
pub fn to_item(attrs: &Attributes) -> Item {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), to_attribute_value(v)))
        .collect()
}

/// Convert a DynamoDB item to an attribute map.
pub fn from_item(item: Item) -> Result<Attributes, SerializationError> {
    let mut result = Map::new();
    for (key, value) in item {
        result.insert(key, from_attribute_value(value)?);
    }
    Ok(result)
}

/// Convert a single JSON value to a DynamoDB AttributeValue.
pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute_value).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                .collect(),
        ),
    }
}

/// Convert a single DynamoDB AttributeValue to a JSON value.
pub fn from_attribute_value(value: AttributeValue) -> Result<Value, SerializationError> {
    let converted = match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => Value::Number(parse_number(&n)?),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::B(b) => Value::String(BASE64.encode(b.as_ref())),
        AttributeValue::L(list) => Value::Array(
            list.into_iter()
                .map(from_attribute_value)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => {
            let mut result = Map::new();
            for (k, v) in map {
                result.insert(k, from_attribute_value(v)?);
            }
            Value::Object(result)
        }
        AttributeValue::Ss(ss) => Value::Array(ss.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(ns) => Value::Array(
            ns.iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::Bs(bs) => Value::Array(
            bs.into_iter()
                .map(|b| Value::String(BASE64.encode(b.as_ref())))
                .collect(),
        ),
        _ => return Err(SerializationError::UnsupportedAttribute),
    };
    Ok(converted)
}

/// Parse a DynamoDB number string, keeping integers exact.
fn parse_number(n: &str) -> Result<Number, SerializationError> {
    let invalid = || SerializationError::InvalidNumber(n.to_string());

    if n.contains('.') || n.contains('e') || n.contains('E') {
        let f: f64 = n.parse().map_err(|_| invalid())?;
        return Number::from_f64(f).ok_or_else(invalid);
    }

    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    n.parse::<u64>().map(Number::from).map_err(|_| invalid())
}
