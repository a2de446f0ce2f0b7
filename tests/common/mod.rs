//! Shared fixtures: an in-memory table store, a fake cipher and a few
//! registered entity types.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};

use dynomap::errors::CipherError;
use dynomap::expressions::Expression;
use dynomap::serialization::Item;
use dynomap::store::{
    DeleteItemInput, GetItemInput, PutItemInput, QueryInput, QueryOutput, UpdateItemInput,
};
use dynomap::{
    AuditFields, DynamoMapper, EntityConfig, EntityRegistry, FieldCipher, KeyConfig, MapperConfig,
    PrimaryKey, StoreError, TableStore,
};

// ========== ENTITIES ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub login_count: i64,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl User {
    pub fn new(id: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            status: "ACTIVE".to_string(),
            tags: Vec::new(),
            login_count: 0,
            audit: AuditFields::default(),
        }
    }

    pub fn version(&self) -> Option<i64> {
        self.audit.version_number
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub customer_id: String,
    pub order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total: i64,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl Order {
    pub fn new(customer_id: &str, order_id: &str, status: &str, total: i64) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            order_id: order_id.to_string(),
            status: status.to_string(),
            total,
            audit: AuditFields::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

pub const USERS: &str = "users";
pub const ORDERS: &str = "orders";
pub const PATIENTS: &str = "patients";

pub fn registry() -> EntityRegistry {
    let mut registry = EntityRegistry::new();
    registry.register::<User>(
        EntityConfig::builder(USERS, KeyConfig::new("id"))
            .index("byEmail", KeyConfig::new("email"))
            .build()
            .unwrap(),
    );
    registry.register::<Order>(
        EntityConfig::builder(ORDERS, KeyConfig::new("customerId").with_sort_key("orderId"))
            .index("byStatus", KeyConfig::new("status").with_sort_key("orderId"))
            .build()
            .unwrap(),
    );
    registry.register::<Patient>(
        EntityConfig::builder(PATIENTS, KeyConfig::new("id"))
            .sensitive_fields(["ssn"])
            .build()
            .unwrap(),
    );
    registry
}

/// Store with the three fixture tables.
pub fn store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_table(USERS, &["id"])
            .with_table(ORDERS, &["customerId", "orderId"])
            .with_table(PATIENTS, &["id"]),
    )
}

pub fn mapper(store: &Arc<MemoryStore>) -> DynamoMapper {
    DynamoMapper::new(store.clone(), registry())
}

pub fn mapper_with_batch_size(store: &Arc<MemoryStore>, batch_size: usize) -> DynamoMapper {
    mapper(store).with_config(MapperConfig {
        transaction_batch_size: batch_size,
        ..MapperConfig::default()
    })
}

pub fn user_key(id: &str) -> PrimaryKey {
    PrimaryKey::new(id)
}

pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

pub fn n(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

// ========== FAKE CIPHER ==========

/// Reversible stand-in for KMS: `fake:` plus the reversed plaintext.
#[derive(Debug, Default)]
pub struct FakeCipher {
    pub encrypt_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
}

#[async_trait]
impl FieldCipher for FakeCipher {
    async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        self.encrypt_calls.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(format!("fake:{}", plaintext.chars().rev().collect::<String>()))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        self.decrypt_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let reversed = ciphertext
            .strip_prefix("fake:")
            .ok_or_else(|| CipherError::InvalidFormat(ciphertext.to_string()))?;
        Ok(reversed.chars().rev().collect())
    }
}

// ========== IN-MEMORY STORE ==========

/// Calls seen by the store, for assertions on what the mapper sent.
#[derive(Debug, Clone)]
pub enum Call {
    Get(GetItemInput),
    Put(PutItemInput),
    Transact(Vec<PutItemInput>),
    Update(UpdateItemInput),
    Delete(DeleteItemInput),
    Query(QueryInput),
}

/// Single-process table store that evaluates the expression subset the
/// mapper emits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    schemas: HashMap<String, Vec<String>>,
    tables: Mutex<HashMap<String, BTreeMap<String, Item>>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<usize, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, key_attributes: &[&str]) -> Self {
        self.schemas.insert(
            table.to_string(),
            key_attributes.iter().map(|k| k.to_string()).collect(),
        );
        self
    }

    /// Cancel the `index`th transaction (zero-based) with `reasons`,
    /// writing nothing.
    pub fn fail_transaction(&self, index: usize, reasons: &[&str]) {
        self.failures
            .lock()
            .unwrap()
            .insert(index, reasons.iter().map(|r| r.to_string()).collect());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Sizes of every transactional write, in order.
    pub fn transaction_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Transact(puts) => Some(puts.len()),
                _ => None,
            })
            .collect()
    }

    pub fn last_query(&self) -> Option<QueryInput> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Call::Query(input) => Some(input),
            _ => None,
        })
    }

    /// Raw stored item, bypassing the mapper.
    pub fn raw(&self, table: &str, key: &[(&str, AttributeValue)]) -> Option<Item> {
        let key: Item = key.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let id = self.storage_key(table, &key).ok()?;
        self.tables.lock().unwrap().get(table)?.get(&id).cloned()
    }

    /// Write an item directly, bypassing the mapper.
    pub fn seed(&self, table: &str, item: Item) {
        let id = self.storage_key(table, &item).unwrap();
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id, item);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Stable id of the item addressed by `key`. Fails like DynamoDB when
    /// the key does not match the table schema.
    fn storage_key(&self, table: &str, key: &Item) -> Result<String, StoreError> {
        let schema = self
            .schemas
            .get(table)
            .ok_or_else(|| StoreError::Validation(format!("table {} not found", table)))?;
        let mut parts = Vec::with_capacity(schema.len());
        for name in schema {
            match key.get(name) {
                Some(AttributeValue::S(v)) => parts.push(format!("S:{}", v)),
                Some(AttributeValue::N(v)) => parts.push(format!("N:{:0>20}", v)),
                _ => {
                    return Err(StoreError::Validation(
                        "The provided key element does not match the schema".to_string(),
                    ))
                }
            }
        }
        Ok(parts.join("|"))
    }

    fn key_of(&self, table: &str, item: &Item) -> Item {
        self.schemas
            .get(table)
            .map(|schema| {
                schema
                    .iter()
                    .filter_map(|k| item.get(k).map(|v| (k.clone(), v.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_key_only(&self, table: &str, key: &Item) -> Result<String, StoreError> {
        let schema_len = self.schemas.get(table).map_or(0, Vec::len);
        if key.len() != schema_len {
            return Err(StoreError::Validation(
                "The provided key element does not match the schema".to_string(),
            ));
        }
        self.storage_key(table, key)
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, StoreError> {
        self.record(Call::Get(input.clone()));
        let id = self.check_key_only(&input.table, &input.key)?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(&input.table)
            .and_then(|t| t.get(&id).cloned()))
    }

    async fn put_item(&self, input: PutItemInput) -> Result<(), StoreError> {
        self.record(Call::Put(input.clone()));
        let id = self.storage_key(&input.table, &input.item)?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(input.table.clone()).or_default();
        if let Some(condition) = &input.condition {
            let empty = Item::new();
            let existing = table.get(&id).unwrap_or(&empty);
            if !evaluate(condition, existing) {
                return Err(StoreError::ConditionalCheckFailed);
            }
        }
        table.insert(id, input.item);
        Ok(())
    }

    async fn transact_put(&self, puts: Vec<PutItemInput>) -> Result<(), StoreError> {
        let index = self.transaction_sizes().len();
        self.record(Call::Transact(puts.clone()));
        if let Some(reasons) = self.failures.lock().unwrap().remove(&index) {
            return Err(StoreError::TransactionCanceled { reasons });
        }
        let mut tables = self.tables.lock().unwrap();
        let mut reasons = Vec::with_capacity(puts.len());
        let mut ids = Vec::with_capacity(puts.len());
        for put in &puts {
            let id = self.storage_key(&put.table, &put.item)?;
            let empty = Item::new();
            let existing = tables
                .get(&put.table)
                .and_then(|t| t.get(&id))
                .unwrap_or(&empty);
            let ok = put
                .condition
                .as_ref()
                .map_or(true, |condition| evaluate(condition, existing));
            reasons.push(if ok { "None" } else { "ConditionalCheckFailed" }.to_string());
            ids.push(id);
        }
        if reasons.iter().any(|r| r != "None") {
            return Err(StoreError::TransactionCanceled { reasons });
        }
        for (put, id) in puts.into_iter().zip(ids) {
            tables.entry(put.table).or_default().insert(id, put.item);
        }
        Ok(())
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<Item, StoreError> {
        self.record(Call::Update(input.clone()));
        let id = self.check_key_only(&input.table, &input.key)?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(input.table.clone()).or_default();
        let mut item = table.get(&id).cloned().unwrap_or_else(|| input.key.clone());
        apply_update(&input.update, &mut item)?;
        table.insert(id, item.clone());
        Ok(item)
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<Option<Item>, StoreError> {
        self.record(Call::Delete(input.clone()));
        let id = self.check_key_only(&input.table, &input.key)?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(input.table.clone()).or_default();
        if let Some(condition) = &input.condition {
            let empty = Item::new();
            let existing = table.get(&id).unwrap_or(&empty);
            if !evaluate(condition, existing) {
                return Err(StoreError::ConditionalCheckFailed);
            }
        }
        Ok(table.remove(&id))
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        self.record(Call::Query(input.clone()));
        let key_condition = Expression {
            text: input.key_condition.clone(),
            names: input.names.clone(),
            values: input.values.clone(),
        };
        let filter = input.filter.clone().map(|text| Expression {
            text,
            names: input.names.clone(),
            values: input.values.clone(),
        });

        let tables = self.tables.lock().unwrap();
        let mut candidates: Vec<Item> = tables
            .get(&input.table)
            .map(|t| {
                t.values()
                    .filter(|item| evaluate(&key_condition, item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if input.scan_forward == Some(false) {
            candidates.reverse();
        }

        if let Some(start) = &input.exclusive_start_key {
            let start_id = self.storage_key(&input.table, start)?;
            let position = candidates.iter().position(|item| {
                self.storage_key(&input.table, item).ok().as_ref() == Some(&start_id)
            });
            candidates = match position {
                Some(p) => candidates.split_off(p + 1),
                None => Vec::new(),
            };
        }

        // Limit caps items evaluated, before the filter runs.
        let limit = input.limit.map_or(usize::MAX, |l| l as usize);
        let more = candidates.len() > limit;
        candidates.truncate(limit);
        let last_evaluated_key = if more {
            candidates.last().map(|item| self.key_of(&input.table, item))
        } else {
            None
        };

        let projection: Option<Vec<String>> = input.projection.as_ref().map(|p| {
            p.split(", ")
                .filter_map(|alias| input.names.get(alias).cloned())
                .collect()
        });

        let items = candidates
            .into_iter()
            .filter(|item| filter.as_ref().map_or(true, |f| evaluate(f, item)))
            .map(|item| match &projection {
                Some(attrs) => item
                    .into_iter()
                    .filter(|(k, _)| attrs.contains(k))
                    .collect(),
                None => item,
            })
            .collect();

        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }
}

// ========== EXPRESSION EVALUATION ==========

/// Evaluate `or`/`and` joined conditions without parentheses.
pub fn evaluate(expr: &Expression, item: &Item) -> bool {
    expr.text
        .split(" or ")
        .any(|disjunct| conjuncts(disjunct).iter().all(|atom| evaluate_atom(expr, atom, item)))
}

/// Split on ` and `, keeping `x between :a and :b` together.
fn conjuncts(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for piece in text.split(" and ") {
        match out.last_mut() {
            Some(last) if last.contains(" between ") && !last.contains(" and ") => {
                last.push_str(" and ");
                last.push_str(piece);
            }
            _ => out.push(piece.to_string()),
        }
    }
    out
}

fn evaluate_atom(expr: &Expression, atom: &str, item: &Item) -> bool {
    let attr = |alias: &str| expr.names.get(alias).and_then(|name| item.get(name));
    let value = |alias: &str| expr.values.get(alias);

    if let Some(inner) = atom.strip_prefix("attribute_not_exists(") {
        return attr(inner.trim_end_matches(')')).is_none();
    }
    if let Some(inner) = atom.strip_prefix("attribute_exists(") {
        return attr(inner.trim_end_matches(')')).is_some();
    }
    if let Some(inner) = atom.strip_prefix("begins_with(") {
        let (name, prefix) = inner.trim_end_matches(')').split_once(", ").unwrap();
        return match (attr(name), value(prefix)) {
            (Some(AttributeValue::S(v)), Some(AttributeValue::S(p))) => v.starts_with(p.as_str()),
            _ => false,
        };
    }
    if let Some((name, range)) = atom.split_once(" between ") {
        let (from, to) = range.split_once(" and ").unwrap();
        return match (attr(name), value(from), value(to)) {
            (Some(v), Some(lo), Some(hi)) => {
                compare(v, lo) != Some(Ordering::Less) && compare(v, hi) != Some(Ordering::Greater)
            }
            _ => false,
        };
    }

    let mut parts = atom.splitn(3, ' ');
    let (name, op, operand) = (parts.next().unwrap(), parts.next().unwrap(), parts.next().unwrap());
    let (Some(left), Some(right)) = (attr(name), value(operand)) else {
        return false;
    };
    match op {
        "=" => left == right,
        "<" => compare(left, right) == Some(Ordering::Less),
        "<=" => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        ">" => compare(left, right) == Some(Ordering::Greater),
        ">=" => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
        other => panic!("unsupported operator {}", other),
    }
}

fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            a.parse::<f64>().ok()?.partial_cmp(&b.parse::<f64>().ok()?)
        }
        _ => None,
    }
}

/// Apply a `SET [REMOVE]` expression of the shapes the update builder emits.
fn apply_update(expr: &Expression, item: &mut Item) -> Result<(), StoreError> {
    let body = expr
        .text
        .strip_prefix("SET ")
        .ok_or_else(|| StoreError::Validation("update must start with SET".to_string()))?;
    let (body, removed) = match body.split_once(" REMOVE ") {
        Some((set, remove)) => (set, Some(remove)),
        None => (body, None),
    };
    let terms = body
        .split(", #")
        .enumerate()
        .map(|(i, t)| if i == 0 { t.to_string() } else { format!("#{}", t) });

    let missing = |alias: &str| StoreError::Validation(format!("missing alias {}", alias));
    for term in terms {
        let (name_alias, rhs) = term.split_once(" = ").ok_or_else(|| missing(&term))?;
        let name = expr.names.get(name_alias).ok_or_else(|| missing(name_alias))?.clone();

        let new_value = if let Some(rest) = rhs.strip_prefix("list_append(") {
            let operand = rest.rsplit(", ").next().unwrap_or_default().trim_end_matches(')');
            let appended = expr.values.get(operand).ok_or_else(|| missing(operand))?;
            let mut list = match item.get(&name) {
                None => Vec::new(),
                Some(AttributeValue::L(existing)) => existing.clone(),
                Some(_) => {
                    return Err(StoreError::Validation(
                        "An operand in the update expression has an incorrect data type".to_string(),
                    ))
                }
            };
            if let AttributeValue::L(values) = appended {
                list.extend(values.iter().cloned());
            }
            AttributeValue::L(list)
        } else if rhs.starts_with("if_not_exists(") {
            let operand = rhs.rsplit(" + ").next().unwrap_or_default();
            let delta = match expr.values.get(operand) {
                Some(AttributeValue::N(d)) => d.parse::<i64>().unwrap(),
                _ => return Err(missing(operand)),
            };
            let current = match item.get(&name) {
                None => 0,
                Some(AttributeValue::N(c)) => c.parse::<i64>().unwrap(),
                Some(_) => {
                    return Err(StoreError::Validation(
                        "An operand in the update expression has an incorrect data type".to_string(),
                    ))
                }
            };
            AttributeValue::N((current + delta).to_string())
        } else {
            expr.values.get(rhs).ok_or_else(|| missing(rhs))?.clone()
        };
        item.insert(name, new_value);
    }

    for alias in removed.into_iter().flat_map(|r| r.split(", ")) {
        let name = expr.names.get(alias).ok_or_else(|| missing(alias))?;
        item.remove(name);
    }
    Ok(())
}
