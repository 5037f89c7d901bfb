//! Backend-agnostic query descriptor: predicate tree, ordering, projection,
//! relations and paging.
//!
//! Every storage adapter evaluates the same [`StorageQuery`] shape. The scalar
//! semantics below are the contract adapters must reproduce:
//!
//! - comparisons against a missing or null field are false (never "unknown")
//! - booleans compare as the numbers 0 and 1
//! - ordering ranks null < number < text; arrays/objects rank as their JSON text
//! - results are ordered by the requested keys, then `created_at`, then `id`

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::entity::fields;
use crate::error::{DomainError, DomainResult};

/// Upper bound for `take` on paginated reads.
pub const MAX_PAGE_SIZE: u64 = 100;

/// `take` applied when a paginated read does not specify one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A filter over stored documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches every row.
    #[default]
    All,
    Eq { field: String, value: JsonValue },
    Ne { field: String, value: JsonValue },
    In { field: String, values: Vec<JsonValue> },
    IsNull { field: String },
    NotNull { field: String },
    Gt { field: String, value: JsonValue },
    Gte { field: String, value: JsonValue },
    Lt { field: String, value: JsonValue },
    Lte { field: String, value: JsonValue },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { not: Box<Predicate> },
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }

    pub fn not_null(field: impl Into<String>) -> Self {
        Self::NotNull {
            field: field.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any(preds: Vec<Predicate>) -> Self {
        Self::Or { any: preds }
    }

    pub fn negate(pred: Predicate) -> Self {
        Self::Not {
            not: Box::new(pred),
        }
    }

    /// Conjoin two predicates, flattening nested `And`s and dropping `All`.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And { all: mut a }, Predicate::And { all: b }) => {
                a.extend(b);
                Predicate::And { all: a }
            }
            (Predicate::And { all: mut a }, p) => {
                a.push(p);
                Predicate::And { all: a }
            }
            (p, Predicate::And { all: mut b }) => {
                b.insert(0, p);
                Predicate::And { all: b }
            }
            (a, b) => Predicate::And { all: vec![a, b] },
        }
    }

    /// Reject unsafe field names and non-scalar comparison values.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Predicate::All => Ok(()),
            Predicate::Eq { field, value }
            | Predicate::Ne { field, value }
            | Predicate::Gt { field, value }
            | Predicate::Gte { field, value }
            | Predicate::Lt { field, value }
            | Predicate::Lte { field, value } => {
                validate_field(field)?;
                validate_scalar(field, value)
            }
            Predicate::In { field, values } => {
                validate_field(field)?;
                values.iter().try_for_each(|v| validate_scalar(field, v))
            }
            Predicate::IsNull { field } | Predicate::NotNull { field } => validate_field(field),
            Predicate::And { all } => all.iter().try_for_each(Predicate::validate),
            Predicate::Or { any } => any.iter().try_for_each(Predicate::validate),
            Predicate::Not { not } => not.validate(),
        }
    }

    /// Evaluate against a JSON document (reference semantics for adapters).
    pub fn matches(&self, doc: &JsonValue) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq { field, value } => {
                compare_field(doc, field, value).is_some_and(|o| o == Ordering::Equal)
            }
            Predicate::Ne { field, value } => {
                compare_field(doc, field, value).is_some_and(|o| o != Ordering::Equal)
            }
            Predicate::In { field, values } => values
                .iter()
                .any(|v| compare_field(doc, field, v).is_some_and(|o| o == Ordering::Equal)),
            Predicate::IsNull { field } => lookup(doc, field).is_none_or(JsonValue::is_null),
            Predicate::NotNull { field } => lookup(doc, field).is_some_and(|v| !v.is_null()),
            Predicate::Gt { field, value } => {
                compare_field(doc, field, value).is_some_and(|o| o == Ordering::Greater)
            }
            Predicate::Gte { field, value } => {
                compare_field(doc, field, value).is_some_and(|o| o != Ordering::Less)
            }
            Predicate::Lt { field, value } => {
                compare_field(doc, field, value).is_some_and(|o| o == Ordering::Less)
            }
            Predicate::Lte { field, value } => {
                compare_field(doc, field, value).is_some_and(|o| o != Ordering::Greater)
            }
            Predicate::And { all } => all.iter().all(|p| p.matches(doc)),
            Predicate::Or { any } => any.iter().any(|p| p.matches(doc)),
            Predicate::Not { not } => !not.matches(doc),
        }
    }
}

/// Reject field names outside `[A-Za-z0-9_.]` or with empty segments.
pub fn validate_field(field: &str) -> DomainResult<()> {
    let ok = !field.is_empty()
        && !field.starts_with('.')
        && !field.ends_with('.')
        && !field.contains("..")
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(DomainError::validation(format!("invalid field name '{field}'")))
    }
}

fn validate_scalar(field: &str, value: &JsonValue) -> DomainResult<()> {
    match value {
        JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => Ok(()),
        JsonValue::Null => Err(DomainError::validation(format!(
            "comparison on '{field}' uses null; use is_null/not_null"
        ))),
        _ => Err(DomainError::validation(format!(
            "comparison on '{field}' must use a scalar value"
        ))),
    }
}

/// Resolve a dotted path inside a JSON document.
pub fn lookup<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(doc, |cur, key| cur.get(key))
}

fn compare_field(doc: &JsonValue, field: &str, value: &JsonValue) -> Option<Ordering> {
    let found = lookup(doc, field)?;
    if found.is_null() {
        return None;
    }
    Some(compare_scalars(found, value))
}

enum Rank {
    Null,
    Number(Num),
    Text(String),
}

/// Integers stay exact; only non-integral values go through `f64`.
#[derive(Clone, Copy)]
enum Num {
    Int(i128),
    Float(f64),
}

impl Num {
    fn of(n: &serde_json::Number) -> Self {
        match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Num::Int(i128::from(i)),
            (None, Some(u)) => Num::Int(i128::from(u)),
            _ => Num::Float(n.as_f64().unwrap_or(0.0)),
        }
    }

    fn cmp(self, other: Num) -> Ordering {
        match (self, other) {
            (Num::Int(x), Num::Int(y)) => x.cmp(&y),
            (Num::Int(x), Num::Float(y)) => (x as f64).partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Num::Float(x), Num::Int(y)) => x.partial_cmp(&(y as f64)).unwrap_or(Ordering::Equal),
            (Num::Float(x), Num::Float(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        }
    }
}

fn rank(v: &JsonValue) -> Rank {
    match v {
        JsonValue::Null => Rank::Null,
        JsonValue::Bool(b) => Rank::Number(Num::Int(i128::from(*b))),
        JsonValue::Number(n) => Rank::Number(Num::of(n)),
        JsonValue::String(s) => Rank::Text(s.clone()),
        other => Rank::Text(other.to_string()),
    }
}

/// Total order over JSON scalars shared by every adapter.
pub fn compare_scalars(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (rank(a), rank(b)) {
        (Rank::Null, Rank::Null) => Ordering::Equal,
        (Rank::Null, _) => Ordering::Less,
        (_, Rank::Null) => Ordering::Greater,
        (Rank::Number(x), Rank::Number(y)) => x.cmp(y),
        (Rank::Number(_), Rank::Text(_)) => Ordering::Less,
        (Rank::Text(_), Rank::Number(_)) => Ordering::Greater,
        (Rank::Text(x), Rank::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Compare two documents by an order list (reference semantics for adapters).
pub fn compare_documents(a: &JsonValue, b: &JsonValue, order: &[OrderBy]) -> Ordering {
    for key in order {
        let left = lookup(a, &key.field).unwrap_or(&JsonValue::Null);
        let right = lookup(b, &key.field).unwrap_or(&JsonValue::Null);
        let ord = compare_scalars(left, right);
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Caller-facing query descriptor (`where`/`relations`/`select`/`order`/`skip`/`take`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryDescriptor {
    #[serde(default, rename = "where")]
    pub filter: Predicate,
    #[serde(default)]
    pub relations: Vec<String>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub take: Option<i64>,
    /// Include soft-deleted rows.
    #[serde(default)]
    pub with_deleted: bool,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, pred: Predicate) -> Self {
        self.filter = pred;
        self
    }

    pub fn relations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn select<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }
}

/// Options for single-row reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FindOptions {
    #[serde(default)]
    pub relations: Vec<String>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub with_deleted: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }
}

/// How `take` is treated when sanitizing a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakePolicy {
    /// Paginated reads: default when absent, clamped to `[0, MAX_PAGE_SIZE]`.
    Clamped,
    /// Administrative reads: no limit unless given; negatives become 0.
    Unbounded,
}

/// The shape every storage adapter accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageQuery {
    pub filter: Predicate,
    pub order: Vec<OrderBy>,
    pub skip: u64,
    pub take: Option<u64>,
}

impl StorageQuery {
    /// Unpaged, default-ordered query for a filter.
    pub fn matching(filter: Predicate) -> Self {
        Self {
            filter,
            order: stable_order(Vec::new()),
            skip: 0,
            take: None,
        }
    }
}

/// Append the `created_at`, `id` tie-break so both adapters agree on order.
pub fn stable_order(mut order: Vec<OrderBy>) -> Vec<OrderBy> {
    for tie in [fields::CREATED_AT, fields::ID] {
        if !order.iter().any(|o| o.field == tie) {
            order.push(OrderBy::asc(tie));
        }
    }
    order
}

/// Clamp `skip`/`take` and validate the filter and ordering.
///
/// Relation and projection names are validated by the caller, which knows the
/// entity's declared relations.
pub fn sanitize(descriptor: &QueryDescriptor, policy: TakePolicy) -> DomainResult<StorageQuery> {
    descriptor.filter.validate()?;
    for o in &descriptor.order {
        validate_field(&o.field)?;
    }
    for s in &descriptor.select {
        validate_field(s)?;
    }

    let skip = descriptor.skip.unwrap_or(0).max(0) as u64;
    let take = match policy {
        TakePolicy::Clamped => Some(
            descriptor
                .take
                .map(|t| t.clamp(0, MAX_PAGE_SIZE as i64) as u64)
                .unwrap_or(DEFAULT_PAGE_SIZE),
        ),
        TakePolicy::Unbounded => descriptor.take.map(|t| t.max(0) as u64),
    };

    Ok(StorageQuery {
        filter: descriptor.filter.clone(),
        order: stable_order(descriptor.order.clone()),
        skip,
        take,
    })
}

/// A page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
        })
    }
}
