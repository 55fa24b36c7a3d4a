//! Query and update descriptions understood by every `DocumentStore`.
//!
//! Field names are dotted paths into the serialized record
//! (e.g. `lifecycle.paused_at`).

use serde::Serialize;
use serde_json::Value;

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ============================================================================
// FILTER
// ============================================================================

/// A single predicate on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    /// Field is absent or null
    IsNull,
    NotNull,
}

impl Condition {
    pub fn matches(&self, field: Option<&Value>) -> bool {
        let field = field.unwrap_or(&Value::Null);
        match self {
            Condition::Eq(v) => field == v,
            Condition::Ne(v) => field != v,
            Condition::In(vs) => vs.iter().any(|v| v == field),
            Condition::IsNull => field.is_null(),
            Condition::NotNull => !field.is_null(),
        }
    }
}

/// Conjunction of field predicates. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.conditions
            .push((field.into(), Condition::Eq(to_value(value))));
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.conditions
            .push((field.into(), Condition::Ne(to_value(value))));
        self
    }

    pub fn is_in<T: Serialize>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        let values = values.into_iter().map(to_value).collect();
        self.conditions.push((field.into(), Condition::In(values)));
        self
    }

    pub fn is_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push((field.into(), Condition::IsNull));
        self
    }

    pub fn not_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push((field.into(), Condition::NotNull));
        self
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    /// Equality conditions, used to seed a document on upsert.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().filter_map(|(f, c)| match c {
            Condition::Eq(v) => Some((f.as_str(), v)),
            _ => None,
        })
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, cond)| cond.matches(get_path(doc, field)))
    }
}

// ============================================================================
// SORT / FIND OPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Sort and limit for `find_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// A `$set`-style partial update. Fields not named are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.set.push((field.into(), to_value(value)));
        self
    }

    /// Set every top-level field of a serialized record.
    pub fn from_document(doc: &Value) -> Self {
        let set = match doc {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Vec::new(),
        };
        Self { set }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.set
    }

    /// Apply to a document. Returns whether anything changed.
    pub fn apply(&self, doc: &mut Value) -> bool {
        let mut changed = false;
        for (field, value) in &self.set {
            if get_path(doc, field) != Some(value) {
                set_path(doc, field, value.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Result of an update or upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

// ============================================================================
// PATH HELPERS
// ============================================================================

/// Read a dotted path from a document.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

/// Write a dotted path, creating intermediate objects as needed.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}
