use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::FeatureError;

const EQUALS: &str = "=";

/// One `[field, operator, value]` term of a search domain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

impl FilterTerm {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: EQUALS.to_owned(),
            value: value.into(),
        }
    }

    pub fn to_domain(&self) -> Value {
        json!([self.field, self.operator, self.value])
    }
}

#[async_trait]
pub trait QueryService: Send + Sync {
    async fn search_read(
        &self,
        model: &str,
        filter: &[FilterTerm],
        fields: &[&str],
    ) -> Result<Vec<Value>, FeatureError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub model: String,
    pub filter: Vec<FilterTerm>,
    pub fields: Vec<String>,
}

/// In-memory query service holding records per model.
///
/// Supports equality terms only; other operators never match.
#[derive(Debug, Default)]
pub struct MockQueryService {
    state: Mutex<MockQueryState>,
}

#[derive(Debug, Default)]
struct MockQueryState {
    records: HashMap<String, Vec<Value>>,
    calls: Vec<SearchCall>,
    failure: Option<String>,
}

impl MockQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_record(&self, model: &str, record: Value) {
        self.lock()
            .records
            .entry(model.to_owned())
            .or_default()
            .push(record);
    }

    pub fn clear_records(&self, model: &str) {
        self.lock().records.remove(model);
    }

    /// Makes every following search fail with `message` until cleared with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        self.lock().failure = message.map(str::to_owned);
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockQueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn search_read(
        &self,
        model: &str,
        filter: &[FilterTerm],
        fields: &[&str],
    ) -> Result<Vec<Value>, FeatureError> {
        let mut state = self.lock();
        state.calls.push(SearchCall {
            model: model.to_owned(),
            filter: filter.to_vec(),
            fields: fields.iter().map(|field| (*field).to_owned()).collect(),
        });

        if let Some(message) = &state.failure {
            return Err(FeatureError::Query(message.clone()));
        }

        let records = state
            .records
            .get(model)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| filter.iter().all(|term| term_matches(term, record)))
                    .map(|record| project(record, fields))
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }
}

fn term_matches(term: &FilterTerm, record: &Value) -> bool {
    term.operator == EQUALS && record.get(&term.field) == Some(&term.value)
}

fn project(record: &Value, fields: &[&str]) -> Value {
    let projected: Map<String, Value> = fields
        .iter()
        .filter_map(|field| {
            record
                .get(*field)
                .map(|value| ((*field).to_owned(), value.clone()))
        })
        .collect();
    Value::Object(projected)
}
