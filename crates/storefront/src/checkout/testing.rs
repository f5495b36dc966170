//! Scripted [`KnowledgeStore`] for checkout unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::store::results::{RdfTerm, TermKind};
use crate::store::sparql::XSD;
use crate::store::{KnowledgeStore, Row, SelectQuery, Solutions, StoreError, UpdateRequest, Vocabulary};

/// Answers SELECT queries by operation name and records every request.
///
/// Each operation has a queue of answers; the last answer repeats. Operations
/// with no script answer with no rows.
#[derive(Default)]
pub struct ScriptedStore {
    answers: Mutex<HashMap<&'static str, VecDeque<Result<Solutions, StoreError>>>>,
    update_failures: Mutex<VecDeque<StoreError>>,
    selects: Mutex<Vec<(&'static str, String)>>,
    updates: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_select(self, operation: &'static str, solutions: Solutions) -> Self {
        self.push(operation, Ok(solutions));
        self
    }

    pub fn on_select_error(self, operation: &'static str, err: StoreError) -> Self {
        self.push(operation, Err(err));
        self
    }

    pub fn fail_next_update(self, err: StoreError) -> Self {
        self.update_failures.lock().unwrap().push_back(err);
        self
    }

    fn push(&self, operation: &'static str, answer: Result<Solutions, StoreError>) {
        self.answers
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(answer);
    }

    /// Text of every SELECT sent, in order.
    pub fn selects(&self) -> Vec<String> {
        self.selects
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Operation names of every SELECT sent, in order.
    pub fn select_operations(&self) -> Vec<&'static str> {
        self.selects.lock().unwrap().iter().map(|(op, _)| *op).collect()
    }

    /// Text of every update sent, in order.
    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }
}

impl KnowledgeStore for ScriptedStore {
    async fn select(&self, query: &SelectQuery) -> Result<Solutions, StoreError> {
        self.selects
            .lock()
            .unwrap()
            .push((query.operation(), query.as_str().to_string()));

        let mut answers = self.answers.lock().unwrap();
        let Some(queue) = answers.get_mut(query.operation()) else {
            return Ok(Solutions::default());
        };
        if queue.len() == 1
            && let Some(Ok(solutions)) = queue.front()
        {
            return Ok(solutions.clone());
        }
        queue.pop_front().unwrap_or_else(|| Ok(Solutions::default()))
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        self.updates.lock().unwrap().push(request.as_str().to_string());
        match self.update_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn uri(value: &str) -> RdfTerm {
    RdfTerm {
        kind: TermKind::Uri,
        value: value.to_string(),
        datatype: None,
        lang: None,
    }
}

pub fn typed(value: &str, xsd_type: &str) -> RdfTerm {
    RdfTerm {
        kind: TermKind::Literal,
        value: value.to_string(),
        datatype: Some(format!("{XSD}{xsd_type}")),
        lang: None,
    }
}

pub fn row(pairs: Vec<(&str, RdfTerm)>) -> Row {
    Row(pairs
        .into_iter()
        .map(|(var, term)| (var.to_string(), term))
        .collect())
}

pub fn solutions(rows: Vec<Row>) -> Solutions {
    Solutions {
        vars: Vec::new(),
        rows,
    }
}

/// A `ProductStock` row for product `{base}{id}`.
pub fn stock_row(vocab: &Vocabulary, id: &str, stock: i64, available: bool) -> Row {
    row(vec![
        ("product", uri(vocab.base.join(id).unwrap().as_str())),
        ("productId", typed(id, "string")),
        ("stock", typed(&stock.to_string(), "integer")),
        ("available", typed(&available.to_string(), "boolean")),
    ])
}

/// A `FindCustomer` row for user `{base}{username}`.
pub fn customer_row(vocab: &Vocabulary, username: &str) -> Row {
    row(vec![("user", uri(vocab.base.join(username).unwrap().as_str()))])
}

/// One `OrderCodes` or `OrderItemIds` row per code.
pub fn code_rows(var: &str, codes: &[&str]) -> Solutions {
    solutions(
        codes
            .iter()
            .map(|code| row(vec![(var, typed(code, "string"))]))
            .collect(),
    )
}
