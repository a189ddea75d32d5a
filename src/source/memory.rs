//! In-memory record source
//!
//! Holds documents sorted by `_id` and answers page requests the way the
//! database would: keyset on `_id`, archive and mode clauses, top-level
//! equality filters. Useful for embedding applications that already hold their
//! records, and for exercising the pipeline without a server.

use std::cmp::Ordering;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::QueryError;
use crate::schema::ID_FIELD;

use super::{PageRequest, RecordSource};

/// Record source over a fixed set of documents
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    records: Vec<Document>,
    fetches: AtomicUsize,
    /// Every cursor key requests were made after, in call order
    cursors: Mutex<Vec<Option<Bson>>>,
}

impl MemoryRecordSource {
    /// Create a source over `records`
    ///
    /// Records without a comparable `_id` are rejected.
    pub fn new(mut records: Vec<Document>) -> Result<Self, QueryError> {
        for record in &records {
            match record.get(ID_FIELD) {
                Some(key) if is_orderable(key) => {}
                _ => return Err(QueryError::MissingKey(format!("{record}"))),
            }
        }
        records.sort_by(|a, b| compare_keys(id_of(a), id_of(b)));

        Ok(Self {
            records,
            fetches: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
        })
    }

    /// Number of `fetch_page` calls served
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }

    /// Cursor keys of every request served, in order
    pub fn requested_cursors(&self) -> Vec<Option<Bson>> {
        self.cursors.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Document>, QueryError> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        if let Ok(mut cursors) = self.cursors.lock() {
            cursors.push(request.after.last_key().cloned());
        }

        let page = self
            .records
            .iter()
            .filter(|record| match request.after.last_key() {
                Some(last) => compare_keys(id_of(record), last) == Ordering::Greater,
                None => true,
            })
            .filter(|record| request.archived.matches(record))
            .filter(|record| request.mode.matches(record))
            .filter(|record| matches_filters(record, &request.filters))
            .take(request.limit)
            .cloned()
            .collect();

        Ok(page)
    }
}

fn id_of(record: &Document) -> &Bson {
    record.get(ID_FIELD).unwrap_or(&Bson::Null)
}

fn is_orderable(key: &Bson) -> bool {
    matches!(
        key,
        Bson::String(_) | Bson::ObjectId(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)
    )
}

/// Order keys the way the database sorts them: numbers, then strings, then
/// object ids
fn compare_keys(a: &Bson, b: &Bson) -> Ordering {
    fn rank(key: &Bson) -> u8 {
        match key {
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 0,
            Bson::String(_) => 1,
            Bson::ObjectId(_) => 2,
            _ => 3,
        }
    }

    fn number(key: &Bson) -> f64 {
        match key {
            Bson::Int32(n) => f64::from(*n),
            Bson::Int64(n) => *n as f64,
            Bson::Double(f) => *f,
            _ => 0.0,
        }
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ if rank(a) == 0 && rank(b) == 0 => number(a).total_cmp(&number(b)),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Top-level equality match; operator documents are not interpreted
fn matches_filters(record: &Document, filters: &Document) -> bool {
    filters
        .iter()
        .all(|(field, expected)| record.get(field) == Some(expected))
}
