#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream;
use reqwest::StatusCode;
use rusty_enrich::config::PipelineSettings;
use rusty_enrich::enrichment::Enricher;
use rusty_enrich::inference::InferenceError;
use rusty_enrich::store::{
    BulkWriteReport, Document, DocumentId, DocumentStore, DocumentStream, EligibilityFilter,
    FieldUpdate, ScanQuery, StoreError,
};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const INPUT_FIELD: &str = "content";
pub const TARGET_FIELD: &str = "msbm_llm_summary";

/// Document store held in memory, with scripted scan expiry and write failures.
#[derive(Default)]
pub struct InMemoryStore {
    documents: Mutex<BTreeMap<DocumentId, Map<String, Value>>>,
    expire_after: Mutex<VecDeque<usize>>,
    opened: Mutex<Vec<Option<DocumentId>>>,
    bulk_calls: Mutex<Vec<usize>>,
    failing_writes: AtomicUsize,
    count_unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Store with documents `1..=count`, each carrying `content`.
    pub fn with_articles(count: u64) -> Self {
        let store = Self::default();
        for id in 1..=count {
            store.insert(id, json!({ "content": format!("article {id}") }));
        }
        store
    }

    pub fn insert(&self, id: u64, payload: Value) {
        let payload = payload.as_object().cloned().unwrap_or_default();
        self.documents
            .lock()
            .expect("lock")
            .insert(DocumentId::Num(id), payload);
    }

    /// Expire successive scans after yielding the given number of documents.
    pub fn expire_scans_after(&self, counts: &[usize]) {
        self.expire_after.lock().expect("lock").extend(counts);
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn make_count_unavailable(&self) {
        self.count_unavailable.store(true, Ordering::SeqCst);
    }

    pub fn field(&self, id: u64, field: &str) -> Option<Value> {
        self.documents
            .lock()
            .expect("lock")
            .get(&DocumentId::Num(id))
            .and_then(|payload| payload.get(field).cloned())
    }

    pub fn enriched_ids(&self) -> Vec<u64> {
        self.documents
            .lock()
            .expect("lock")
            .iter()
            .filter(|(_, payload)| payload.contains_key(TARGET_FIELD))
            .filter_map(|(id, _)| match id {
                DocumentId::Num(id) => Some(*id),
                DocumentId::Uuid(_) => None,
            })
            .collect()
    }

    /// Sizes of every bulk write attempted, including failed ones.
    pub fn bulk_calls(&self) -> Vec<usize> {
        self.bulk_calls.lock().expect("lock").clone()
    }

    /// `exclude_up_to` of every scan opened.
    pub fn opened_scans(&self) -> Vec<Option<DocumentId>> {
        self.opened.lock().expect("lock").clone()
    }

    fn unavailable() -> StoreError {
        StoreError::UnexpectedStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "store offline".into(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn scan(&self, query: ScanQuery) -> DocumentStream<'_> {
        self.opened
            .lock()
            .expect("lock")
            .push(query.exclude_up_to.clone());

        let mut items = self
            .documents
            .lock()
            .expect("lock")
            .iter()
            .filter(|(id, _)| query.exclude_up_to.as_ref().is_none_or(|floor| *id > floor))
            .map(|(id, payload)| Document {
                id: id.clone(),
                payload: payload.clone(),
            })
            .filter(|document| query.filter.matches(document))
            .map(Ok)
            .collect::<Vec<_>>();

        if let Some(limit) = self.expire_after.lock().expect("lock").pop_front() {
            items.truncate(limit);
            items.push(Err(StoreError::ScanInvalidated {
                elapsed: query.max_scan_duration,
            }));
        }
        Box::pin(stream::iter(items))
    }

    async fn count_matching(&self, filter: &EligibilityFilter) -> Result<u64, StoreError> {
        if self.count_unavailable.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let documents = self.documents.lock().expect("lock");
        let count = documents
            .iter()
            .filter(|(id, payload)| {
                filter.matches(&Document {
                    id: (*id).clone(),
                    payload: (*payload).clone(),
                })
            })
            .count();
        Ok(count as u64)
    }

    async fn bulk_upsert(&self, updates: Vec<FieldUpdate>) -> Result<BulkWriteReport, StoreError> {
        self.bulk_calls.lock().expect("lock").push(updates.len());
        let pending_failures = self.failing_writes.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_writes
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(Self::unavailable());
        }

        let mut documents = self.documents.lock().expect("lock");
        let mut modified_count = 0;
        for update in updates {
            if let Some(payload) = documents.get_mut(&update.id) {
                payload.insert(update.field, update.value);
                modified_count += 1;
            }
        }
        Ok(BulkWriteReport {
            modified_count,
            errors: Vec::new(),
        })
    }
}

/// Enricher returning `summary of <input>` unless a fault is scripted for that input.
#[derive(Default)]
pub struct ScriptedEnricher {
    faults: Mutex<HashMap<String, VecDeque<InferenceError>>>,
    calls: Mutex<Vec<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedEnricher {
    /// Fail the next `times` calls for `input` with faults built by `fault`.
    pub fn fail(&self, input: &str, times: usize, fault: impl Fn() -> InferenceError) {
        let mut faults = self.faults.lock().expect("lock");
        let queue = faults.entry(input.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(fault());
        }
    }

    /// Cancel `token` once `calls` invocations have completed.
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        *self.cancel_after.lock().expect("lock") = Some((calls, token));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn calls_for(&self, input: &str) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| *call == input)
            .count()
    }
}

#[async_trait]
impl Enricher for ScriptedEnricher {
    fn name(&self) -> &str {
        "scripted"
    }

    fn input_field(&self) -> &str {
        INPUT_FIELD
    }

    fn target_field(&self) -> &str {
        TARGET_FIELD
    }

    async fn enrich(&self, input: &str) -> Result<Value, InferenceError> {
        let call_count = {
            let mut calls = self.calls.lock().expect("lock");
            calls.push(input.to_string());
            calls.len()
        };
        if let Some((limit, token)) = &*self.cancel_after.lock().expect("lock")
            && call_count >= *limit
        {
            token.cancel();
        }

        let scripted = self
            .faults
            .lock()
            .expect("lock")
            .get_mut(input)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(fault) => Err(fault),
            None => Ok(Value::String(format!("summary of {input}"))),
        }
    }
}

/// Settings with millisecond backoff so retry paths finish quickly.
pub fn fast_settings(batch_flush_size: usize) -> PipelineSettings {
    PipelineSettings {
        max_retries: 4,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_jitter: Duration::ZERO,
        batch_flush_size,
        ..PipelineSettings::default()
    }
}
