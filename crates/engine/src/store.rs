use std::collections::HashMap;

use crate::model::ReconResult;

/// Opaque handle to a stored run.
pub type RunId = String;

/// Where finished results live. The engine returns values and never
/// touches shared state; callers inject whatever store they want
/// (in-memory below, a database in a service).
pub trait ResultStore {
    fn put(&mut self, result: ReconResult) -> RunId;
    fn get(&self, id: &str) -> Option<&ReconResult>;
    fn remove(&mut self, id: &str) -> Option<ReconResult>;
}

/// In-memory store keyed by random UUID run ids.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    runs: HashMap<RunId, ReconResult>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl ResultStore for MemoryResultStore {
    fn put(&mut self, result: ReconResult) -> RunId {
        let id = uuid::Uuid::new_v4().to_string();
        self.runs.insert(id.clone(), result);
        id
    }

    fn get(&self, id: &str) -> Option<&ReconResult> {
        self.runs.get(id)
    }

    fn remove(&mut self, id: &str) -> Option<ReconResult> {
        self.runs.remove(id)
    }
}
