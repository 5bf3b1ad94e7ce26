use std::collections::HashMap;

use super::catalog::{ItemDetail, Summary};

/// Session-scoped memo tables for both fetch stages.
///
/// Nothing is ever evicted; the whole catalog is expected to fit in memory and
/// the tables are dropped wholesale when the binder is regenerated.
#[derive(Debug, Default)]
pub struct ItemCache {
    summaries: HashMap<u32, Summary>,
    details: HashMap<u32, ItemDetail>,
}

impl ItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self, id: u32) -> Option<&Summary> {
        self.summaries.get(&id)
    }

    pub fn put_summary(&mut self, id: u32, summary: Summary) {
        self.summaries.insert(id, summary);
    }

    pub fn has_summary(&self, id: u32) -> bool {
        self.summaries.contains_key(&id)
    }

    pub fn detail(&self, id: u32) -> Option<&ItemDetail> {
        self.details.get(&id)
    }

    pub fn put_detail(&mut self, id: u32, detail: ItemDetail) {
        self.details.insert(id, detail);
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.len()
    }

    pub fn clear(&mut self) {
        self.summaries.clear();
        self.details.clear();
    }
}
