//! VID-keyed metadata records.

use std::collections::BTreeMap;

use crate::models::{MetadataRecord, Vid};

/// Mapping from vector identifier to the record describing that vector.
///
/// Only [`VectorStore`](crate::services::VectorStore) mutates this, so the
/// key set always equals the vector index's VID set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    records: BTreeMap<Vid, MetadataRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, vid: Vid, record: MetadataRecord) {
        self.records.insert(vid, record);
    }

    pub fn get(&self, vid: Vid) -> Option<&MetadataRecord> {
        self.records.get(&vid)
    }

    pub fn remove(&mut self, vid: Vid) -> Option<MetadataRecord> {
        self.records.remove(&vid)
    }

    /// All records in ascending VID order.
    pub fn all(&self) -> impl Iterator<Item = (Vid, &MetadataRecord)> {
        self.records.iter().map(|(vid, record)| (*vid, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// VIDs whose record belongs to `paper_id`.
    pub fn vids_for_paper(&self, paper_id: i64) -> Vec<Vid> {
        self.all()
            .filter(|(_, record)| record.paper_id == paper_id)
            .map(|(vid, _)| vid)
            .collect()
    }

    /// Rekey records after a compacting rebuild. Records absent from `remap` are dropped.
    pub fn remap(&mut self, remap: &[(Vid, Vid)]) {
        let mut records = std::mem::take(&mut self.records);
        self.records = remap
            .iter()
            .filter_map(|(old, new)| records.remove(old).map(|record| (*new, record)))
            .collect();
    }

    pub fn into_map(self) -> BTreeMap<Vid, MetadataRecord> {
        self.records
    }
}

impl From<BTreeMap<Vid, MetadataRecord>> for MetadataStore {
    fn from(records: BTreeMap<Vid, MetadataRecord>) -> Self {
        Self { records }
    }
}
