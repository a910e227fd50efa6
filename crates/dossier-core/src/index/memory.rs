//! In-memory [`VectorIndex`] implementation for tests.
//!
//! Namespaced `Vec`s behind a `std::sync::RwLock`; similarity queries are a
//! brute-force cosine scan over the partition.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::Namespace;

use super::{IndexMatch, ScopeFilter, VectorIndex, VectorRecord};

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    partitions: RwLock<HashMap<Namespace, Vec<VectorRecord>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All vector ids currently stored in a namespace, for assertions.
    pub fn ids(&self, namespace: Namespace) -> Vec<String> {
        let partitions = self.partitions.read().unwrap();
        partitions
            .get(&namespace)
            .map(|records| records.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default()
    }
}

fn matches_filter(record: &VectorRecord, filter: &ScopeFilter) -> bool {
    if record.metadata.owner_id != filter.owner_id {
        return false;
    }
    if let Some(client_id) = &filter.client_id {
        if record.metadata.client_id.as_ref() != Some(client_id) {
            return false;
        }
    }
    if let Some(source_type) = filter.source_type {
        if record.metadata.source_type != source_type {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, namespace: Namespace, records: &[VectorRecord]) -> Result<usize> {
        let mut partitions = self.partitions.write().unwrap();
        let partition = partitions.entry(namespace).or_default();
        for record in records {
            partition.retain(|existing| existing.id != record.id);
            partition.push(record.clone());
        }
        Ok(records.len())
    }

    async fn delete(&self, namespace: Namespace, ids: &[String]) -> Result<()> {
        let mut partitions = self.partitions.write().unwrap();
        if let Some(partition) = partitions.get_mut(&namespace) {
            partition.retain(|record| !ids.contains(&record.id));
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        top_k: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<IndexMatch>> {
        let partitions = self.partitions.read().unwrap();
        let mut matches: Vec<IndexMatch> = partitions
            .get(&namespace)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches_filter(r, filter))
                    .map(|r| IndexMatch {
                        id: r.id.clone(),
                        score: cosine_similarity(vector, &r.vector),
                        metadata: r.metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }
}
