//! Non-persistent collection kept in a hash map.
//!
//! Queries rank every record by cosine similarity, which is fine for tests and
//! small throwaway indexes.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{Collection, QueryResult, Record};
use crate::{RagError, Result};

#[derive(Debug, Default)]
pub struct MemoryCollection {
    records: HashMap<String, Record>,
    dimension: Option<usize>,
}

impl MemoryCollection {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        match self.dimension {
            Some(dimension) if dimension != len => Err(RagError::Store(format!(
                "Vector dimension mismatch: collection has {}, got {}",
                dimension, len
            ))),
            _ => Ok(()),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn upsert(&mut self, records: Vec<Record>) -> Result<()> {
        for record in &records {
            self.check_dimension(record.vector.len())?;
            if self.dimension.is_none() {
                self.dimension = Some(record.vector.len());
            }
        }

        for record in records {
            self.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn nearest(&self, vector: &[f32], limit: usize) -> Result<QueryResult> {
        if self.records.is_empty() {
            return Ok(QueryResult::default());
        }
        self.check_dimension(vector.len())?;

        let mut scored: Vec<(f32, &Record)> = self
            .records
            .values()
            .map(|record| (cosine_similarity(vector, &record.vector), record))
            .collect();
        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b.total_cmp(score_a).then_with(|| a.id.cmp(&b.id))
        });

        let mut result = QueryResult::default();
        for (_, record) in scored.into_iter().take(limit) {
            result.documents.push(record.document.clone());
            result.metadatas.push(record.metadata.clone());
        }
        Ok(result)
    }

    async fn remove(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.records.remove(id);
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}
