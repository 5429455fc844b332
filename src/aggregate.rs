//! Derived views over a finished batch.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::coordinator::Batch;
use crate::domain::{AttributePair, TaskId};
use crate::store::Occurrences;

/// Rarity scores keyed by task id, ascending.
///
/// Records without attributes have no defined score; their ids are listed in
/// `skipped` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rarity {
    pub scores: BTreeMap<TaskId, f64>,
    pub skipped: Vec<TaskId>,
}

impl Batch {
    /// Attribute lists of every fetched record, in completion order.
    pub fn responses(&self) -> Vec<Vec<AttributePair>> {
        self.results()
            .records()
            .into_iter()
            .map(|record| record.attributes)
            .collect()
    }

    pub fn occurrence(&self) -> Occurrences {
        self.occurrences().snapshot()
    }

    /// `collection_size / attribute count` for each record. Ids are unique
    /// within a batch, since `Coordinator::run` drops repeated ones.
    pub fn rarity(&self, collection_size: u64) -> Rarity {
        let mut rarity = Rarity::default();
        for record in self.results().records() {
            if record.attributes.is_empty() {
                tracing::warn!(task_id = %record.id, "record has no attributes, skipping rarity");
                rarity.skipped.push(record.id);
                continue;
            }
            let score = collection_size as f64 / record.attributes.len() as f64;
            rarity.scores.insert(record.id, score);
        }
        rarity.skipped.sort();
        rarity
    }

    /// Sum of `records / occurrences` over each attribute of a record, so
    /// values shared by few records weigh more.
    pub fn trait_rarity(&self) -> Rarity {
        let records = self.results().records();
        let total = records.len() as f64;
        let mut rarity = Rarity::default();
        for record in records {
            if record.attributes.is_empty() {
                rarity.skipped.push(record.id);
                continue;
            }
            let score: f64 = record
                .attributes
                .iter()
                .map(|pair| {
                    let seen = self.occurrences().count(&pair.trait_type, &pair.value);
                    total / seen.max(1) as f64
                })
                .sum();
            rarity.scores.insert(record.id, score);
        }
        rarity.skipped.sort();
        rarity
    }
}
