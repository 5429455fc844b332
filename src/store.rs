use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{AttributePair, AttributeValue, Record};

/// trait -> value -> number of records carrying that exact pair.
pub type Occurrences = BTreeMap<String, BTreeMap<AttributeValue, u64>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only list of fetched records, in completion order.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Mutex<Vec<Record>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: Record) {
        lock(&self.records).push(record);
    }

    pub fn records(&self) -> Vec<Record> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frequency table of (trait, value) pairs. Counts only ever grow.
#[derive(Debug, Default)]
pub struct OccurrenceTable {
    counts: Mutex<HashMap<String, HashMap<AttributeValue, u64>>>,
}

impl OccurrenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, trait_type: &str, value: &AttributeValue) {
        let mut counts = lock(&self.counts);
        bump(&mut counts, trait_type, value);
    }

    /// Counts every pair of one record under a single lock acquisition.
    pub fn record(&self, attributes: &[AttributePair]) {
        let mut counts = lock(&self.counts);
        for pair in attributes {
            bump(&mut counts, &pair.trait_type, &pair.value);
        }
    }

    pub fn count(&self, trait_type: &str, value: &AttributeValue) -> u64 {
        lock(&self.counts)
            .get(trait_type)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.counts).is_empty()
    }

    /// Sorted copy of the table.
    pub fn snapshot(&self) -> Occurrences {
        lock(&self.counts)
            .iter()
            .map(|(trait_type, values)| {
                let values = values
                    .iter()
                    .map(|(value, count)| (value.clone(), *count))
                    .collect();
                (trait_type.clone(), values)
            })
            .collect()
    }
}

fn bump(
    counts: &mut HashMap<String, HashMap<AttributeValue, u64>>,
    trait_type: &str,
    value: &AttributeValue,
) {
    *counts
        .entry(trait_type.to_string())
        .or_default()
        .entry(value.clone())
        .or_insert(0) += 1;
}
