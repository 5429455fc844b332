//! One-call entry points: build an HTTP client, run one batch, return a view.

use crate::aggregate::Rarity;
use crate::client::MetadataHttpClient;
use crate::coordinator::{Batch, Coordinator, FetchSettings};
use crate::domain::{AttributePair, Task};
use crate::error::CensusError;
use crate::store::Occurrences;

pub fn fetch_batch(tasks: Vec<Task>, settings: &FetchSettings) -> Result<Batch, CensusError> {
    let client = MetadataHttpClient::with_timeout(settings.timeout)?;
    Ok(Coordinator::new(client, settings.clone()).run_batch(tasks))
}

pub fn fetch_attributes(
    tasks: Vec<Task>,
    settings: &FetchSettings,
) -> Result<Vec<Vec<AttributePair>>, CensusError> {
    Ok(fetch_batch(tasks, settings)?.responses())
}

pub fn fetch_occurrences(
    tasks: Vec<Task>,
    settings: &FetchSettings,
) -> Result<Occurrences, CensusError> {
    Ok(fetch_batch(tasks, settings)?.occurrence())
}

pub fn fetch_rarity(
    tasks: Vec<Task>,
    collection_size: u64,
    settings: &FetchSettings,
) -> Result<Rarity, CensusError> {
    Ok(fetch_batch(tasks, settings)?.rarity(collection_size))
}
