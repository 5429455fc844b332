use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::coordinator::FetchSettings;
use crate::domain::{HttpMethod, Task};
use crate::error::CensusError;

pub const DEFAULT_CONFIG_FILE: &str = "trait-census.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub monitor_interval_secs: Option<u64>,
    #[serde(default)]
    pub collection_size: Option<u64>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
    #[serde(default)]
    pub range: Option<RangeEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TaskEntry {
    Shorthand(String),
    Detailed(TaskEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TaskEntryObject {
    pub id: u64,
    pub url: String,
}

/// Generates `{base_url}{id}{suffix}?{query}` for every id in `first..=last`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RangeEntry {
    pub base_url: String,
    pub first: u64,
    pub last: u64,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub settings: FetchSettings,
    pub collection_size: Option<u64>,
    pub tasks: Vec<Task>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&Utf8Path>) -> Result<ResolvedConfig, CensusError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(CensusError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CensusError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CensusError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CensusError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let defaults = FetchSettings::default();

        let worker_count = config.workers.unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            return Err(CensusError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        let timeout = match config.timeout_secs {
            Some(0) => {
                return Err(CensusError::InvalidConfig(
                    "timeout_secs must be at least 1".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.timeout,
        };
        let monitor_interval = match config.monitor_interval_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.monitor_interval,
        };

        let mut tasks = config
            .tasks
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let task = match entry {
                    TaskEntry::Shorthand(url) => Task::new(index as u64 + 1, url),
                    TaskEntry::Detailed(obj) => Task::new(obj.id, obj.url),
                };
                validate_url(&task.url)?;
                Ok(task)
            })
            .collect::<Result<Vec<_>, CensusError>>()?;
        if let Some(range) = &config.range {
            tasks.extend(range_tasks(range)?);
        }
        ensure_unique_ids(&tasks)?;

        Ok(ResolvedConfig {
            schema_version,
            settings: FetchSettings {
                method: config.method.unwrap_or(defaults.method),
                worker_count,
                timeout,
                monitor_interval,
            },
            collection_size: config.collection_size,
            tasks,
        })
    }
}

pub fn range_tasks(range: &RangeEntry) -> Result<Vec<Task>, CensusError> {
    if range.first > range.last {
        return Err(CensusError::InvalidConfig(format!(
            "range first ({}) is greater than last ({})",
            range.first, range.last
        )));
    }
    let suffix = range.suffix.as_deref().unwrap_or(".json");
    (range.first..=range.last)
        .map(|id| {
            let raw = format!("{}{id}{suffix}", range.base_url);
            let mut url = Url::parse(&raw).map_err(|err| CensusError::InvalidUrl {
                url: raw.clone(),
                message: err.to_string(),
            })?;
            if !range.query.is_empty() {
                url.query_pairs_mut().extend_pairs(&range.query);
            }
            Ok(Task::new(id, url.to_string()))
        })
        .collect()
}

fn validate_url(url: &str) -> Result<(), CensusError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|err| CensusError::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        })
}

fn ensure_unique_ids(tasks: &[Task]) -> Result<(), CensusError> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.id) {
            return Err(CensusError::DuplicateTaskId(task.id.get()));
        }
    }
    Ok(())
}
