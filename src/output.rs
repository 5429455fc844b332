use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::aggregate::Rarity;
use crate::coordinator::BatchReport;
use crate::domain::AttributePair;
use crate::error::CensusError;
use crate::store::Occurrences;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

/// JSON object keys must be strings, so values are keyed by their display
/// form. `"1"` and `1` fold into one key with their counts summed.
pub fn occurrence_json(occurrences: &Occurrences) -> BTreeMap<String, BTreeMap<String, u64>> {
    occurrences
        .iter()
        .map(|(trait_type, values)| {
            let mut keyed = BTreeMap::new();
            for (value, count) in values {
                *keyed.entry(value.to_string()).or_insert(0) += count;
            }
            (trait_type.clone(), keyed)
        })
        .collect()
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_attributes(responses: &[Vec<AttributePair>]) -> Result<(), CensusError> {
        Self::print_json(&responses)
    }

    pub fn print_occurrence(occurrences: &Occurrences) -> Result<(), CensusError> {
        Self::print_json(&occurrence_json(occurrences))
    }

    pub fn print_rarity(rarity: &Rarity) -> Result<(), CensusError> {
        Self::print_json(rarity)
    }

    pub fn print_report(report: &BatchReport) -> Result<(), CensusError> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CensusError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| CensusError::Output(err.to_string()))?;
        write_stdout(&json)
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_attributes(responses: &[Vec<AttributePair>]) -> Result<(), CensusError> {
        let mut out = String::new();
        for (index, attributes) in responses.iter().enumerate() {
            let line = attributes
                .iter()
                .map(|pair| format!("{}={}", pair.trait_type, pair.value))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{:>5}  {line}\n", index + 1));
        }
        write_stdout(out.trim_end())
    }

    pub fn print_occurrence(occurrences: &Occurrences) -> Result<(), CensusError> {
        let mut out = String::new();
        for (trait_type, values) in occurrences {
            out.push_str(&format!("{trait_type}\n"));
            for (value, count) in values {
                out.push_str(&format!("  {:<32} {count}\n", value.to_string()));
            }
        }
        write_stdout(out.trim_end())
    }

    pub fn print_rarity(rarity: &Rarity) -> Result<(), CensusError> {
        let mut out = String::new();
        for (id, score) in &rarity.scores {
            out.push_str(&format!("{id:>8}  {score:.4}\n"));
        }
        if !rarity.skipped.is_empty() {
            let skipped = rarity
                .skipped
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("skipped (no attributes): {skipped}\n"));
        }
        write_stdout(out.trim_end())
    }

    pub fn print_report(report: &BatchReport) -> Result<(), CensusError> {
        let mut out = format!(
            "{} {} task(s) with {} worker(s): {} succeeded, {} failed\n",
            report.method,
            report.submitted,
            report.workers,
            report.succeeded,
            report.failure_count()
        );
        for failed in &report.failed {
            out.push_str(&format!("  #{} {}: {}\n", failed.id, failed.url, failed.reason));
        }
        for duplicate in &report.duplicates {
            out.push_str(&format!("  duplicate {duplicate}\n"));
        }
        let elapsed = report.finished_at - report.started_at;
        out.push_str(&format!(
            "started {} finished {} ({} ms)",
            report.started_at.to_rfc3339(),
            report.finished_at.to_rfc3339(),
            elapsed.num_milliseconds()
        ));
        write_stdout(&out)
    }
}

fn write_stdout(text: &str) -> Result<(), CensusError> {
    let mut stdout = io::stdout();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .map_err(|err| CensusError::Output(err.to_string()))
}
