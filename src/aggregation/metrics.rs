//! Round-indexed loss and accuracy series.
//!
//! The store is owned by the caller and passed to each evaluation round.
//! Series are append-only and strictly ordered by round number.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{FedAggError, Result};

/// Which series a figure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Headline figures from the evaluate step
    Global,
    /// Figures clients measured on their training split
    Train,
    /// Figures clients measured on their held-out split
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u64,
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundSeries {
    records: Vec<RoundRecord>,
}

impl RoundSeries {
    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&RoundRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn losses(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.loss).collect()
    }

    pub fn accuracies(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.accuracy).collect()
    }

    fn push(&mut self, record: RoundRecord) -> Result<()> {
        if let Some(last) = self.last() {
            if record.round <= last.round {
                return Err(FedAggError::RoundOutOfOrder {
                    round: record.round,
                    last: last.round,
                });
            }
        }
        self.records.push(record);
        Ok(())
    }
}

/// Global, train and test series for a whole training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsStore {
    global: RoundSeries,
    train: RoundSeries,
    test: RoundSeries,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self, phase: Phase) -> &RoundSeries {
        match phase {
            Phase::Global => &self.global,
            Phase::Train => &self.train,
            Phase::Test => &self.test,
        }
    }

    pub fn global(&self) -> &RoundSeries {
        &self.global
    }

    pub fn train(&self) -> &RoundSeries {
        &self.train
    }

    pub fn test(&self) -> &RoundSeries {
        &self.test
    }

    /// Highest round recorded in any series
    pub fn last_round(&self) -> Option<u64> {
        [&self.global, &self.train, &self.test]
            .iter()
            .filter_map(|s| s.last().map(|r| r.round))
            .max()
    }

    /// Fail unless `round` comes after every recorded round.
    pub fn check_round(&self, round: u64) -> Result<()> {
        match self.last_round() {
            Some(last) if round <= last => Err(FedAggError::RoundOutOfOrder { round, last }),
            _ => Ok(()),
        }
    }

    /// Append one figure to a series.
    pub fn append(&mut self, phase: Phase, round: u64, loss: f64, accuracy: f64) -> Result<()> {
        let series = match phase {
            Phase::Global => &mut self.global,
            Phase::Train => &mut self.train,
            Phase::Test => &mut self.test,
        };
        series.push(RoundRecord {
            round,
            loss,
            accuracy,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Export for the reporting step.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_json()?)?;
        info!(
            rounds = self.global.len(),
            "Metrics written to {}",
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}
