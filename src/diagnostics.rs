use std::sync::{Arc, Mutex};

use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum AnomalyKind {
    /// Non-finite values showed up in a strict subset of the per-trial
    /// probability vectors; the affected trials were zeroed.
    NonFiniteProbabilities,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnomalyRecord {
    pub kind: AnomalyKind,
    pub affected_trials: Vec<usize>,
    pub total_trials: usize,
}

/// Capability interface for routing anomaly reports out of the estimation
/// path. The estimator never logs or prints on its own.
pub trait DiagnosticSink {
    fn record(&mut self, record: AnomalyRecord);
}

/// Default sink: one warn-level tracing event per anomaly.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&mut self, record: AnomalyRecord) {
        tracing::warn!(
            affected = record.affected_trials.len(),
            trials = record.total_trials,
            "zeroed trials with non-finite target probabilities"
        );
    }
}

/// Buffering sink for callers that inspect anomalies after the call. Clones
/// share the same buffer, so a handle kept outside the estimator sees what
/// the estimator recorded.
#[derive(Clone, Default)]
pub struct CollectingSink {
    records: Arc<Mutex<Vec<AnomalyRecord>>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<AnomalyRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&mut self, record: AnomalyRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
