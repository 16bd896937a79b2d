use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    InvalidSubject,
    MalformedInput,
    MissingColumns,
}

impl RunStatus {
    /// HTTP-style status code.
    pub fn code(self) -> u16 {
        match self {
            RunStatus::Success => 200,
            RunStatus::InvalidSubject | RunStatus::MalformedInput | RunStatus::MissingColumns => {
                400
            }
        }
    }

    pub fn is_success(self) -> bool {
        self == RunStatus::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowOutcome {
    Written { path: PathBuf },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowReport {
    /// 1-based position in the roster, header excluded.
    pub row: usize,
    pub person: Option<String>,
    pub document: Option<String>,
    pub outcome: RowOutcome,
}

/// What a call to `Pipeline::process` hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub message: String,
    pub persons_processed: usize,
    pub rows: Vec<RowReport>,
}

impl RunOutcome {
    pub fn written(&self) -> impl Iterator<Item = &PathBuf> {
        self.rows.iter().filter_map(|r| match &r.outcome {
            RowOutcome::Written { path } => Some(path),
            _ => None,
        })
    }

    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary {
            rows_total: self.rows.len(),
            ..Default::default()
        };
        for r in &self.rows {
            match r.outcome {
                RowOutcome::Written { .. } => s.rows_written += 1,
                RowOutcome::Skipped { .. } => s.rows_skipped += 1,
                RowOutcome::Failed { .. } => s.rows_failed += 1,
            }
        }
        s
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub rows_total: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
}

/// On-disk form of a run, written next to the generated folders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub subject: String,
    pub status: RunStatus,
    pub code: u16,
    pub message: String,
    pub persons_processed: usize,
    pub summary: RunSummary,
    pub rows: Vec<RowReport>,
}

impl RunReport {
    pub fn new(run_id: &str, subject: &str, outcome: &RunOutcome) -> Self {
        Self {
            run_id: run_id.to_string(),
            subject: subject.to_string(),
            status: outcome.status,
            code: outcome.status.code(),
            message: outcome.message.clone(),
            persons_processed: outcome.persons_processed,
            summary: outcome.summary(),
            rows: outcome.rows.clone(),
        }
    }
}
