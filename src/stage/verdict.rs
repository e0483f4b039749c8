// src/stage/verdict.rs

//! Validator verdicts.
//!
//! A validator reports exactly `{"status": "success" | "failure",
//! "justification": "..."}`. Anything else is a decode error, which the stage
//! processor turns into a failed task.

use serde::Deserialize;
use thiserror::Error;

use crate::plan::builder::strip_code_fence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Success,
    Failure,
}

/// Accept/reject judgment on a task's raw output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub justification: String,
}

#[derive(Error, Debug)]
#[error("validator produced an invalid verdict: {0}")]
pub struct VerdictError(#[from] serde_json::Error);

impl Verdict {
    pub fn accept(justification: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Success,
            justification: justification.into(),
        }
    }

    pub fn reject(justification: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Failure,
            justification: justification.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == VerdictStatus::Success
    }

    /// Strictly decode a verdict, tolerating one surrounding code fence.
    pub fn decode(text: &str) -> Result<Self, VerdictError> {
        Ok(serde_json::from_str(strip_code_fence(text))?)
    }
}
