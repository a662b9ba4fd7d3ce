//! Run stages and progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orchestrator::RunStatus;

/// Stages of one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStage {
    /// Validating the request.
    Init,
    /// Gathering domain context.
    Enriching,
    /// Requesting a batch from the model.
    Generating,
    /// Validating, scoring and deduplicating a batch.
    Validating,
    /// Choosing to continue, succeed or fail.
    Deciding,
    /// Target reached.
    Succeeded,
    /// Run ended short of its target.
    Failed,
}

impl RunStage {
    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Succeeded | RunStage::Failed)
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStage::Init => write!(f, "Init"),
            RunStage::Enriching => write!(f, "Enriching"),
            RunStage::Generating => write!(f, "Generating"),
            RunStage::Validating => write!(f, "Validating"),
            RunStage::Deciding => write!(f, "Deciding"),
            RunStage::Succeeded => write!(f, "Succeeded"),
            RunStage::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// A stage has started.
    StageStarted {
        run_id: Uuid,
        stage: RunStage,
        timestamp: DateTime<Utc>,
    },
    /// Enrichment failed; the run continues on the built-in overview.
    EnrichmentDegraded {
        run_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A batch has been fully processed.
    BatchCompleted {
        run_id: Uuid,
        /// 1-based batch number.
        batch: u32,
        /// Records accepted from this batch.
        accepted: usize,
        /// Records accepted so far.
        total: usize,
        /// Records wanted.
        target: usize,
        timestamp: DateTime<Utc>,
    },
    /// A batch yielded nothing because the model call failed.
    BatchFailed {
        run_id: Uuid,
        batch: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// The run reached a terminal state.
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
        accepted: usize,
        target: usize,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Creates a StageStarted event.
    pub fn stage_started(run_id: Uuid, stage: RunStage) -> Self {
        Self::StageStarted {
            run_id,
            stage,
            timestamp: Utc::now(),
        }
    }

    /// Creates an EnrichmentDegraded event.
    pub fn enrichment_degraded(run_id: Uuid, reason: impl Into<String>) -> Self {
        Self::EnrichmentDegraded {
            run_id,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a BatchCompleted event.
    pub fn batch_completed(
        run_id: Uuid,
        batch: u32,
        accepted: usize,
        total: usize,
        target: usize,
    ) -> Self {
        Self::BatchCompleted {
            run_id,
            batch,
            accepted,
            total,
            target,
            timestamp: Utc::now(),
        }
    }

    /// Creates a BatchFailed event.
    pub fn batch_failed(run_id: Uuid, batch: u32, reason: impl Into<String>) -> Self {
        Self::BatchFailed {
            run_id,
            batch,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a RunFinished event.
    pub fn run_finished(run_id: Uuid, status: RunStatus, accepted: usize, target: usize) -> Self {
        Self::RunFinished {
            run_id,
            status,
            accepted,
            target,
            timestamp: Utc::now(),
        }
    }

    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::StageStarted { run_id, .. }
            | Self::EnrichmentDegraded { run_id, .. }
            | Self::BatchCompleted { run_id, .. }
            | Self::BatchFailed { run_id, .. }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(RunStage::Succeeded.is_terminal());
        assert!(RunStage::Failed.is_terminal());
        assert!(!RunStage::Deciding.is_terminal());
    }

    #[test]
    fn test_event_constructors_carry_run_id() {
        let run_id = Uuid::new_v4();
        let event = PipelineEvent::batch_completed(run_id, 2, 5, 12, 20);
        assert_eq!(event.run_id(), run_id);
        match event {
            PipelineEvent::BatchCompleted { batch, total, .. } => {
                assert_eq!(batch, 2);
                assert_eq!(total, 12);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_event_serializes() {
        let event = PipelineEvent::stage_started(Uuid::nil(), RunStage::Enriching);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StageStarted"));
        assert!(json.contains("Enriching"));
    }
}
