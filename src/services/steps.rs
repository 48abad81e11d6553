//! Step list with per-step status tracking.
//!
//! The board is replaced wholesale when a run starts or on reset. Every
//! reset or new run bumps `generation`; updates carrying an older
//! generation are dropped, so a run that was reset mid-flight cannot write
//! into the new board.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use crate::error::AppError;
use crate::models::{PriorFinding, StepAnalysis, StepResult, StepSpec, StepStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepEdit {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub generation: u64,
    pub running: bool,
    pub goal: Option<String>,
    pub steps: Vec<StepAnalysis>,
}

/// A step that has been moved to `analyzing` and is ready to execute.
#[derive(Debug, Clone)]
pub struct StepTicket {
    pub generation: u64,
    pub index: usize,
    pub spec: StepSpec,
}

#[derive(Debug, Default)]
pub struct StepBoard {
    steps: Vec<StepAnalysis>,
    goal: Option<String>,
    generation: u64,
    busy: Option<u64>,
}

impl StepBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy == Some(self.generation)
    }

    pub fn steps(&self) -> &[StepAnalysis] {
        &self.steps
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            generation: self.generation,
            running: self.is_busy(),
            goal: self.goal.clone(),
            steps: self.steps.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.steps.clear();
        self.goal = None;
        self.generation += 1;
        tracing::info!("Step board reset (generation {})", self.generation);
    }

    /// Replace the board with `plan`, all steps pending.
    pub fn begin_run(&mut self, plan: Vec<StepSpec>, goal: Option<String>) -> Result<u64, AppError> {
        if self.is_busy() {
            return Err(AppError::Conflict("An analysis is already running".to_string()));
        }
        if plan.is_empty() {
            return Err(AppError::InvalidInput("No analysis steps to run".to_string()));
        }
        if let Some(spec) = plan.iter().find(|s| s.title.trim().is_empty()) {
            return Err(AppError::InvalidInput(format!(
                "Step title must not be empty (description: {:?})", spec.description
            )));
        }

        self.generation += 1;
        self.goal = goal.map(|g| g.trim().to_string()).filter(|g| !g.is_empty());
        self.steps = plan.into_iter()
            .enumerate()
            .map(|(idx, spec)| StepAnalysis::pending(format!("step-{}", idx + 1), spec))
            .collect();
        self.busy = Some(self.generation);
        Ok(self.generation)
    }

    /// Apply `edit` to one step and move it to `analyzing`; the other steps
    /// keep their results.
    pub fn begin_rerun(&mut self, id: &str, edit: StepEdit) -> Result<StepTicket, AppError> {
        if self.is_busy() {
            return Err(AppError::Conflict("An analysis is already running".to_string()));
        }
        let index = self.steps.iter()
            .position(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Step {} not found", id)))?;

        if let Some(title) = &edit.title {
            if title.trim().is_empty() {
                return Err(AppError::InvalidInput("Step title must not be empty".to_string()));
            }
        }

        let step = &mut self.steps[index];
        if let Some(title) = edit.title {
            step.title = title.trim().to_string();
        }
        if let Some(description) = edit.description {
            step.description = description.trim().to_string();
        }
        step.status = StepStatus::Analyzing;
        step.result = None;
        step.error = None;
        step.started_at = Some(Utc::now());
        step.finished_at = None;

        self.busy = Some(self.generation);
        Ok(StepTicket {
            generation: self.generation,
            index,
            spec: step.spec(),
        })
    }

    /// Move a pending step to `analyzing`. `None` once the run is stale.
    pub fn mark_analyzing(&mut self, generation: u64, index: usize) -> Option<StepTicket> {
        if generation != self.generation {
            return None;
        }
        let step = self.steps.get_mut(index)?;
        step.status = StepStatus::Analyzing;
        step.started_at = Some(Utc::now());
        Some(StepTicket {
            generation,
            index,
            spec: step.spec(),
        })
    }

    /// Record a step outcome. Returns false when the update was stale.
    pub fn finish(&mut self, generation: u64, index: usize, outcome: Result<StepResult, String>) -> bool {
        if generation != self.generation {
            return false;
        }
        let Some(step) = self.steps.get_mut(index) else {
            return false;
        };
        step.finished_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                step.status = StepStatus::Done;
                step.result = Some(result);
                step.error = None;
            }
            Err(message) => {
                step.status = StepStatus::Error;
                step.result = None;
                step.error = Some(message);
            }
        }
        true
    }

    pub fn end_work(&mut self, generation: u64) {
        if self.busy == Some(generation) {
            self.busy = None;
        }
    }

    /// Fail whatever is still `analyzing` and release the board. Used when
    /// the worker stops without finishing its step.
    pub fn abandon(&mut self, generation: u64) {
        if generation == self.generation {
            for step in self.steps.iter_mut().filter(|s| s.status == StepStatus::Analyzing) {
                step.status = StepStatus::Error;
                step.error = Some("Analysis was interrupted".to_string());
                step.finished_at = Some(Utc::now());
            }
        }
        self.end_work(generation);
    }

    /// Results of finished steps that come before `index`.
    pub fn prior_findings(&self, index: usize) -> Vec<PriorFinding> {
        self.steps.iter()
            .take(index)
            .filter(|s| s.status == StepStatus::Done)
            .filter_map(|s| s.result.as_ref().map(|r| PriorFinding {
                title: s.title.clone(),
                summary: r.summary.clone(),
                insights: r.insights.clone(),
            }))
            .collect()
    }
}
