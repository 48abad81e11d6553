//! Serial execution of analysis steps.
//!
//! Runs are spawned onto the runtime so they survive the request that
//! started them. The workspace lock is only taken between model calls.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use crate::AppState;
use crate::error::AppError;
use crate::models::{ColumnBucket, PriorFinding, StepResult, StepSpec};
use crate::services::context::DataContext;
use crate::services::llm_agent::{StepAnalyzer, StepRequest};
use crate::services::steps::StepEdit;

const MAX_COLUMNS_IN_TITLE: usize = 5;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisRequest {
    pub goal: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub wait: bool,
}

/// Releases the board when the worker exits, including by panic.
struct WorkGuard {
    state: Arc<AppState>,
    generation: u64,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.state.workspace.lock().board.abandon(self.generation);
    }
}

fn quote_columns(columns: &[String]) -> String {
    let mut quoted: Vec<String> = columns.iter()
        .take(MAX_COLUMNS_IN_TITLE)
        .map(|c| format!("\"{}\"", c))
        .collect();
    if columns.len() > MAX_COLUMNS_IN_TITLE {
        quoted.push(format!("{} more", columns.len() - MAX_COLUMNS_IN_TITLE));
    }
    quoted.join(", ")
}

/// Steps to run when the client does not supply its own, picked from the
/// column buckets present in the selection.
pub fn default_plan(context: &DataContext) -> Vec<StepSpec> {
    let time = context.bucket_columns(ColumnBucket::Time);
    let numeric = context.bucket_columns(ColumnBucket::Numeric);
    let category = context.bucket_columns(ColumnBucket::Category);
    let content = context.bucket_columns(ColumnBucket::Content);

    let mut plan = vec![StepSpec::new(
        "Data overview",
        "Describe what the selected sheets contain: their size, the meaning of the main columns, \
         and data quality issues such as missing values or duplicates.",
    )];

    if !time.is_empty() && !numeric.is_empty() {
        plan.push(StepSpec::new(
            "Trends over time",
            format!(
                "Analyze how {} evolve over {}. Point out growth, decline, seasonality and anomalies.",
                quote_columns(&numeric),
                quote_columns(&time)
            ),
        ));
    }
    if !category.is_empty() {
        let measure = if numeric.is_empty() {
            "by number of rows".to_string()
        } else {
            format!("using {}", quote_columns(&numeric))
        };
        plan.push(StepSpec::new(
            "Category breakdown",
            format!("Compare the groups defined by {} {}.", quote_columns(&category), measure),
        ));
    }
    if !numeric.is_empty() {
        plan.push(StepSpec::new(
            "Numeric distribution",
            format!(
                "Describe the distribution, typical ranges and outliers of {}.",
                quote_columns(&numeric)
            ),
        ));
    }
    if !content.is_empty() {
        plan.push(StepSpec::new(
            "Text content themes",
            format!(
                "Summarize recurring themes and overall sentiment in {}.",
                quote_columns(&content)
            ),
        ));
    }

    plan.push(StepSpec::new(
        "Key takeaways",
        "Combine the earlier findings into the most important conclusions and suggest next steps.",
    ));
    plan
}

async fn execute_step(
    analyzer: &dyn StepAnalyzer,
    spec: &StepSpec,
    context: &DataContext,
    prior: &[PriorFinding],
    goal: Option<&str>,
) -> Result<StepResult, String> {
    let start = Instant::now();
    let request = StepRequest {
        step: spec,
        context,
        prior,
        goal,
    };

    match analyzer.analyze_step(request).await {
        Ok(result) => {
            tracing::info!("Step '{}' done in {:?}", spec.title, start.elapsed());
            Ok(result)
        }
        Err(e) => {
            tracing::warn!("Step '{}' failed after {:?}: {}", spec.title, start.elapsed(), e);
            Err(e.to_string())
        }
    }
}

/// Replace the board with a new plan and run it step by step in the
/// background. Fails if nothing is selected or a run is already active.
pub fn start_analysis(state: &Arc<AppState>, request: AnalysisRequest) -> Result<JoinHandle<()>, AppError> {
    let (generation, context, goal) = {
        let mut workspace = state.workspace.lock();
        let context = DataContext::from_workspace(&workspace, state.config.sample_rows)?;
        let plan = if request.steps.is_empty() {
            default_plan(&context)
        } else {
            request.steps
        };
        let step_count = plan.len();
        let generation = workspace.board.begin_run(plan, request.goal)?;
        tracing::info!(
            "Starting analysis run {} with {} steps over {} sheets",
            generation,
            step_count,
            context.sheets.len()
        );
        (generation, context, workspace.board.goal().map(String::from))
    };

    let state = Arc::clone(state);
    Ok(tokio::spawn(run_steps(state, generation, context, goal)))
}

async fn run_steps(state: Arc<AppState>, generation: u64, context: DataContext, goal: Option<String>) {
    let start = Instant::now();
    let guard = WorkGuard {
        state: Arc::clone(&state),
        generation,
    };
    let step_count = state.workspace.lock().board.steps().len();

    for index in 0..step_count {
        let (ticket, prior) = {
            let mut workspace = state.workspace.lock();
            match workspace.board.mark_analyzing(generation, index) {
                Some(ticket) => {
                    let prior = workspace.board.prior_findings(index);
                    (ticket, prior)
                }
                None => {
                    tracing::info!("Run {} was reset, stopping", generation);
                    return;
                }
            }
        };

        let outcome = execute_step(
            state.analyzer.as_ref(),
            &ticket.spec,
            &context,
            &prior,
            goal.as_deref(),
        ).await;

        if !state.workspace.lock().board.finish(generation, index, outcome) {
            tracing::info!("Run {} was reset, discarding result of step {}", generation, index + 1);
            return;
        }
    }

    drop(guard);
    tracing::info!("Analysis run {} finished in {:?}", generation, start.elapsed());
}

/// Re-execute one step with edited parameters. Results of the other steps
/// stay as they are; finished steps before it are passed along as context.
pub fn start_rerun(state: &Arc<AppState>, id: &str, edit: StepEdit) -> Result<JoinHandle<()>, AppError> {
    let (ticket, prior, context, goal) = {
        let mut workspace = state.workspace.lock();
        let context = DataContext::from_workspace(&workspace, state.config.sample_rows)?;
        let ticket = workspace.board.begin_rerun(id, edit)?;
        let prior = workspace.board.prior_findings(ticket.index);
        let goal = workspace.board.goal().map(String::from);
        (ticket, prior, context, goal)
    };
    tracing::info!("Re-running step {} ('{}')", id, ticket.spec.title);

    let state = Arc::clone(state);
    Ok(tokio::spawn(async move {
        let _guard = WorkGuard {
            state: Arc::clone(&state),
            generation: ticket.generation,
        };
        let outcome = execute_step(
            state.analyzer.as_ref(),
            &ticket.spec,
            &context,
            &prior,
            goal.as_deref(),
        ).await;
        state.workspace.lock().board.finish(ticket.generation, ticket.index, outcome);
    }))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::StepStatus;
    use crate::services::workspace::tests::sales_file;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;

    /// Answers every step with a canned result, failing the titles it is told to.
    #[derive(Default)]
    pub struct ScriptedAnalyzer {
        pub fail_titles: Vec<String>,
        pub panic_titles: Vec<String>,
        /// (step title, number of prior findings, goal)
        pub calls: Mutex<Vec<(String, usize, Option<String>)>>,
    }

    impl StepAnalyzer for ScriptedAnalyzer {
        fn analyze_step<'a>(&'a self, request: StepRequest<'a>) -> BoxFuture<'a, Result<StepResult, AppError>> {
            Box::pin(async move {
                let title = request.step.title.clone();
                self.calls.lock().push((
                    title.clone(),
                    request.prior.len(),
                    request.goal.map(String::from),
                ));
                if self.panic_titles.contains(&title) {
                    panic!("analyzer crashed on {}", title);
                }
                if self.fail_titles.contains(&title) {
                    return Err(AppError::LlmError(format!("{} failed", title)));
                }
                Ok(StepResult {
                    summary: format!("{} summary", title),
                    insights: vec![format!("{} insight", title)],
                    charts: vec![],
                })
            })
        }
    }

    pub fn state_with(analyzer: ScriptedAnalyzer) -> (Arc<AppState>, Arc<ScriptedAnalyzer>) {
        let analyzer = Arc::new(analyzer);
        let state = Arc::new(AppState::new(Config::default(), analyzer.clone()));
        state.workspace.lock().add_file(sales_file());
        (state, analyzer)
    }

    fn custom_plan() -> Vec<StepSpec> {
        vec![
            StepSpec::new("A", "first"),
            StepSpec::new("B", "second"),
            StepSpec::new("C", "third"),
        ]
    }

    fn statuses(state: &AppState) -> Vec<StepStatus> {
        state.workspace.lock().board.steps().iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_default_plan_follows_buckets() {
        let mut workspace = crate::services::workspace::Workspace::new();
        workspace.add_file(sales_file());
        let context = DataContext::from_workspace(&workspace, 5).unwrap();

        let titles: Vec<String> = default_plan(&context).into_iter().map(|s| s.title).collect();
        assert_eq!(
            titles,
            [
                "Data overview",
                "Trends over time",
                "Category breakdown",
                "Numeric distribution",
                "Text content themes",
                "Key takeaways",
            ]
        );

        // Targets alone has no time or category columns
        workspace.set_file_selection(0, &[1]).unwrap();
        let context = DataContext::from_workspace(&workspace, 5).unwrap();
        let plan = default_plan(&context);
        assert!(plan.iter().all(|s| s.title != "Trends over time"));
        assert!(plan.iter().all(|s| s.title != "Category breakdown"));
    }

    #[test]
    fn test_quote_columns_caps_the_list() {
        let columns: Vec<String> = (1..=7).map(|i| format!("c{}", i)).collect();
        assert_eq!(quote_columns(&columns), "\"c1\", \"c2\", \"c3\", \"c4\", \"c5\", 2 more");
    }

    #[tokio::test]
    async fn test_run_is_serial_and_continues_after_error() {
        let (state, analyzer) = state_with(ScriptedAnalyzer {
            fail_titles: vec!["B".to_string()],
            ..Default::default()
        });

        let request = AnalysisRequest {
            goal: Some("Why do sales drop?".to_string()),
            steps: custom_plan(),
            wait: true,
        };
        start_analysis(&state, request).unwrap().await.unwrap();

        assert_eq!(statuses(&state), vec![StepStatus::Done, StepStatus::Error, StepStatus::Done]);
        let calls = analyzer.calls.lock().clone();
        let order: Vec<&str> = calls.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(order, ["A", "B", "C"]);
        // C only sees A's result, B failed
        assert_eq!(calls[2].1, 1);
        assert_eq!(calls[0].2.as_deref(), Some("Why do sales drop?"));

        let workspace = state.workspace.lock();
        assert!(!workspace.board.is_busy());
        assert_eq!(workspace.board.steps()[1].error.as_deref(), Some("LLM error: B failed"));
    }

    #[tokio::test]
    async fn test_no_selection_is_rejected() {
        let (state, _) = state_with(ScriptedAnalyzer::default());
        state.workspace.lock().selection.clear();
        let result = start_analysis(&state, AnalysisRequest::default());
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(state.workspace.lock().board.steps().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_conflicts_while_first_is_active() {
        let (state, _) = state_with(ScriptedAnalyzer::default());
        let handle = start_analysis(&state, AnalysisRequest::default()).unwrap();
        // the spawned task has not been polled yet on this single-threaded runtime
        let second = start_analysis(&state, AnalysisRequest::default());
        assert!(matches!(second, Err(AppError::Conflict(_))));
        tokio_test::assert_ok!(handle.await);
        tokio_test::assert_ok!(start_analysis(&state, AnalysisRequest::default()));
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_run() {
        let (state, analyzer) = state_with(ScriptedAnalyzer::default());
        let handle = start_analysis(&state, AnalysisRequest::default()).unwrap();
        state.workspace.lock().board.reset();
        handle.await.unwrap();

        assert!(state.workspace.lock().board.steps().is_empty());
        assert!(analyzer.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_single_step_keeps_other_results() {
        let (state, analyzer) = state_with(ScriptedAnalyzer::default());
        let request = AnalysisRequest {
            goal: Some("Regional performance".to_string()),
            steps: custom_plan(),
            wait: true,
        };
        start_analysis(&state, request).unwrap().await.unwrap();

        let edit = StepEdit {
            title: Some("B revised".to_string()),
            description: Some("focus on the South".to_string()),
        };
        start_rerun(&state, "step-2", edit).unwrap().await.unwrap();

        let workspace = state.workspace.lock();
        let steps = workspace.board.steps();
        assert_eq!(steps[1].title, "B revised");
        assert_eq!(steps[1].status, StepStatus::Done);
        assert_eq!(steps[1].result.as_ref().unwrap().summary, "B revised summary");
        assert_eq!(steps[0].result.as_ref().unwrap().summary, "A summary");
        assert_eq!(steps[2].result.as_ref().unwrap().summary, "C summary");

        let calls = analyzer.calls.lock();
        assert_eq!(calls.len(), 4);
        let last = calls.last().unwrap();
        assert_eq!(last.0, "B revised");
        assert_eq!(last.1, 1);
        assert_eq!(last.2.as_deref(), Some("Regional performance"));
    }

    #[tokio::test]
    async fn test_rerun_unknown_step() {
        let (state, _) = state_with(ScriptedAnalyzer::default());
        let result = start_rerun(&state, "step-1", StepEdit::default());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_panicking_step_releases_the_board() {
        let (state, _) = state_with(ScriptedAnalyzer {
            panic_titles: vec!["B".to_string()],
            ..Default::default()
        });
        let request = AnalysisRequest {
            steps: custom_plan(),
            ..Default::default()
        };
        tokio_test::assert_err!(start_analysis(&state, request).unwrap().await);

        assert_eq!(statuses(&state), vec![StepStatus::Done, StepStatus::Error, StepStatus::Pending]);
        assert!(!state.workspace.lock().board.is_busy());
    }
}
