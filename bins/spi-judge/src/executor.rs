/// Condition Evaluation - High-Level Orchestration
///
/// **Responsibility:**
/// For one task and one condition kind: load the reference predicate, split
/// the tests, run reference and candidates, classify every candidate and
/// select the first one accepted by the base tests.
///
/// **Architecture:**
/// 1. Use a CodeEngine to load and call predicates (engine.rs)
/// 2. Use the partitioner to split the suite (partition.rs)
/// 3. Use the classifier to judge result vectors (evaluator.rs)
/// 4. Use the similarity scorer for edit distances (similarity.rs)
///
/// **Failure Policy:**
/// The reference is trusted input: if it cannot be loaded or crashes on any
/// test, the condition is abandoned and left unevaluated. A broken candidate
/// is an ordinary outcome and only earns a `failed` judgement.

use crate::config::EvaluatorConfig;
use crate::engine::{CallError, CodeEngine, EvalContext, LoadError};
use crate::evaluator::classify;
use crate::partition::{partition, SuitePartition};
use crate::similarity;
use spi_common::types::{
    Acceptance, ConditionEvaluation, ConditionKind, DistanceRecord, Judgement, ResultValue, Task,
    TestCase,
};
use tracing::{debug, error, info, instrument, warn};

const DUMMY_BODY: &str = "    raise RuntimeError(\"dummy function invoked!\")";

#[derive(Debug, thiserror::Error)]
enum ReferenceError {
    #[error("task has no {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("reference crashed on test {test}: {source}")]
    Call {
        test: String,
        #[source]
        source: CallError,
    },
}

/// Reference predicate together with its results on both suites
struct ReferenceRun {
    source: String,
    suites: SuitePartition<TestCase>,
    base_results: Vec<ResultValue>,
    validation_results: Vec<ResultValue>,
}

/// Verdicts for one candidate completion
#[derive(Debug, Clone, PartialEq)]
struct CandidateOutcome {
    base: Acceptance,
    full: Judgement,
    distance: DistanceRecord,
}

/// Indent every line that is not whitespace-only
pub fn indent_body(body: &str, prefix: &str) -> String {
    let mut indented = String::with_capacity(body.len() + prefix.len() * 4);
    for line in body.split_inclusive('\n') {
        if !line.trim().is_empty() {
            indented.push_str(prefix);
        }
        indented.push_str(line);
    }
    indented
}

/// Complete function definition: signature stub followed by the indented body
pub fn assemble_candidate(incomplete: &str, body: &str) -> String {
    format!("{}\n{}", incomplete, indent_body(body, "    "))
}

/// Definition with the candidate's signature whose body raises when invoked
pub fn assemble_dummy(incomplete: &str) -> String {
    format!("{}\n{}", incomplete, DUMMY_BODY)
}

/// Run the reference on a suite; any failure aborts
async fn run_reference_suite(
    engine: &dyn CodeEngine,
    ctx: &EvalContext,
    name: &str,
    suite: &[TestCase],
) -> Result<Vec<ResultValue>, ReferenceError> {
    let mut results = Vec::with_capacity(suite.len());
    for test in suite {
        let value = engine.call(ctx, name, test).await.map_err(|source| ReferenceError::Call {
            test: format!("{:?}", test),
            source,
        })?;
        results.push(value);
    }
    Ok(results)
}

/// Run a candidate on a suite; failing calls become `ResultValue::Failed`
async fn run_candidate_suite(
    engine: &dyn CodeEngine,
    ctx: &EvalContext,
    name: &str,
    suite: &[TestCase],
) -> Vec<ResultValue> {
    let mut results = Vec::with_capacity(suite.len());
    for test in suite {
        match engine.call(ctx, name, test).await {
            Ok(value) => results.push(value),
            Err(e) => {
                debug!(function = name, error = %e, "Candidate call failed");
                results.push(ResultValue::Failed);
            }
        }
    }
    results
}

async fn prepare_reference(
    task: &Task,
    kind: ConditionKind,
    engine: &dyn CodeEngine,
    config: &EvaluatorConfig,
) -> Result<(ReferenceRun, EvalContext), ReferenceError> {
    let spec = task.condition(kind);
    let source = spec.solution.ok_or(ReferenceError::MissingField("solution"))?;
    let tests = spec.tests.ok_or(ReferenceError::MissingField("tests"))?;

    let mut ctx = EvalContext::new();
    engine.load(&mut ctx, source).await?;

    let cases = engine.parse_suite(tests, &config.split_token).await?;
    let suites = partition(&cases, &TestCase::Sentinel, config.merge_second_suite_into_base);

    let name = task.solution_function_name(kind);
    let base_results = run_reference_suite(engine, &ctx, &name, &suites.base).await?;
    let validation_results = run_reference_suite(engine, &ctx, &name, &suites.validation).await?;

    info!(
        task_id = %task.task_id,
        condition = %kind,
        base_tests = suites.base.len(),
        validation_tests = suites.validation.len(),
        base = ?base_results,
        validation = ?validation_results,
        "Reference results"
    );

    Ok((
        ReferenceRun {
            source: source.to_string(),
            suites,
            base_results,
            validation_results,
        },
        ctx,
    ))
}

async fn evaluate_candidate(
    task: &Task,
    kind: ConditionKind,
    index: usize,
    body: &str,
    reference: &ReferenceRun,
    engine: &dyn CodeEngine,
) -> CandidateOutcome {
    let incomplete = task.condition(kind).incomplete.unwrap_or_default();
    let definition = assemble_candidate(incomplete, body);
    let dummy = assemble_dummy(incomplete);
    let distance = similarity::distance(&reference.source, &definition);

    // Dummy first: if the real definition fails to load, calls can only ever
    // reach the dummy, never an earlier candidate
    let mut ctx = EvalContext::new();
    let loaded = match engine.load(&mut ctx, &dummy).await {
        Ok(()) => engine.load(&mut ctx, &definition).await,
        Err(e) => Err(e),
    };
    if let Err(e) = loaded {
        warn!(
            task_id = %task.task_id,
            condition = %kind,
            candidate = index,
            error = %e,
            "Candidate definition could not be loaded"
        );
        return CandidateOutcome {
            base: Acceptance::NotAccepted,
            full: Judgement::Failed,
            distance,
        };
    }

    let name = task.candidate_function_name(kind);
    let base_results = run_candidate_suite(engine, &ctx, &name, &reference.suites.base).await;
    let validation_results =
        run_candidate_suite(engine, &ctx, &name, &reference.suites.validation).await;

    let base_verdict = classify(&reference.base_results, &base_results);
    let full = if reference.suites.validation.is_empty() {
        base_verdict
    } else {
        let expected: Vec<ResultValue> = reference
            .base_results
            .iter()
            .chain(reference.validation_results.iter())
            .cloned()
            .collect();
        let predicted: Vec<ResultValue> = base_results
            .iter()
            .chain(validation_results.iter())
            .cloned()
            .collect();
        classify(&expected, &predicted)
    };
    let base = Acceptance::from_judgement(base_verdict);

    debug!(
        task_id = %task.task_id,
        condition = %kind,
        candidate = index,
        base = ?base_results,
        validation = ?validation_results,
        base_verdict = %base,
        full_verdict = %full,
        "Candidate evaluated"
    );

    CandidateOutcome {
        base,
        full,
        distance,
    }
}

/// Fold candidate outcomes into the condition's annotations
fn summarize(outcomes: &[CandidateOutcome]) -> ConditionEvaluation {
    let eligible: Vec<&DistanceRecord> = outcomes
        .iter()
        .filter(|o| o.base.is_accepted() && o.full.is_unrejected())
        .map(|o| &o.distance)
        .collect();
    let (avrg_relative, avrg_size) = if eligible.is_empty() {
        (None, None)
    } else {
        let n = eligible.len() as f64;
        (
            Some(eligible.iter().map(|d| d.relative_distance).sum::<f64>() / n),
            Some(eligible.iter().map(|d| d.s2_len as f64).sum::<f64>() / n),
        )
    };

    let mut evaluation = ConditionEvaluation {
        base_evaluations: Some(outcomes.iter().map(|o| o.base).collect()),
        evaluations: Some(outcomes.iter().map(|o| o.full).collect()),
        edit_distances: Some(outcomes.iter().map(|o| o.distance).collect()),
        avrg_relative_edit_distance_of_unrejected: avrg_relative,
        avrg_size_of_unrejected: avrg_size,
        ..Default::default()
    };

    match outcomes.iter().position(|o| o.base.is_accepted()) {
        Some(winner) => {
            let outcome = &outcomes[winner];
            evaluation.base_evaluation = Some(Acceptance::Accepted);
            evaluation.evaluation = Some(Acceptance::from_judgement(outcome.full));
            evaluation.accepted_completion = Some(winner);
            evaluation.accepted_completion_edit_distance = Some(outcome.distance);
        }
        None => {
            evaluation.base_evaluation = Some(Acceptance::NotAccepted);
            evaluation.evaluation = Some(Acceptance::NotAccepted);
        }
    }

    evaluation
}

/// Evaluate every candidate completion of one condition of a task.
///
/// Returns the "not applicable" evaluation (all fields `None`) when the
/// condition is absent or its reference cannot be run.
#[instrument(skip_all, fields(task_id = %task.task_id, condition = %kind))]
pub async fn evaluate_condition(
    task: &Task,
    kind: ConditionKind,
    engine: &dyn CodeEngine,
    config: &EvaluatorConfig,
) -> ConditionEvaluation {
    let spec = task.condition(kind);
    if !spec.is_present() {
        return ConditionEvaluation::default();
    }

    let (reference, _reference_ctx) = match prepare_reference(task, kind, engine, config).await {
        Ok(prepared) => prepared,
        Err(e) => {
            error!(error = %e, "Reference predicate unusable; condition not evaluated");
            return ConditionEvaluation::default();
        }
    };

    let mut outcomes = Vec::with_capacity(spec.completions.len());
    for (index, body) in spec.completions.iter().enumerate() {
        outcomes.push(evaluate_candidate(task, kind, index, body, &reference, engine).await);
    }

    let evaluation = summarize(&outcomes);
    info!(
        candidates = outcomes.len(),
        base_test = ?evaluation.base_evaluation,
        all_test = ?evaluation.evaluation,
        accepted_index = ?evaluation.accepted_completion,
        "Condition evaluated"
    );
    evaluation
}

/// Evaluate pre- and post-conditions of every task, annotating them in place
pub async fn evaluate_tasks(tasks: &mut [Task], engine: &dyn CodeEngine, config: &EvaluatorConfig) {
    for task in tasks.iter_mut() {
        for kind in ConditionKind::ALL {
            let evaluation = evaluate_condition(task, kind, engine, config).await;
            *task.evaluation_mut(kind) = evaluation;
        }
    }
}
