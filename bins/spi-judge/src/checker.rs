/// Dataset Checker - Self-Consistency of Reference Material
///
/// Runs every reference predicate on its own test suite (group sentinels
/// dropped) and, when a task carries a reference program, checks that the
/// program's output satisfies the post-condition on every post-condition
/// test whose inputs pass the pre-condition.
///
/// A post-condition test case is `(output, *inputs)`; the program is called
/// once with the inputs and, in the same request, the post-condition with the
/// program's own output in place of the recorded one.

use crate::config::EvaluatorConfig;
use crate::engine::{CodeEngine, EvalContext};
use spi_common::types::{ConditionKind, ResultValue, Task, TestCase};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionCheck {
    Absent,
    Passed { results: Vec<ResultValue> },
    Broken { reason: String },
}

impl ConditionCheck {
    pub fn is_broken(&self) -> bool {
        matches!(self, ConditionCheck::Broken { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramVerdict {
    RejectedByPrecondition,
    Checked { output: ResultValue, holds: bool },
}

impl ProgramVerdict {
    pub fn passes(&self) -> bool {
        match self {
            ProgramVerdict::RejectedByPrecondition => true,
            ProgramVerdict::Checked { holds, .. } => *holds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramCheck {
    NotApplicable,
    Ran { verdicts: Vec<ProgramVerdict> },
    Broken { reason: String },
}

impl ProgramCheck {
    pub fn passes(&self) -> bool {
        match self {
            ProgramCheck::NotApplicable => true,
            ProgramCheck::Ran { verdicts } => verdicts.iter().all(ProgramVerdict::passes),
            ProgramCheck::Broken { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskCheck {
    pub task_id: String,
    pub pre: ConditionCheck,
    pub post: ConditionCheck,
    pub program: ProgramCheck,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub tasks: Vec<TaskCheck>,
}

impl CheckReport {
    pub fn broken_references(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.pre.is_broken() || t.post.is_broken())
            .count()
    }

    pub fn all_programs_pass(&self) -> bool {
        self.tasks.iter().all(|t| t.program.passes())
    }

    pub fn is_clean(&self) -> bool {
        self.broken_references() == 0 && self.all_programs_pass()
    }

    pub fn print(&self) {
        println!("🔍 Checked {} tasks", self.tasks.len());
        for task in &self.tasks {
            println!("** Task {}:", task.task_id);
            for (kind, check) in [(ConditionKind::Pre, &task.pre), (ConditionKind::Post, &task.post)] {
                match check {
                    ConditionCheck::Absent => println!("   {}-cond: none given", kind),
                    ConditionCheck::Passed { results } => {
                        let shown: Vec<String> = results.iter().map(ToString::to_string).collect();
                        println!("   {}-cond test results: [{}]", kind, shown.join(", "));
                    }
                    ConditionCheck::Broken { reason } => println!("   ❌ {}-cond broken: {}", kind, reason),
                }
            }
            match &task.program {
                ProgramCheck::NotApplicable => {}
                ProgramCheck::Ran { verdicts } => {
                    let passed = verdicts.iter().filter(|v| v.passes()).count();
                    println!("   program checks passed: {}/{}", passed, verdicts.len());
                }
                ProgramCheck::Broken { reason } => println!("   ❌ program check broken: {}", reason),
            }
        }
        println!("** Broken reference conditions: {}", self.broken_references());
        println!("** All program checks passed: {}", self.all_programs_pass());
    }
}

/// Inputs of a post-condition test case `(output, *inputs)`
fn inputs_literal(case: &str) -> String {
    format!("tuple(({})[1:])", case)
}

/// Load a reference into `ctx` and run it on its tests. Returns the loaded
/// test literals alongside the verdict.
async fn check_condition(
    task: &Task,
    kind: ConditionKind,
    engine: &dyn CodeEngine,
    config: &EvaluatorConfig,
    ctx: &mut EvalContext,
) -> (ConditionCheck, Vec<String>) {
    let spec = task.condition(kind);
    let Some(solution) = spec.solution.filter(|s| !s.is_empty()) else {
        return (ConditionCheck::Absent, Vec::new());
    };
    let broken = |reason: String| (ConditionCheck::Broken { reason }, Vec::new());

    if let Err(e) = engine.load(ctx, solution).await {
        return broken(e.to_string());
    }
    let Some(tests) = spec.tests else {
        return broken("no tests given".to_string());
    };
    let cases: Vec<String> = match engine.parse_suite(tests, &config.split_token).await {
        Ok(cases) => cases
            .into_iter()
            .filter_map(|case| match case {
                TestCase::Args(literal) => Some(literal),
                TestCase::Sentinel => None,
            })
            .collect(),
        Err(e) => return broken(e.to_string()),
    };

    let name = task.solution_function_name(kind);
    let mut results = Vec::with_capacity(cases.len());
    for case in &cases {
        match engine.call(ctx, &name, &TestCase::args(case.as_str())).await {
            Ok(value) => results.push(value),
            Err(e) => return broken(format!("crashing test {}: {}", case, e)),
        }
    }
    (ConditionCheck::Passed { results }, cases)
}

async fn check_program(
    task: &Task,
    engine: &dyn CodeEngine,
    ctx: &mut EvalContext,
    post_cases: &[String],
    gate_on_precondition: bool,
) -> ProgramCheck {
    let Some(program) = task.program.as_deref().filter(|p| !p.is_empty()) else {
        return ProgramCheck::NotApplicable;
    };
    if let Err(e) = engine.load(ctx, program).await {
        return ProgramCheck::Broken { reason: e.to_string() };
    }

    let program_name = task.program_function_name();
    let pre_name = task.solution_function_name(ConditionKind::Pre);
    let post_name = task.solution_function_name(ConditionKind::Post);

    let mut verdicts = Vec::with_capacity(post_cases.len());
    for case in post_cases {
        let inputs = TestCase::args(inputs_literal(case));
        if gate_on_precondition {
            match engine.call(ctx, &pre_name, &inputs).await {
                Ok(value) if value.is_truthy() => {}
                Ok(_) => {
                    verdicts.push(ProgramVerdict::RejectedByPrecondition);
                    continue;
                }
                Err(e) => return ProgramCheck::Broken { reason: e.to_string() },
            }
        }
        let chained = engine
            .call_chained(ctx, &program_name, &post_name, &inputs)
            .await;
        let (output, holds) = match chained {
            Ok((output, verdict)) => (output, verdict.is_truthy()),
            Err(e) => return ProgramCheck::Broken { reason: e.to_string() },
        };
        if !holds {
            warn!(task_id = %task.task_id, case = %case, output = %output, "Program output violates post-condition");
        }
        verdicts.push(ProgramVerdict::Checked { output, holds });
    }
    ProgramCheck::Ran { verdicts }
}

#[instrument(skip_all, fields(task_id = %task.task_id))]
pub async fn check_task(task: &Task, engine: &dyn CodeEngine, config: &EvaluatorConfig) -> TaskCheck {
    let mut ctx = EvalContext::new();
    let (pre, _) = check_condition(task, ConditionKind::Pre, engine, config, &mut ctx).await;
    let (post, post_cases) = check_condition(task, ConditionKind::Post, engine, config, &mut ctx).await;

    let program = match (&pre, &post) {
        (ConditionCheck::Broken { .. }, _) | (_, ConditionCheck::Broken { .. }) | (_, ConditionCheck::Absent) => {
            ProgramCheck::NotApplicable
        }
        _ => {
            let gate = matches!(pre, ConditionCheck::Passed { .. });
            check_program(task, engine, &mut ctx, &post_cases, gate).await
        }
    };

    TaskCheck {
        task_id: task.task_id.clone(),
        pre,
        post,
        program,
    }
}

pub async fn check_dataset(tasks: &[Task], engine: &dyn CodeEngine, config: &EvaluatorConfig) -> CheckReport {
    info!(tasks = tasks.len(), "Checking dataset");
    let mut report = CheckReport::default();
    for task in tasks {
        report.tasks.push(check_task(task, engine, config).await);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEngine;
    use spi_common::types::ResultValue::Bool;

    /// Integers of the innermost tuple literal, `((8, 4))[1:]` -> [8, 4]
    fn innermost(lit: &str) -> Vec<i64> {
        let start = lit.rfind("((").map_or(0, |i| i + 2);
        let rest = &lit[start..];
        let end = rest.find(')').unwrap_or(rest.len());
        rest[..end]
            .split(',')
            .filter_map(|n| n.trim().parse().ok())
            .collect()
    }

    /// Producer output in front of a chained call, `(4,) + ...` -> 4
    fn chained_output(lit: &str) -> Option<i64> {
        let (head, _) = lit.strip_prefix('(')?.split_once(",) + ")?;
        head.trim().parse().ok()
    }

    /// Post-condition tests are `(2 * x, x)`; the program is wrong for
    /// negative inputs and the pre-condition excludes them
    fn engine() -> FakeEngine {
        FakeEngine::new()
            .with("pre_ref(", |lit| {
                let x = *innermost(lit).last()?;
                Some(Bool(x > 0))
            })
            .with("post_ref(", |lit| {
                let values = innermost(lit);
                let x = *values.last()?;
                let result = chained_output(lit).unwrap_or(values[0]);
                Some(Bool(result == 2 * x))
            })
            .with("program_ref(", |lit| {
                let x = *innermost(lit).last()?;
                let y = if x >= 0 { 2 * x } else { 0 };
                Some(ResultValue::other(y.to_string(), y != 0, None))
            })
    }

    fn task() -> Task {
        Task {
            task_id: "1".to_string(),
            program: Some("def Pr_1(x): return program_ref(x)".to_string()),
            pre_condition: Some("x > 0".to_string()),
            pre_condition_solution: Some("def check_pre_solution_1(x): return pre_ref(x)".to_string()),
            pre_condition_tests: Some("((1))|((-1))".to_string()),
            post_condition: Some("result is twice x".to_string()),
            post_condition_solution: Some("def check_post_solution_1(r, x): return post_ref(r, x)".to_string()),
            post_condition_tests: Some("((2, 1))|===|((-2, -1))".to_string()),
            ..Default::default()
        }
    }

    fn config() -> EvaluatorConfig {
        EvaluatorConfig::default()
    }

    #[test]
    fn test_inputs_literal_drops_recorded_output() {
        assert_eq!(inputs_literal("(4, 2)"), "tuple(((4, 2))[1:])");
    }

    #[tokio::test]
    async fn test_precondition_gates_program_check() {
        let engine = engine();
        let check = check_task(&task(), &engine, &config()).await;

        assert_eq!(check.pre, ConditionCheck::Passed { results: vec![Bool(true), Bool(false)] });
        assert_eq!(check.post, ConditionCheck::Passed { results: vec![Bool(true), Bool(true)] });
        assert_eq!(
            check.program,
            ProgramCheck::Ran {
                verdicts: vec![
                    ProgramVerdict::Checked {
                        output: ResultValue::other("2", true, None),
                        holds: true,
                    },
                    ProgramVerdict::RejectedByPrecondition,
                ]
            }
        );
        assert!(check.program.passes());
        // The program never ran on the rejected input
        assert_eq!(engine.call_count("Pr_1"), 1);
    }

    #[tokio::test]
    async fn test_program_check_fails_without_precondition() {
        let mut task = task();
        task.pre_condition_solution = None;

        let report = check_dataset(&[task], &engine(), &config()).await;

        assert_eq!(report.tasks[0].pre, ConditionCheck::Absent);
        match &report.tasks[0].program {
            ProgramCheck::Ran { verdicts } => assert_eq!(
                verdicts[1],
                ProgramVerdict::Checked { output: ResultValue::other("0", false, None), holds: false }
            ),
            other => panic!("expected program run, got {:?}", other),
        }
        assert!(!report.all_programs_pass());
        assert!(!report.is_clean());
        assert_eq!(report.broken_references(), 0);
    }

    #[tokio::test]
    async fn test_task_without_program_only_checks_references() {
        let mut task = task();
        task.program = None;

        let check = check_task(&task, &engine(), &config()).await;
        assert_eq!(check.program, ProgramCheck::NotApplicable);
        assert!(!check.pre.is_broken());
    }

    #[tokio::test]
    async fn test_broken_reference_is_reported() {
        let mut task = task();
        task.post_condition_solution = Some("def check_post_solution_1(r, x) SYNTAX ERROR".to_string());

        let report = check_dataset(&[task], &engine(), &config()).await;

        assert!(report.tasks[0].post.is_broken());
        assert_eq!(report.tasks[0].program, ProgramCheck::NotApplicable);
        assert_eq!(report.broken_references(), 1);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_crashing_reference_test_is_broken() {
        let mut task = task();
        task.pre_condition_tests = Some("((1))|(oops)".to_string());

        let check = check_task(&task, &engine(), &config()).await;
        assert!(check.pre.is_broken());
        assert_eq!(check.program, ProgramCheck::NotApplicable);
    }

    #[tokio::test]
    async fn test_unloadable_program_is_broken() {
        let mut task = task();
        task.program = Some("def Pr_1(x) SYNTAX ERROR".to_string());

        let check = check_task(&task, &engine(), &config()).await;
        assert!(matches!(check.program, ProgramCheck::Broken { .. }));
        assert!(!check.program.passes());
    }

    #[tokio::test]
    async fn test_program_runs_once_per_case_and_post_sees_its_output() {
        let mut task = task();
        task.pre_condition_solution = None;
        let engine = engine();

        check_task(&task, &engine, &config()).await;

        assert_eq!(engine.call_count("Pr_1"), 2);
        let post_calls: Vec<String> = engine
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == "check_post_solution_1")
            .map(|(_, lit)| lit.clone())
            .collect();
        // Two reference runs, then one chained run per case
        assert_eq!(post_calls.len(), 4);
        assert!(post_calls[2].starts_with("(2,) + "));
        assert!(post_calls[3].starts_with("(0,) + "));
    }

    #[tokio::test]
    async fn test_truthy_precondition_admits_input() {
        let engine = engine().with("pre_count(", |lit| {
            let x = *innermost(lit).last()?;
            Some(ResultValue::other(x.max(0).to_string(), x > 0, Some(x == 1)))
        });
        let mut task = task();
        task.pre_condition_solution = Some("def check_pre_solution_1(x): return pre_count(x)".to_string());

        let check = check_task(&task, &engine, &config()).await;

        assert!(check.program.passes());
        assert_eq!(engine.call_count("Pr_1"), 1);
    }
}
