use serde::{Deserialize, Serialize};
use std::fmt;

/// Which oracle of a task is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Pre,
    Post,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 2] = [ConditionKind::Pre, ConditionKind::Post];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionKind::Pre => "pre",
            ConditionKind::Post => "post",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single task record as found in the dataset.
///
/// Field names follow the dataset's JSON schema so records round-trip
/// without a translation layer. Evaluation results are attached in
/// `pre_evaluation` / `post_evaluation`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(default)]
    pub program: Option<String>,

    #[serde(default)]
    pub pre_condition: Option<String>,
    #[serde(default)]
    pub pre_condition_solution: Option<String>,
    #[serde(default)]
    pub pre_condition_tests: Option<String>,
    #[serde(default)]
    pub pre_condition_completions: Vec<String>,
    #[serde(default)]
    pub pre_condition_incomplete: Option<String>,

    #[serde(default)]
    pub post_condition: Option<String>,
    #[serde(default)]
    pub post_condition_solution: Option<String>,
    #[serde(default)]
    pub post_condition_tests: Option<String>,
    #[serde(default)]
    pub post_condition_completions: Vec<String>,
    #[serde(default)]
    pub post_condition_incomplete: Option<String>,

    #[serde(default, skip_serializing_if = "ConditionEvaluation::is_not_applicable")]
    pub pre_evaluation: ConditionEvaluation,
    #[serde(default, skip_serializing_if = "ConditionEvaluation::is_not_applicable")]
    pub post_evaluation: ConditionEvaluation,
}

/// Borrowed view over one condition kind of a task
#[derive(Debug, Clone, Copy)]
pub struct ConditionSpec<'a> {
    pub description: Option<&'a str>,
    pub solution: Option<&'a str>,
    pub tests: Option<&'a str>,
    pub completions: &'a [String],
    pub incomplete: Option<&'a str>,
}

impl ConditionSpec<'_> {
    /// A condition is present when its description is given and non-empty.
    pub fn is_present(&self) -> bool {
        self.description.map_or(false, |d| !d.is_empty())
    }
}

impl Task {
    pub fn condition(&self, kind: ConditionKind) -> ConditionSpec<'_> {
        match kind {
            ConditionKind::Pre => ConditionSpec {
                description: self.pre_condition.as_deref(),
                solution: self.pre_condition_solution.as_deref(),
                tests: self.pre_condition_tests.as_deref(),
                completions: &self.pre_condition_completions,
                incomplete: self.pre_condition_incomplete.as_deref(),
            },
            ConditionKind::Post => ConditionSpec {
                description: self.post_condition.as_deref(),
                solution: self.post_condition_solution.as_deref(),
                tests: self.post_condition_tests.as_deref(),
                completions: &self.post_condition_completions,
                incomplete: self.post_condition_incomplete.as_deref(),
            },
        }
    }

    pub fn evaluation(&self, kind: ConditionKind) -> &ConditionEvaluation {
        match kind {
            ConditionKind::Pre => &self.pre_evaluation,
            ConditionKind::Post => &self.post_evaluation,
        }
    }

    pub fn evaluation_mut(&mut self, kind: ConditionKind) -> &mut ConditionEvaluation {
        match kind {
            ConditionKind::Pre => &mut self.pre_evaluation,
            ConditionKind::Post => &mut self.post_evaluation,
        }
    }

    /// Name under which the reference predicate is defined
    pub fn solution_function_name(&self, kind: ConditionKind) -> String {
        format!("check_{}_solution_{}", kind, self.task_id)
    }

    /// Name under which a candidate predicate is defined
    pub fn candidate_function_name(&self, kind: ConditionKind) -> String {
        format!("check_{}_{}", kind, self.task_id)
    }

    /// Name under which the reference program is defined
    pub fn program_function_name(&self) -> String {
        format!("Pr_{}", self.task_id)
    }
}

/// One element of a test suite: either an argument tuple or the group
/// sentinel.
///
/// Arguments are kept as a Python expression producing the argument tuple.
/// The engine evaluates it afresh for every call, so values whose repr is
/// not valid source (`inf`, arbitrary objects) still arrive intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestCase {
    Args(String),
    Sentinel,
}

impl TestCase {
    pub fn args(literal: impl Into<String>) -> Self {
        TestCase::Args(literal.into())
    }
}

/// Outcome of running a predicate on one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultValue {
    Bool(bool),
    /// The predicate crashed, raised, or timed out
    Failed,
    /// The predicate returned `None`
    NoAnswer,
    /// Any other returned value
    Other(OtherValue),
}

/// A non-boolean, non-`None` result as seen by the interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherValue {
    pub repr: String,
    /// Python truthiness of the value
    pub truthy: bool,
    /// The boolean the value compares equal to, e.g. `1 == True`
    pub equals: Option<bool>,
}

impl ResultValue {
    pub fn other(repr: impl Into<String>, truthy: bool, equals: Option<bool>) -> Self {
        ResultValue::Other(OtherValue {
            repr: repr.into(),
            truthy,
            equals,
        })
    }

    /// Only an actual boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResultValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The boolean this value is equal to under Python `==`
    pub fn equals_bool(&self) -> Option<bool> {
        match self {
            ResultValue::Bool(b) => Some(*b),
            ResultValue::Other(other) => other.equals,
            ResultValue::Failed | ResultValue::NoAnswer => None,
        }
    }

    /// Python truthiness; `None` and failures are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            ResultValue::Bool(b) => *b,
            ResultValue::Other(other) => other.truthy,
            ResultValue::Failed | ResultValue::NoAnswer => false,
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Bool(true) => f.write_str("True"),
            ResultValue::Bool(false) => f.write_str("False"),
            ResultValue::Failed => f.write_str("failed"),
            ResultValue::NoAnswer => f.write_str("None"),
            ResultValue::Other(other) => f.write_str(&other.repr),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgement {
    Accepted,
    Failed,
    TooWeak,
    TooStrong,
    Rejected,
}

impl Judgement {
    pub fn as_str(self) -> &'static str {
        match self {
            Judgement::Accepted => "accepted",
            Judgement::Failed => "failed",
            Judgement::TooWeak => "too_weak",
            Judgement::TooStrong => "too_strong",
            Judgement::Rejected => "rejected",
        }
    }

    /// Accepted or off in one direction only
    pub fn is_unrejected(self) -> bool {
        matches!(
            self,
            Judgement::Accepted | Judgement::TooWeak | Judgement::TooStrong
        )
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-valued acceptance label used for base-test verdicts and task-level
/// summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Acceptance {
    #[serde(rename = "accepted")]
    Accepted,
    #[serde(rename = "NOT accepted")]
    NotAccepted,
}

impl Acceptance {
    pub fn from_judgement(judgement: Judgement) -> Self {
        if judgement == Judgement::Accepted {
            Acceptance::Accepted
        } else {
            Acceptance::NotAccepted
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Acceptance::Accepted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Acceptance::Accepted => "accepted",
            Acceptance::NotAccepted => "NOT accepted",
        }
    }
}

impl fmt::Display for Acceptance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub distance: usize,
    #[serde(rename = "s2Len")]
    pub s2_len: usize,
    #[serde(rename = "relativeDistance")]
    pub relative_distance: f64,
}

/// Evaluation annotations for one condition kind of a task.
/// Every field is `None` when the condition is not applicable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionEvaluation {
    pub base_evaluation: Option<Acceptance>,
    pub evaluation: Option<Acceptance>,
    pub base_evaluations: Option<Vec<Acceptance>>,
    pub evaluations: Option<Vec<Judgement>>,
    pub edit_distances: Option<Vec<DistanceRecord>>,
    pub accepted_completion: Option<usize>,
    pub accepted_completion_edit_distance: Option<DistanceRecord>,
    pub avrg_relative_edit_distance_of_unrejected: Option<f64>,
    pub avrg_size_of_unrejected: Option<f64>,
}

impl ConditionEvaluation {
    pub fn is_not_applicable(&self) -> bool {
        *self == ConditionEvaluation::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names() {
        let task = Task {
            task_id: "7".to_string(),
            ..Default::default()
        };
        assert_eq!(task.solution_function_name(ConditionKind::Pre), "check_pre_solution_7");
        assert_eq!(task.candidate_function_name(ConditionKind::Post), "check_post_7");
        assert_eq!(task.program_function_name(), "Pr_7");
    }

    #[test]
    fn test_condition_presence() {
        let task = Task {
            task_id: "1".to_string(),
            pre_condition: Some(String::new()),
            post_condition: Some("the result is sorted".to_string()),
            ..Default::default()
        };
        assert!(!task.condition(ConditionKind::Pre).is_present());
        assert!(task.condition(ConditionKind::Post).is_present());
    }

    #[test]
    fn test_acceptance_serializes_with_dataset_labels() {
        let json = serde_json::to_string(&Acceptance::NotAccepted).unwrap();
        assert_eq!(json, "\"NOT accepted\"");
        let json = serde_json::to_string(&Judgement::TooWeak).unwrap();
        assert_eq!(json, "\"too_weak\"");
    }

    #[test]
    fn test_result_values_follow_python_equality_and_truthiness() {
        let one = ResultValue::other("1", true, Some(true));
        let zero = ResultValue::other("0", false, Some(false));
        let text = ResultValue::other("'abc'", true, None);

        assert_eq!(one.equals_bool(), Some(true));
        assert_eq!(zero.equals_bool(), Some(false));
        assert_eq!(text.equals_bool(), None);
        assert!(text.is_truthy());
        assert!(!ResultValue::NoAnswer.is_truthy());
        assert_eq!(one.as_bool(), None);
        assert_eq!(text.to_string(), "'abc'");
    }

    #[test]
    fn test_unrejected_judgements() {
        assert!(Judgement::Accepted.is_unrejected());
        assert!(Judgement::TooStrong.is_unrejected());
        assert!(!Judgement::Rejected.is_unrejected());
        assert!(!Judgement::Failed.is_unrejected());
    }
}
