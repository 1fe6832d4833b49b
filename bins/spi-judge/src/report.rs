// Flat evaluation report and acceptance summary
use anyhow::{Context, Result};
use spi_common::types::{Acceptance, ConditionEvaluation, ConditionKind, Task};
use std::fmt::Write as _;
use std::path::Path;

pub const REPORT_HEADER: &str = "task-id,task,base-test,all-test,accepted-index,accepted-len,accepted-lev,accepted-relative-lev,nonrejecteds-avrg-len,nonrejecteds-avrg-rel-lev";

fn number(value: Option<f64>) -> String {
    value.map(|v| format!("{:?}", v)).unwrap_or_default()
}

/// One report line, or `None` when the condition has no task-level verdict
pub fn render_row(task_id: &str, kind: ConditionKind, eval: &ConditionEvaluation) -> Option<String> {
    let base = eval.base_evaluation?;
    let all = eval.evaluation.map(Acceptance::as_str).unwrap_or_default();

    let accepted = if eval.evaluation == Some(Acceptance::Accepted) {
        match (eval.accepted_completion, eval.accepted_completion_edit_distance) {
            (Some(index), Some(d)) => format!(
                "{},{},{},{:?}",
                index, d.s2_len, d.distance, d.relative_distance
            ),
            _ => ",,,".to_string(),
        }
    } else {
        ",,,".to_string()
    };

    Some(format!(
        "{id},{id}-{kind},{base},{all},{accepted},{avg_len},{avg_rel}",
        id = task_id,
        kind = kind,
        base = base,
        all = all,
        accepted = accepted,
        avg_len = number(eval.avrg_size_of_unrejected),
        avg_rel = number(eval.avrg_relative_edit_distance_of_unrejected),
    ))
}

/// Whole report text: header, then pre and post rows per task
pub fn render_report(tasks: &[Task]) -> String {
    let mut out = String::new();
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for task in tasks {
        for kind in ConditionKind::ALL {
            if let Some(row) = render_row(&task.task_id, kind, task.evaluation(kind)) {
                out.push_str(&row);
                out.push('\n');
            }
        }
    }
    out
}

pub fn write_report(tasks: &[Task], path: &Path) -> Result<()> {
    std::fs::write(path, render_report(tasks))
        .with_context(|| format!("Failed to write report {}", path.display()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerdictCount {
    pub accepted: usize,
    pub not_accepted: usize,
}

impl VerdictCount {
    fn add(&mut self, verdict: Option<Acceptance>) {
        match verdict {
            Some(Acceptance::Accepted) => self.accepted += 1,
            Some(Acceptance::NotAccepted) => self.not_accepted += 1,
            None => {}
        }
    }

    pub fn total(&self) -> usize {
        self.accepted + self.not_accepted
    }

    /// Percentage of `n`, 0 when nothing was counted
    pub fn percent(&self, n: usize) -> f64 {
        match self.total() {
            0 => 0.0,
            total => 100.0 * n as f64 / total as f64,
        }
    }
}

/// Task-level verdict counts of one condition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptanceSummary {
    pub kind: ConditionKind,
    pub base_tests: VerdictCount,
    pub all_tests: VerdictCount,
}

impl AcceptanceSummary {
    pub fn collect(tasks: &[Task], kind: ConditionKind) -> Self {
        let mut summary = Self {
            kind,
            base_tests: VerdictCount::default(),
            all_tests: VerdictCount::default(),
        };
        for task in tasks {
            let eval = task.evaluation(kind);
            summary.base_tests.add(eval.base_evaluation);
            summary.all_tests.add(eval.evaluation);
        }
        summary
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (label, count) in [("base-tests", &self.base_tests), ("all-tests", &self.all_tests)] {
            let _ = writeln!(out, "   #{}-cond checked with {} = {}", self.kind, label, count.total());
            let _ = writeln!(
                out,
                "   accepted: {} ({:.2}%)",
                count.accepted,
                count.percent(count.accepted)
            );
            let _ = writeln!(
                out,
                "   NOT accepted: {} ({:.2}%)",
                count.not_accepted,
                count.percent(count.not_accepted)
            );
        }
        out
    }
}

pub fn print_acceptance_summary(tasks: &[Task]) {
    println!("📊 Acceptance over {} tasks", tasks.len());
    for kind in ConditionKind::ALL {
        print!("{}", AcceptanceSummary::collect(tasks, kind).render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spi_common::types::{DistanceRecord, Judgement};

    fn accepted_eval() -> ConditionEvaluation {
        ConditionEvaluation {
            base_evaluation: Some(Acceptance::Accepted),
            evaluation: Some(Acceptance::Accepted),
            base_evaluations: Some(vec![Acceptance::NotAccepted, Acceptance::Accepted]),
            evaluations: Some(vec![Judgement::Failed, Judgement::Accepted]),
            edit_distances: None,
            accepted_completion: Some(1),
            accepted_completion_edit_distance: Some(DistanceRecord {
                distance: 3,
                s2_len: 8,
                relative_distance: 0.375,
            }),
            avrg_relative_edit_distance_of_unrejected: Some(0.375),
            avrg_size_of_unrejected: Some(8.0),
        }
    }

    fn task(id: &str, pre: ConditionEvaluation, post: ConditionEvaluation) -> Task {
        Task {
            task_id: id.to_string(),
            pre_evaluation: pre,
            post_evaluation: post,
            ..Default::default()
        }
    }

    #[test]
    fn test_accepted_row() {
        let row = render_row("7", ConditionKind::Pre, &accepted_eval()).unwrap();
        assert_eq!(row, "7,7-pre,accepted,accepted,1,8,3,0.375,8.0,0.375");
    }

    #[test]
    fn test_accepted_columns_blank_unless_all_tests_accept() {
        let eval = ConditionEvaluation {
            evaluation: Some(Acceptance::NotAccepted),
            ..accepted_eval()
        };
        let row = render_row("7", ConditionKind::Post, &eval).unwrap();
        assert_eq!(row, "7,7-post,accepted,NOT accepted,,,,,8.0,0.375");
    }

    #[test]
    fn test_nothing_accepted_row() {
        let eval = ConditionEvaluation {
            base_evaluation: Some(Acceptance::NotAccepted),
            evaluation: Some(Acceptance::NotAccepted),
            ..Default::default()
        };
        let row = render_row("3", ConditionKind::Pre, &eval).unwrap();
        assert_eq!(row, "3,3-pre,NOT accepted,NOT accepted,,,,,,");
    }

    #[test]
    fn test_unevaluated_condition_has_no_row() {
        assert!(render_row("3", ConditionKind::Pre, &ConditionEvaluation::default()).is_none());
    }

    #[test]
    fn test_report_orders_pre_before_post() {
        let tasks = vec![
            task("1", ConditionEvaluation::default(), accepted_eval()),
            task("2", accepted_eval(), accepted_eval()),
        ];
        let report = render_report(&tasks);
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], REPORT_HEADER);
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("1,1-post,"));
        assert!(lines[2].starts_with("2,2-pre,"));
        assert!(lines[3].starts_with("2,2-post,"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        write_report(&[task("1", accepted_eval(), ConditionEvaluation::default())], &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, format!("{}\n1,1-pre,accepted,accepted,1,8,3,0.375,8.0,0.375\n", REPORT_HEADER));
    }

    #[test]
    fn test_summary_counts_and_percentages() {
        let rejected = ConditionEvaluation {
            base_evaluation: Some(Acceptance::Accepted),
            evaluation: Some(Acceptance::NotAccepted),
            ..Default::default()
        };
        let tasks = vec![
            task("1", accepted_eval(), ConditionEvaluation::default()),
            task("2", rejected.clone(), ConditionEvaluation::default()),
            task("3", rejected, ConditionEvaluation::default()),
        ];

        let pre = AcceptanceSummary::collect(&tasks, ConditionKind::Pre);
        assert_eq!(pre.base_tests, VerdictCount { accepted: 3, not_accepted: 0 });
        assert_eq!(pre.all_tests, VerdictCount { accepted: 1, not_accepted: 2 });
        assert!((pre.all_tests.percent(2) - 200.0 / 3.0).abs() < 1e-9);

        let post = AcceptanceSummary::collect(&tasks, ConditionKind::Post);
        assert_eq!(post.base_tests.total(), 0);
        assert_eq!(post.base_tests.percent(0), 0.0);
        assert!(post.render().contains("#post-cond checked with base-tests = 0"));
    }
}
