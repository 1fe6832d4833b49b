/// Judgement Classifier - Comparing Predicate Behaviour
///
/// **Core Responsibility:**
/// Compare the results of a candidate predicate (predicted) with those of
/// the reference predicate (expected) on the same test cases and assign one
/// of five judgements.
///
/// **Critical Properties:**
/// - Knows nothing about the interpreter
/// - Knows nothing about datasets or reports
/// - Pure function: (expected results, predicted results) → judgement
///
/// **Judgement Rules (checked in this order, first match wins):**
/// 1. Positions where the candidate gave no answer (`None`) are dropped
///    from both vectors; if nothing remains → `failed`
/// 2. Any crashed or non-boolean prediction → `failed`
/// 3. Predictions equal expectations under Python `==` (so a reference
///    returning `1` matches `True`) → `accepted`
/// 4. Some truthy expectation predicted false AND some falsy expectation
///    predicted true → `rejected`
/// 5. Only expected-true predicted false → `too_strong` (the candidate is a
///    stricter predicate)
/// 6. Only expected-false predicted true → `too_weak` (the candidate is a
///    looser predicate)
/// 7. Otherwise → `failed`

use spi_common::types::{Judgement, ResultValue};

/// Classify a candidate against the reference.
///
/// ## Arguments
/// * `expected` - Results of the reference predicate, one per test case
/// * `predicted` - Results of the candidate, positionally aligned with `expected`
///
/// ## Returns
/// The judgement of the first matching rule
pub fn classify(expected: &[ResultValue], predicted: &[ResultValue]) -> Judgement {
    let answered: Vec<(&ResultValue, &ResultValue)> = expected
        .iter()
        .zip(predicted.iter())
        .filter(|(_, p)| **p != ResultValue::NoAnswer)
        .collect();

    if answered.is_empty() {
        return Judgement::Failed;
    }

    if answered.iter().any(|(_, p)| p.as_bool().is_none()) {
        return Judgement::Failed;
    }

    if answered.iter().all(|(e, p)| e.equals_bool() == p.as_bool()) {
        return Judgement::Accepted;
    }

    let mut any_false_negative = false;
    let mut any_false_positive = false;
    for (e, p) in &answered {
        let expectation = e.is_truthy();
        let prediction = p.is_truthy();
        any_false_negative = any_false_negative || (expectation && !prediction);
        any_false_positive = any_false_positive || (!expectation && prediction);
    }

    match (any_false_negative, any_false_positive) {
        (true, true) => Judgement::Rejected,
        (true, false) => Judgement::TooStrong,
        (false, true) => Judgement::TooWeak,
        (false, false) => Judgement::Failed,
    }
}
