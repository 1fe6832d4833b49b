// Splitting of sentinel-delimited test suites into base and validation tests

/// Base tests decide acceptance, validation tests only refine it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuitePartition<T> {
    pub base: Vec<T>,
    pub validation: Vec<T>,
}

/// Split `tests` into the groups separated by `sentinel`. A trailing group is
/// always closed, so there is at least one (possibly empty) group.
pub fn split_groups<T: PartialEq + Clone>(tests: &[T], sentinel: &T) -> Vec<Vec<T>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for test in tests {
        if test == sentinel {
            groups.push(std::mem::take(&mut current));
        } else {
            current.push(test.clone());
        }
    }
    groups.push(current);
    groups
}

/// Partition a suite into base and validation tests.
///
/// Group 0 is always base. With two groups the second is validation. With
/// three or more, `merge_second_group_into_base` moves group 1 into base
/// (robustness tests that strengthen the oracle) and the rest is validation.
pub fn partition<T: PartialEq + Clone>(
    tests: &[T],
    sentinel: &T,
    merge_second_group_into_base: bool,
) -> SuitePartition<T> {
    let mut groups = split_groups(tests, sentinel).into_iter();
    let mut base = groups.next().unwrap_or_default();
    let rest: Vec<Vec<T>> = groups.collect();

    let validation = match rest.len() {
        0 => Vec::new(),
        1 => rest.into_iter().flatten().collect(),
        _ if merge_second_group_into_base => {
            let mut rest = rest.into_iter();
            if let Some(second) = rest.next() {
                base.extend(second);
            }
            rest.flatten().collect()
        }
        _ => rest.into_iter().flatten().collect(),
    };

    SuitePartition { base, validation }
}
