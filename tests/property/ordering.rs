//! Property-based tests for the filter/sort policy.
//!
//! Uses proptest to verify, for every sort option and category filter:
//! 1. The output is ordered under the chosen comparison.
//! 2. Equal elements keep their input order (stable sort).
//! 3. The output is exactly the filtered input, nothing lost or invented.
//! 4. The input slice is left untouched.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cmp::Ordering;

use geotask::tasks::apply_view;
use geotask::tasks::policy::compare;
use geotask_proto::task::{Category, CategoryFilter, SortOption, Task};
use proptest::prelude::*;

fn arb_category() -> impl Strategy<Value = Category> {
    prop_oneof![
        4 => prop::sample::select(Category::KNOWN.to_vec()),
        1 => "[a-z]{1,6}".prop_map(Category::from),
    ]
}

/// Small deadline and timestamp ranges so ties are common.
fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(
        (arb_category(), 0u64..8, 0u64..8),
        0..40,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (category, deadline, created_at))| {
                Task::new(format!("task-{i}"), category, deadline, created_at)
            })
            .collect()
    })
}

fn arb_sort() -> impl Strategy<Value = SortOption> {
    prop::sample::select(SortOption::ALL.to_vec())
}

fn arb_filter() -> impl Strategy<Value = CategoryFilter> {
    prop_oneof![
        Just(CategoryFilter::All),
        arb_category().prop_map(CategoryFilter::Only),
    ]
}

/// Position of each task in the original input, by title.
fn input_index(task: &Task) -> usize {
    task.title
        .strip_prefix("task-")
        .and_then(|n| n.parse().ok())
        .unwrap()
}

proptest! {
    #[test]
    fn output_is_sorted_and_stable(
        tasks in arb_tasks(),
        filter in arb_filter(),
        sort in arb_sort(),
    ) {
        let view = apply_view(&tasks, &filter, sort);
        for pair in view.windows(2) {
            let order = compare(sort, &pair[0], &pair[1]);
            prop_assert_ne!(order, Ordering::Greater);
            if order == Ordering::Equal {
                prop_assert!(input_index(&pair[0]) < input_index(&pair[1]));
            }
        }
    }

    #[test]
    fn output_is_filtered_input(
        tasks in arb_tasks(),
        filter in arb_filter(),
        sort in arb_sort(),
    ) {
        let view = apply_view(&tasks, &filter, sort);

        let mut expected: Vec<usize> = tasks
            .iter()
            .filter(|t| filter.matches(&t.category))
            .map(input_index)
            .collect();
        let mut actual: Vec<usize> = view.iter().map(input_index).collect();
        expected.sort_unstable();
        actual.sort_unstable();
        prop_assert_eq!(actual, expected);

        prop_assert!(view.iter().all(|t| filter.matches(&t.category)));
    }

    #[test]
    fn input_untouched(tasks in arb_tasks(), filter in arb_filter(), sort in arb_sort()) {
        let before = tasks.clone();
        let _ = apply_view(&tasks, &filter, sort);
        prop_assert_eq!(tasks, before);
    }

    #[test]
    fn all_filter_keeps_everything(tasks in arb_tasks(), sort in arb_sort()) {
        prop_assert_eq!(apply_view(&tasks, &CategoryFilter::All, sort).len(), tasks.len());
    }

    #[test]
    fn priority_puts_lower_tier_first(tasks in arb_tasks()) {
        let view = apply_view(&tasks, &CategoryFilter::All, SortOption::ByPriority);
        let tiers: Vec<u8> = view.iter().map(|t| t.category.priority_tier()).collect();
        prop_assert!(tiers.windows(2).all(|w| w[0] <= w[1]));
    }
}
