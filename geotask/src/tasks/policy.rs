//! Filter and sort policy for the published task view.
//!
//! Pure functions: the input is never mutated and the same inputs always
//! produce the same ordered output. All sorts are stable, so tasks that
//! compare equal keep their relative input order.

use std::cmp::Ordering;

use geotask_proto::task::{CategoryFilter, SortOption, Task};

/// Compares two tasks under `sort`.
///
/// - [`SortOption::ByPriority`]: category tier, then deadline
/// - [`SortOption::ByDeadline`]: deadline
/// - [`SortOption::ByCreatedAt`]: creation time
/// - [`SortOption::ByCategory`]: category name, byte-wise lexicographic
#[must_use]
pub fn compare(sort: SortOption, a: &Task, b: &Task) -> Ordering {
    match sort {
        SortOption::ByPriority => a
            .category
            .priority_tier()
            .cmp(&b.category.priority_tier())
            .then_with(|| a.deadline.cmp(&b.deadline)),
        SortOption::ByDeadline => a.deadline.cmp(&b.deadline),
        SortOption::ByCreatedAt => a.created_at.cmp(&b.created_at),
        SortOption::ByCategory => a.category.as_str().cmp(b.category.as_str()),
    }
}

/// Stable in-place sort of `tasks` under `sort`.
pub fn sort_tasks(tasks: &mut [Task], sort: SortOption) {
    tasks.sort_by(|a, b| compare(sort, a, b));
}

/// Builds the ordered view: keeps tasks passing `filter`, then sorts them.
#[must_use]
pub fn apply_view(tasks: &[Task], filter: &CategoryFilter, sort: SortOption) -> Vec<Task> {
    let mut view: Vec<Task> = tasks
        .iter()
        .filter(|t| filter.matches(&t.category))
        .cloned()
        .collect();
    sort_tasks(&mut view, sort);
    view
}
