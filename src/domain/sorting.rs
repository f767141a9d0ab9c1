use crate::domain::task::Task;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::str::FromStr;

/// Fields available for sorting the flat task list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Position,
    Title,
    Status,
    Priority,
    Created,
    Updated,
    Due,
}

/// Sort order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "position" => Ok(SortField::Position),
            "title" => Ok(SortField::Title),
            "status" => Ok(SortField::Status),
            "priority" => Ok(SortField::Priority),
            "created" => Ok(SortField::Created),
            "updated" => Ok(SortField::Updated),
            "due" => Ok(SortField::Due),
            _ => Err(format!(
                "Invalid sort field '{}'. Valid fields: position, title, status, priority, created, updated, due",
                s
            )),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            _ => Err(format!(
                "Invalid sort order '{}'. Valid orders: asc, desc",
                s
            )),
        }
    }
}

/// Sorts tasks in-place for the list view.
///
/// The sort is stable, so tasks that compare equal keep their incoming
/// order. Sorting by position compares positions only; tasks from different
/// columns with the same position stay in the order they were given.
///
/// # Examples
/// ```
/// use taskboard_core::domain::sorting::{sort_tasks, SortField, SortOrder};
/// use taskboard_core::domain::task::Task;
///
/// let mut tasks = vec![
///     Task::new("C", "user").with_position(2),
///     Task::new("A", "user").with_position(0),
///     Task::new("B", "user").with_position(1),
/// ];
///
/// sort_tasks(&mut tasks, SortField::Position, SortOrder::Ascending);
/// assert_eq!(tasks[0].title, "A");
/// ```
pub fn sort_tasks(tasks: &mut [Task], field: SortField, order: SortOrder) {
    tasks.sort_by(|a, b| {
        let cmp = match field {
            SortField::Position => a.position.cmp(&b.position),
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortField::Status => a.status.cmp(&b.status),
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::Created => a.created_at.cmp(&b.created_at),
            SortField::Updated => a.updated_at.cmp(&b.updated_at),
            SortField::Due => return compare_option_dates(a.due_date, b.due_date, order),
        };

        match order {
            SortOrder::Ascending => cmp,
            SortOrder::Descending => cmp.reverse(),
        }
    });
}

/// Compare optional dates with None always sorting to the end,
/// regardless of sort order
fn compare_option_dates(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    order: SortOrder,
) -> Ordering {
    match (a, b) {
        (Some(a_date), Some(b_date)) => match order {
            SortOrder::Ascending => a_date.cmp(&b_date),
            SortOrder::Descending => b_date.cmp(&a_date),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
