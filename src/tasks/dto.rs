use serde::Deserialize;

use crate::tasks::repo::{SortField, TaskFilter};

/// Unknown top-level fields are absorbed and dropped, not rejected;
/// description is the only hard gate.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub description: Option<String>,
    pub completed: Option<bool>,
}

pub const TASK_UPDATE_FIELDS: &[&str] = &["description", "completed"];

/// Raw query string for task listings. Everything is optional and lenient:
/// non-numeric limit/skip degrade to "no limit/skip", an unrecognized sort
/// field degrades to the default order.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub completed: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

impl ListTasksQuery {
    pub fn into_filter(self) -> TaskFilter {
        TaskFilter {
            // an empty value means no filter, same as an absent param
            completed: self
                .completed
                .filter(|v| !v.is_empty())
                .map(|v| v == "true"),
            sort: self.sort_by.as_deref().and_then(parse_sort_by),
            limit: self.limit.and_then(|v| v.parse::<i64>().ok()),
            skip: self.skip.and_then(|v| v.parse::<i64>().ok()),
        }
    }
}

/// `field:direction`; `desc` means descending, anything else ascending.
fn parse_sort_by(raw: &str) -> Option<(SortField, bool)> {
    let (field, direction) = match raw.split_once(':') {
        Some((f, d)) => (f, d),
        None => (raw, ""),
    };
    let field = SortField::parse(field)?;
    Some((field, direction == "desc"))
}
