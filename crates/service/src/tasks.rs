//! In-memory task list of the tasks sample app and the view model that
//! combines it with the stored sort/visibility preferences.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::{Stream, StreamExt};
use models::{SortOrder, Task, TaskPriority};
use serde::Serialize;

use crate::errors::StoreError;
use crate::user_preferences::{UserPreferences, UserPreferencesRepository};

#[derive(Debug, Clone)]
pub struct TasksRepository {
    tasks: Vec<Task>,
}

impl TasksRepository {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// The sample task list; `now` is the deadline of the open-ended tasks.
    pub fn sample(now: DateTime<Utc>) -> Self {
        Self::new(vec![
            Task::new("Open codelab", day(2020, 7, 21), TaskPriority::Low).completed(),
            Task::new("Import project", day(2020, 7, 22), TaskPriority::Medium).completed(),
            Task::new("Check out the code", day(2020, 7, 22), TaskPriority::Low),
            Task::new("Read about DataStore", day(2020, 7, 23), TaskPriority::High),
            Task::new("Implement each step", now, TaskPriority::Medium),
            Task::new("Understand how to use DataStore", day(2020, 7, 25), TaskPriority::High),
            Task::new("Understand how to migrate to DataStore", now, TaskPriority::High),
        ])
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

impl Default for TasksRepository {
    fn default() -> Self {
        Self::sample(Utc::now())
    }
}

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("sample dates are valid calendar dates")
}

/// Hide completed tasks unless asked to show them, then order by `sort_order`.
///
/// Deadlines sort latest first, priorities `High` first; the sort is stable so
/// ties keep repository order.
pub fn filter_sort_tasks(tasks: &[Task], show_completed: bool, sort_order: SortOrder) -> Vec<Task> {
    let mut filtered: Vec<Task> = tasks
        .iter()
        .filter(|task| show_completed || !task.completed)
        .cloned()
        .collect();
    match sort_order {
        SortOrder::None => {}
        SortOrder::ByDeadline => filtered.sort_by(|a, b| b.deadline.cmp(&a.deadline)),
        SortOrder::ByPriority => filtered.sort_by_key(|task| task.priority),
        SortOrder::ByDeadlineAndPriority => {
            filtered.sort_by(|a, b| b.deadline.cmp(&a.deadline).then(a.priority.cmp(&b.priority)))
        }
    }
    filtered
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TasksUiModel {
    pub tasks: Vec<Task>,
    pub show_completed: bool,
    pub sort_order: SortOrder,
}

impl TasksUiModel {
    fn build(tasks: &[Task], prefs: UserPreferences) -> Self {
        Self {
            tasks: filter_sort_tasks(tasks, prefs.show_completed, prefs.sort_order),
            show_completed: prefs.show_completed,
            sort_order: prefs.sort_order,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TasksViewModel {
    tasks: Arc<TasksRepository>,
    preferences: UserPreferencesRepository,
}

impl TasksViewModel {
    pub fn new(tasks: Arc<TasksRepository>, preferences: UserPreferencesRepository) -> Self {
        Self { tasks, preferences }
    }

    /// Preferences to seed the filter controls with before listening for changes.
    pub async fn initial_setup(&self) -> Result<UserPreferences, StoreError> {
        self.preferences.fetch_initial_preferences().await
    }

    pub fn tasks_ui_model_stream(&self) -> impl Stream<Item = Result<TasksUiModel, StoreError>> + Send + 'static {
        let tasks = Arc::clone(&self.tasks);
        self.preferences
            .user_preferences_stream()
            .map(move |prefs| prefs.map(|p| TasksUiModel::build(tasks.tasks(), p)))
    }

    pub async fn current_ui_model(&self) -> Result<TasksUiModel, StoreError> {
        let prefs = self.preferences.fetch_initial_preferences().await?;
        Ok(TasksUiModel::build(self.tasks.tasks(), prefs))
    }

    pub async fn show_completed_tasks(&self, show: bool) -> Result<(), StoreError> {
        self.preferences.update_show_completed(show).await
    }

    pub async fn enable_sort_by_deadline(&self, enable: bool) -> Result<SortOrder, StoreError> {
        self.preferences.enable_sort_by_deadline(enable).await
    }

    pub async fn enable_sort_by_priority(&self, enable: bool) -> Result<SortOrder, StoreError> {
        self.preferences.enable_sort_by_priority(enable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    fn fixture() -> Vec<Task> {
        vec![
            Task::new("a", day(2020, 7, 21), TaskPriority::Low).completed(),
            Task::new("b", day(2020, 7, 23), TaskPriority::Low),
            Task::new("c", day(2020, 7, 22), TaskPriority::High),
            Task::new("d", day(2020, 7, 23), TaskPriority::Medium),
        ]
    }

    #[test]
    fn hides_completed_unless_requested() {
        let tasks = fixture();
        assert_eq!(names(&filter_sort_tasks(&tasks, false, SortOrder::None)), ["b", "c", "d"]);
        assert_eq!(names(&filter_sort_tasks(&tasks, true, SortOrder::None)), ["a", "b", "c", "d"]);
    }

    #[test]
    fn sorts_by_each_order() {
        let tasks = fixture();
        assert_eq!(names(&filter_sort_tasks(&tasks, true, SortOrder::ByDeadline)), ["b", "d", "c", "a"]);
        assert_eq!(names(&filter_sort_tasks(&tasks, true, SortOrder::ByPriority)), ["c", "d", "a", "b"]);
        assert_eq!(
            names(&filter_sort_tasks(&tasks, true, SortOrder::ByDeadlineAndPriority)),
            ["d", "b", "c", "a"]
        );
    }

    #[test]
    fn sample_repository_has_two_completed_tasks() {
        let repo = TasksRepository::sample(day(2020, 7, 24));
        assert_eq!(repo.tasks().len(), 7);
        assert_eq!(repo.tasks().iter().filter(|t| t.completed).count(), 2);
    }
}
