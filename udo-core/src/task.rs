use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::DayWindow;

/// How a task is grouped on screen. Computed on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskCategory {
    /// Due before today
    Overdue,
    /// Due today
    Today,
    /// Due after today, or without a due date
    Later,
}

impl TaskCategory {
    pub fn of(due_date: Option<NaiveDate>, today: NaiveDate) -> Self {
        match due_date {
            Some(due) if due < today => Self::Overdue,
            Some(due) if due == today => Self::Today,
            _ => Self::Later,
        }
    }
}

/// The fields of a task that the view rules look at
#[derive(Debug, Clone, Copy)]
pub struct TaskState {
    pub is_done: bool,
    pub due_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    /// Open work that is undated or due by the end of today, plus anything
    /// finished today. Work finished on an earlier day is left out.
    pub fn in_today_view(&self, window: &DayWindow) -> bool {
        if self.is_done {
            window.contains(self.updated_at)
        } else {
            self.due_date.map_or(true, |due| due <= window.today)
        }
    }

    /// Open work due strictly after today
    pub fn in_scheduled_view(&self, window: &DayWindow) -> bool {
        !self.is_done && self.due_date.map_or(false, |due| due > window.today)
    }

    /// Finished work last touched at or before `before`
    pub fn is_archived(&self, before: DateTime<Utc>) -> bool {
        self.is_done && self.updated_at <= before
    }

    /// Finished work from a previous day, which a bulk clear removes
    pub fn is_clearable(&self, window: &DayWindow) -> bool {
        self.is_done && self.updated_at < window.start
    }
}

/// Trims a task name, rejecting names that are empty afterwards
pub fn normalize_task_name(name: &str) -> Option<String> {
    let trimmed = name.trim();

    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod test {
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};

    use super::{normalize_task_name, TaskCategory, TaskState};
    use crate::DayWindow;

    fn window() -> DayWindow {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        DayWindow::at(now, FixedOffset::east_opt(0).unwrap())
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn categories() {
        let today = date(20);

        assert_eq!(TaskCategory::of(Some(date(19)), today), TaskCategory::Overdue);
        assert_eq!(TaskCategory::of(Some(date(20)), today), TaskCategory::Today);
        assert_eq!(TaskCategory::of(Some(date(21)), today), TaskCategory::Later);
        assert_eq!(TaskCategory::of(None, today), TaskCategory::Later);
    }

    #[test]
    fn undated_open_task_is_always_in_today_view() {
        let window = window();
        let task = TaskState {
            is_done: false,
            due_date: None,
            updated_at: window.start - Duration::days(30),
        };

        assert!(task.in_today_view(&window));
        assert!(task.in_today_view(&window.next().next()));
        assert!(!task.in_scheduled_view(&window));
    }

    #[test]
    fn open_tasks_split_between_today_and_scheduled() {
        let window = window();
        let overdue = TaskState {
            is_done: false,
            due_date: Some(date(3)),
            updated_at: window.start,
        };
        let future = TaskState {
            due_date: Some(date(21)),
            ..overdue
        };

        assert!(overdue.in_today_view(&window));
        assert!(!overdue.in_scheduled_view(&window));
        assert!(!future.in_today_view(&window));
        assert!(future.in_scheduled_view(&window));
    }

    #[test]
    fn done_tasks_leave_today_view_the_next_day() {
        let window = window();
        let done = TaskState {
            is_done: true,
            due_date: None,
            updated_at: window.start + Duration::hours(3),
        };

        assert!(done.in_today_view(&window));
        assert!(!done.is_clearable(&window));
        assert!(!done.in_today_view(&window.next()));
        assert!(done.is_clearable(&window.next()));
        assert!(done.is_archived(window.next().start));
    }

    #[test]
    fn task_names_are_trimmed() {
        assert_eq!(normalize_task_name("  buy milk "), Some("buy milk".to_string()));
        assert_eq!(normalize_task_name("   "), None);
    }
}
