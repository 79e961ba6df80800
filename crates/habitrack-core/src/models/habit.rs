use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitCategory {
    Health,
    Productivity,
    Finance,
    Learning,
    Relationships,
    #[default]
    Other,
}

impl HabitCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            HabitCategory::Health => "Health",
            HabitCategory::Productivity => "Productivity",
            HabitCategory::Finance => "Finance",
            HabitCategory::Learning => "Learning",
            HabitCategory::Relationships => "Relationships",
            HabitCategory::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

/// Row of the habit list.
#[derive(Debug, Clone, Deserialize)]
pub struct HabitSummary {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: HabitCategory,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub current_streak: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: HabitCategory,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default = "default_goal")]
    pub goal_count: u32,
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub current_streak: i64,
    #[serde(default)]
    pub longest_streak: i64,
    #[serde(default)]
    pub completion_rate: f64,
    #[serde(default)]
    pub logs: Vec<HabitLog>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HabitLog {
    pub id: i64,
    pub date: NaiveDate,
    #[serde(default = "default_true")]
    pub completed: bool,
    #[serde(default)]
    pub notes: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Body for creating a habit.
#[derive(Debug, Clone, Serialize)]
pub struct NewHabit {
    pub name: String,
    pub description: String,
    pub category: HabitCategory,
    pub frequency: HabitFrequency,
    pub goal_count: u32,
    pub start_date: NaiveDate,
}

/// One page of a paginated list.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// List endpoints answer with a page, or a bare array when pagination is off.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> From<ListResponse<T>> for Page<T> {
    fn from(response: ListResponse<T>) -> Self {
        match response {
            ListResponse::Paged(page) => page,
            ListResponse::Plain(results) => Page {
                count: results.len() as u64,
                next: None,
                previous: None,
                results,
            },
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_goal() -> u32 {
    1
}
