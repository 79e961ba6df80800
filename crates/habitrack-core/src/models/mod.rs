//! Data models for the habit tracker API.
//!
//! - `UserProfile`: the authenticated user, kept opaque
//! - `Habit`, `HabitSummary`, `HabitLog`: habits and their completion logs
//! - `Page`: paginated list responses

pub mod habit;
pub mod user;

pub use habit::{Habit, HabitCategory, HabitFrequency, HabitLog, HabitSummary, NewHabit, Page};
pub use user::UserProfile;
