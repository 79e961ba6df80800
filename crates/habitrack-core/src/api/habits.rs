//! Habit and analytics endpoints.
//!
//! Streaks, completion rates and analytics are computed by the server; the
//! statistics payloads are handed back untouched.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};

use super::{ApiError, ApiRequest, RequestPipeline, Transport};
use crate::models::habit::ListResponse;
use crate::models::{Habit, HabitLog, HabitSummary, NewHabit, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsView {
    Overview,
    Weekly,
    Monthly,
}

impl AnalyticsView {
    fn path(&self) -> &'static str {
        match self {
            AnalyticsView::Overview => "/habits/analytics/overview/",
            AnalyticsView::Weekly => "/habits/analytics/weekly/",
            AnalyticsView::Monthly => "/habits/analytics/monthly/",
        }
    }
}

pub struct HabitsApi<T> {
    pipeline: Arc<RequestPipeline<T>>,
}

impl<T: Transport> HabitsApi<T> {
    pub fn new(pipeline: Arc<RequestPipeline<T>>) -> Self {
        Self { pipeline }
    }

    pub async fn list(&self, page: u32) -> Result<Page<HabitSummary>, ApiError> {
        let response: ListResponse<HabitSummary> = self
            .pipeline
            .fetch(ApiRequest::get(format!("/habits/?page={}", page.max(1))))
            .await?;
        Ok(response.into())
    }

    pub async fn create(&self, habit: &NewHabit) -> Result<Habit, ApiError> {
        self.pipeline.fetch(ApiRequest::post("/habits/").json(habit)).await
    }

    pub async fn retrieve(&self, id: i64) -> Result<Habit, ApiError> {
        self.pipeline.fetch(ApiRequest::get(habit_path(id))).await
    }

    /// Partial update; `changes` holds only the fields to modify.
    pub async fn update(&self, id: i64, changes: &Value) -> Result<Habit, ApiError> {
        self.pipeline.fetch(ApiRequest::patch(habit_path(id)).json(changes)).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.pipeline.send(ApiRequest::delete(habit_path(id))).await?;
        Ok(())
    }

    pub async fn log(&self, id: i64, date: NaiveDate, notes: &str) -> Result<HabitLog, ApiError> {
        let body = json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "completed": true,
            "notes": notes,
        });
        self.pipeline
            .fetch(ApiRequest::post(format!("/habits/{}/log/", id)).json(&body))
            .await
    }

    pub async fn stats(&self, id: i64) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::get(format!("/habits/{}/stats/", id))).await
    }

    /// Fetch a habit and its statistics concurrently. Fails if either fails.
    pub async fn detail_with_stats(&self, id: i64) -> Result<(Habit, Value), ApiError> {
        futures::try_join!(self.retrieve(id), self.stats(id))
    }

    pub async fn analytics(&self, view: AnalyticsView) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::get(view.path())).await
    }
}

fn habit_path(id: i64) -> String {
    format!("/habits/{}/", id)
}
