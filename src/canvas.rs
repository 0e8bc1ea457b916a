//! Read-only client for the Canvas LMS course and assignment endpoints.

use crate::errors::{AppError, AppResult, ClientError};
use crate::models::{Assignment, Course, RemoteCourses};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_COURSES_ENDPOINT: &str = "/api/v1/courses";

static LARGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([:\[,]\s*)(\d{10,})").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasConfig {
    pub domain: String,
    pub token: String,
    pub courses_endpoint: String,
}

#[derive(Debug, Clone)]
pub struct CanvasClient {
    http: reqwest::Client,
    config: CanvasConfig,
}

impl CanvasClient {
    pub fn new(config: CanvasConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| AppError::Internal(error.to_string()))?;
        Ok(Self { http, config })
    }

    /// Active courses with their assignments. Course-level failure is an
    /// error; a failed assignment fetch only empties that course.
    pub async fn fetch_courses(&self) -> AppResult<RemoteCourses> {
        let raw = self
            .fetch_json(&self.config.courses_endpoint, &[("enrollment_state", "active")])
            .await
            .map_err(|error| error.context("fetch courses"))?;
        let courses = parse_courses(raw)?;
        Ok(gather_assignments(courses, |course_id| self.fetch_assignments(course_id)).await)
    }

    pub async fn fetch_assignments(&self, course_id: String) -> AppResult<Vec<Assignment>> {
        let endpoint = format!("/api/v1/courses/{}/assignments", course_id);
        let raw = self.fetch_json(&endpoint, &[]).await?;
        parse_assignments(raw, &course_id)
    }

    async fn fetch_json(&self, endpoint: &str, query: &[(&str, &str)]) -> AppResult<Value> {
        let url = format!("{}{}", self.config.domain.trim_end_matches('/'), endpoint);
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "canvas api error");
            return Err(AppError::Unavailable(format!("Canvas API error: {}", status)));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            tracing::warn!(url = %url, "canvas api returned an empty body");
            return Ok(Value::Array(Vec::new()));
        }
        serde_json::from_str(&quote_large_numbers(&text))
            .map_err(|error| AppError::InvalidData(format!("Canvas response from {}: {}", endpoint, error)))
    }
}

/// Quotes integer literals of ten or more digits so they survive parsing as
/// strings instead of losing precision. Decimals are left alone.
pub fn quote_large_numbers(text: &str) -> String {
    LARGE_NUMBER
        .replace_all(text, |caps: &Captures<'_>| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let end = caps.get(0).map(|m| m.end()).unwrap_or_default();
            if matches!(text[end..].chars().next(), Some('.' | 'e' | 'E')) {
                return whole.to_string();
            }
            format!("{}\"{}\"", &caps[1], &caps[2])
        })
        .into_owned()
}

/// Fetches every course's assignments concurrently and waits for all of them.
pub async fn gather_assignments<F, Fut>(courses: Vec<Course>, fetch: F) -> RemoteCourses
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = AppResult<Vec<Assignment>>>,
{
    let results = join_all(courses.iter().map(|course| fetch(course.id.clone()))).await;

    let mut warnings = Vec::new();
    let courses = courses
        .into_iter()
        .zip(results)
        .map(|(mut course, result)| {
            match result {
                Ok(assignments) => course.assignments = assignments,
                Err(error) => {
                    tracing::warn!(course = %course.name, error = %error, "failed to fetch assignments");
                    warnings.push(ClientError::from(AppError::PartialFailure(format!(
                        "assignments for course '{}' ({}): {}",
                        course.name, course.id, error
                    ))));
                    course.assignments = Vec::new();
                }
            }
            course
        })
        .collect();

    RemoteCourses { courses, warnings }
}

pub fn parse_courses(raw: Value) -> AppResult<Vec<Course>> {
    let Value::Array(items) = raw else {
        return Err(AppError::InvalidData(format!("Courses response is not a list: {}", snippet(&raw))));
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let id = id_string(item.get("id")?)?;
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Course {}", id));
            Some(Course {
                id,
                name,
                assignments: Vec::new(),
            })
        })
        .collect())
}

pub fn parse_assignments(raw: Value, course_id: &str) -> AppResult<Vec<Assignment>> {
    let Value::Array(items) = raw else {
        return Err(AppError::InvalidData(format!(
            "Assignments response is not a list: {}",
            snippet(&raw)
        )));
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let id = id_string(item.get("id")?)?;
            let due_at = item.get("due_at").and_then(Value::as_str).and_then(|raw| {
                match DateTime::parse_from_rfc3339(raw) {
                    Ok(value) => Some(value.with_timezone(&Utc)),
                    Err(error) => {
                        tracing::warn!(assignment = %id, due_at = %raw, error = %error, "ignoring unparseable due date");
                        None
                    }
                }
            });
            Some(Assignment {
                name: item
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("Untitled assignment")
                    .to_string(),
                id,
                due_at,
                course_id: course_id.to_string(),
            })
        })
        .collect())
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn snippet(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 200 {
        format!("{}...", text.chars().take(200).collect::<String>())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{keyed_by_string, merge_calendar};
    use crate::models::CalendarEntry;
    use serde_json::json;

    #[test]
    fn quotes_long_integers_only() {
        let raw = r#"{"id": 12345678901234567, "ids":[1234567890,42], "score": 12345678901.5, "n": 123}"#;
        let quoted = quote_large_numbers(raw);
        assert_eq!(
            quoted,
            r#"{"id": "12345678901234567", "ids":["1234567890",42], "score": 12345678901.5, "n": 123}"#
        );
        let value: Value = serde_json::from_str(&quoted).expect("still json");
        assert_eq!(value["id"], "12345678901234567");
    }

    #[test]
    fn parses_courses_with_string_or_numeric_ids() {
        let courses = parse_courses(json!([
            {"id": "98765432101234", "name": "Physics"},
            {"id": 17, "name": "Art"},
            {"name": "no id"}
        ]))
        .expect("courses");
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].id, "98765432101234");
        assert_eq!(courses[1].id, "17");
    }

    #[test]
    fn non_list_course_payload_is_invalid_data() {
        let error = parse_courses(json!({"errors": [{"message": "Invalid access token."}]}))
            .expect_err("object payload");
        assert_eq!(error.code(), "INVALID_DATA");
    }

    #[test]
    fn parses_assignment_due_dates() {
        let assignments = parse_assignments(
            json!([
                {"id": 1, "name": "Essay", "due_at": "2025-10-18T23:59:00Z"},
                {"id": 2, "name": "Reading", "due_at": null},
                {"id": 3, "name": "Broken", "due_at": "tomorrow"}
            ]),
            "55",
        )
        .expect("assignments");
        assert_eq!(assignments.len(), 3);
        assert!(assignments[0].due_at.is_some());
        assert!(assignments[1].due_at.is_none());
        assert!(assignments[2].due_at.is_none());
        assert!(assignments.iter().all(|a| a.course_id == "55"));
    }

    #[tokio::test]
    async fn one_failing_course_does_not_affect_siblings() {
        let courses = parse_courses(json!([
            {"id": 1, "name": "A"},
            {"id": 2, "name": "B"}
        ]))
        .expect("courses");

        let remote = gather_assignments(courses, |course_id| async move {
            if course_id == "2" {
                return Err(AppError::Unavailable("Canvas API error: 500".to_string()));
            }
            parse_assignments(
                json!([{"id": 10, "name": "Lab", "due_at": "2025-10-18T12:00:00Z"}]),
                &course_id,
            )
        })
        .await;

        assert_eq!(remote.courses.len(), 2);
        assert_eq!(remote.courses[0].assignments.len(), 1);
        assert!(remote.courses[1].assignments.is_empty());
        assert_eq!(remote.warnings.len(), 1);
        assert_eq!(remote.warnings[0].code, "PARTIAL_FAILURE");
        assert!(remote.warnings[0].message.contains("'B'"));
    }

    #[tokio::test]
    async fn failed_course_leaves_only_sibling_assignments_on_the_calendar() {
        let courses = parse_courses(json!([
            {"id": 1, "name": "A"},
            {"id": 2, "name": "B"}
        ]))
        .expect("courses");
        let remote = gather_assignments(courses, |course_id| async move {
            if course_id == "2" {
                return Err(AppError::Unavailable("Canvas API error: 500".to_string()));
            }
            parse_assignments(
                json!([{"id": 10, "name": "Lab report", "due_at": "2025-10-18T12:00:00Z"}]),
                &course_id,
            )
        })
        .await;

        let buckets = keyed_by_string(merge_calendar(Some(&remote.courses), &[], &chrono::Utc));
        let day = buckets.get("2025-9-18").expect("course A bucket");
        assert_eq!(day.len(), 1);
        let CalendarEntry::Remote(entry) = &day[0] else {
            panic!("expected a remote entry");
        };
        assert_eq!(entry.course_name, "A");
        assert_eq!(entry.full_title, "Lab report");

        let from_b = buckets.values().flatten().any(|entry| match entry {
            CalendarEntry::Remote(remote) => remote.course_name == "B",
            CalendarEntry::Local(_) => false,
        });
        assert!(!from_b);
    }
}
