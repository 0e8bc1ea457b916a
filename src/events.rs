use crate::errors::{AppError, AppResult};
use crate::fs::{read_json_file, write_json_file};
use crate::models::{Event, EventCreated, EventDraft, EventUpdate};
use chrono::{NaiveDate, NaiveTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const EVENTS_FILE_NAME: &str = "memoura_events.json";

/// Locally authored calendar events, kept as one JSON array on disk.
///
/// Every mutation reads the whole file, changes it in memory and rewrites it.
/// The mutex only serializes callers inside this process.
pub struct EventStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates an empty store if and only if the file is missing.
    pub fn init(&self) -> AppResult<()> {
        let _guard = self.guard()?;
        if self.path.exists() {
            tracing::info!(path = %self.path.to_string_lossy(), "events file found");
            return Ok(());
        }
        write_json_file(&self.path, &Vec::<Event>::new())?;
        tracing::info!(path = %self.path.to_string_lossy(), "created events file");
        Ok(())
    }

    /// All stored events. A missing or unreadable file reads as empty.
    pub fn list(&self) -> Vec<Event> {
        let _guard = match self.guard() {
            Ok(guard) => guard,
            Err(error) => {
                tracing::warn!(error = %error, "event store unavailable; returning no events");
                return Vec::new();
            }
        };
        match self.load() {
            Ok(events) => events,
            Err(error) => {
                tracing::warn!(path = %self.path.to_string_lossy(), error = %error, "could not read events");
                Vec::new()
            }
        }
    }

    pub fn add(&self, draft: EventDraft) -> AppResult<EventCreated> {
        let title = required_title(&draft.title)?;
        let date = validate_date(&draft.date)?;
        let time = normalize_time(draft.time)?;

        let _guard = self.guard()?;
        let mut events = self.load_for_update()?;
        let now = Utc::now();
        let id = next_event_id(&events, now.timestamp_millis());
        events.push(Event {
            id,
            title,
            date,
            time,
            description: normalize_text(draft.description),
            color: draft.color.unwrap_or_default(),
            created_at: now,
        });
        write_json_file(&self.path, &events)?;
        tracing::info!(event_id = id, "added event");
        Ok(EventCreated { id })
    }

    pub fn update(&self, update: EventUpdate) -> AppResult<Event> {
        let _guard = self.guard()?;
        let mut events = self.load_for_update()?;
        let Some(existing) = events.iter_mut().find(|event| event.id == update.id) else {
            return Err(AppError::NotFound(format!("Event {} not found", update.id)));
        };

        if let Some(title) = update.title {
            existing.title = required_title(&title)?;
        }
        if let Some(date) = update.date {
            existing.date = validate_date(&date)?;
        }
        if let Some(time) = update.time {
            existing.time = normalize_time(Some(time))?;
        }
        if let Some(description) = update.description {
            existing.description = normalize_text(Some(description));
        }
        if let Some(color) = update.color {
            existing.color = color;
        }

        let updated = existing.clone();
        write_json_file(&self.path, &events)?;
        tracing::info!(event_id = updated.id, "updated event");
        Ok(updated)
    }

    /// Removing an id that is not stored succeeds without changes.
    pub fn delete(&self, id: i64) -> AppResult<()> {
        let _guard = self.guard()?;
        let mut events = self.load_for_update()?;
        let before = events.len();
        events.retain(|event| event.id != id);
        write_json_file(&self.path, &events)?;
        if events.len() == before {
            tracing::debug!(event_id = id, "delete of unknown event id");
        } else {
            tracing::info!(event_id = id, "deleted event");
        }
        Ok(())
    }

    fn guard(&self) -> AppResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| AppError::Internal("event store mutex poisoned".to_string()))
    }

    fn load(&self) -> AppResult<Vec<Event>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_json_file(&self.path)
    }

    // A file that exists but does not parse is never overwritten.
    fn load_for_update(&self) -> AppResult<Vec<Event>> {
        self.load().map_err(|error| match error {
            AppError::InvalidData(message) => AppError::InvalidData(format!(
                "events file is corrupt, refusing to overwrite it: {}",
                message
            )),
            other => other,
        })
    }
}

/// Millisecond timestamp, bumped past the highest stored id so that rapid
/// successive creates stay unique and increasing.
pub fn next_event_id(events: &[Event], now_ms: i64) -> i64 {
    let highest = events.iter().map(|event| event.id).max().unwrap_or(i64::MIN);
    now_ms.max(highest.saturating_add(1))
}

fn required_title(title: &str) -> AppResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidData("Event title cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_date(date: &str) -> AppResult<String> {
    let trimmed = date.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidData(format!("Event date must be YYYY-MM-DD, got '{}'", date)))?;
    Ok(trimmed.to_string())
}

fn normalize_time(time: Option<String>) -> AppResult<Option<String>> {
    let Some(time) = normalize_text(time) else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(&time, "%H:%M")
        .map_err(|_| AppError::InvalidData(format!("Event time must be HH:MM, got '{}'", time)))?;
    Ok(Some(time))
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
