use crate::models::{CalendarEntry, Course, Event, EventColor, LocalEntry, RemoteEntry};
use chrono::{Datelike, NaiveDate, TimeZone};
use std::collections::BTreeMap;
use std::fmt;

const MAX_TITLE_CHARS: usize = 20;

/// Calendar day a merged entry is filed under. `month0` is zero-based to match
/// the keys the calendar grid renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub year: i32,
    pub month0: u32,
    pub day: u32,
}

impl BucketKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month0: date.month0(),
            day: date.day(),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.year, self.month0, self.day)
    }
}

pub type CalendarBuckets = BTreeMap<BucketKey, Vec<CalendarEntry>>;

/// Merges LMS assignments and local events into per-day buckets.
///
/// Assignments are filed by the date their due timestamp falls on in `tz`;
/// local events by their stored calendar date. `None` for `courses` (the
/// remote fetch failed) simply contributes nothing. Within a bucket every
/// remote entry precedes every local one.
pub fn merge_calendar<Tz: TimeZone>(courses: Option<&[Course]>, events: &[Event], tz: &Tz) -> CalendarBuckets {
    let mut buckets = CalendarBuckets::new();

    for (index, course) in courses.unwrap_or_default().iter().enumerate() {
        let color = EventColor::cycled(index);
        for assignment in &course.assignments {
            let Some(due_at) = assignment.due_at else {
                continue;
            };
            let local_date = due_at.with_timezone(tz).date_naive();
            buckets
                .entry(BucketKey::from_date(local_date))
                .or_default()
                .push(CalendarEntry::Remote(RemoteEntry {
                    id: assignment.id.clone(),
                    title: truncate_title(&assignment.name),
                    full_title: assignment.name.clone(),
                    course_name: course.name.clone(),
                    color,
                    due_at,
                }));
        }
    }

    for event in events {
        let date = match NaiveDate::parse_from_str(event.date.trim(), "%Y-%m-%d") {
            Ok(date) => date,
            Err(error) => {
                tracing::warn!(event_id = event.id, date = %event.date, error = %error, "skipping event with invalid date");
                continue;
            }
        };
        buckets
            .entry(BucketKey::from_date(date))
            .or_default()
            .push(CalendarEntry::Local(LocalEntry {
                id: event.id,
                title: event.title.clone(),
                color: event.color,
                time: event.time.clone(),
                description: event.description.clone(),
            }));
    }

    buckets
}

/// Same buckets keyed by their `"year-month0-day"` string.
pub fn keyed_by_string(buckets: CalendarBuckets) -> BTreeMap<String, Vec<CalendarEntry>> {
    buckets
        .into_iter()
        .map(|(key, entries)| (key.to_string(), entries))
        .collect()
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut short: String = title.chars().take(MAX_TITLE_CHARS).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Assignment;
    use chrono::{DateTime, FixedOffset, Utc};

    fn due(raw: &str) -> Option<DateTime<Utc>> {
        Some(DateTime::parse_from_rfc3339(raw).expect("timestamp").with_timezone(&Utc))
    }

    fn course(id: &str, assignments: Vec<(&str, Option<DateTime<Utc>>)>) -> Course {
        Course {
            id: id.to_string(),
            name: format!("Course {}", id),
            assignments: assignments
                .into_iter()
                .enumerate()
                .map(|(i, (name, due_at))| Assignment {
                    id: format!("{}-{}", id, i),
                    name: name.to_string(),
                    due_at,
                    course_id: id.to_string(),
                })
                .collect(),
        }
    }

    fn local(id: i64, date: &str) -> Event {
        Event {
            id,
            title: format!("Event {}", id),
            date: date.to_string(),
            time: Some("09:00".to_string()),
            description: None,
            color: EventColor::Orange,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn remote_and_local_share_a_day_bucket() {
        let courses = vec![course("A", vec![("Essay", due("2025-10-18T23:59:00Z"))])];
        let events = vec![local(1, "2025-10-18")];
        let buckets = merge_calendar(Some(courses.as_slice()), &events, &Utc);

        let key = BucketKey { year: 2025, month0: 9, day: 18 };
        let entries = buckets.get(&key).expect("bucket");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_remote());
        assert!(!entries[1].is_remote());
        assert_eq!(key.to_string(), "2025-9-18");
    }

    #[test]
    fn due_dates_bucket_by_local_calendar_day() {
        let courses = vec![course("A", vec![("Late", due("2025-10-18T23:59:00Z"))])];
        let plus_two = FixedOffset::east_opt(2 * 3600).expect("offset");
        let buckets = merge_calendar(Some(courses.as_slice()), &[], &plus_two);
        assert!(buckets.contains_key(&BucketKey { year: 2025, month0: 9, day: 19 }));
    }

    #[test]
    fn local_dates_are_not_shifted_by_timezone() {
        let minus_ten = FixedOffset::west_opt(10 * 3600).expect("offset");
        let buckets = merge_calendar(None, &[local(1, "2025-01-01")], &minus_ten);
        assert!(buckets.contains_key(&BucketKey { year: 2025, month0: 0, day: 1 }));
    }

    #[test]
    fn failed_course_fetch_contributes_nothing() {
        let buckets = merge_calendar(None, &[local(1, "2025-10-18")], &Utc);
        assert_eq!(buckets.values().flatten().filter(|e| e.is_remote()).count(), 0);
        assert_eq!(buckets.values().flatten().count(), 1);
    }

    #[test]
    fn undated_assignments_and_bad_local_dates_are_skipped() {
        let courses = vec![course("A", vec![("No due date", None)])];
        let buckets = merge_calendar(Some(courses.as_slice()), &[local(2, "not-a-date")], &Utc);
        assert!(buckets.is_empty());
    }

    #[test]
    fn course_colors_cycle_through_palette_and_titles_truncate() {
        let courses: Vec<Course> = (0..7)
            .map(|i| {
                course(
                    &i.to_string(),
                    vec![("A very long assignment title indeed", due("2025-03-01T12:00:00Z"))],
                )
            })
            .collect();
        let buckets = merge_calendar(Some(courses.as_slice()), &[], &Utc);
        let entries = buckets
            .get(&BucketKey { year: 2025, month0: 2, day: 1 })
            .expect("bucket");
        let colors: Vec<EventColor> = entries
            .iter()
            .map(|entry| match entry {
                CalendarEntry::Remote(remote) => remote.color,
                CalendarEntry::Local(local) => local.color,
            })
            .collect();
        assert_eq!(colors[0], EventColor::PALETTE[0]);
        assert_eq!(colors[6], EventColor::PALETTE[0]);
        assert_eq!(colors[1], EventColor::PALETTE[1]);

        let CalendarEntry::Remote(first) = &entries[0] else {
            panic!("expected remote entry");
        };
        assert_eq!(first.title, "A very long assignme...");
        assert_eq!(first.full_title, "A very long assignment title indeed");
    }

    #[test]
    fn merge_is_deterministic() {
        let courses = vec![course("A", vec![("Essay", due("2025-10-18T10:00:00Z"))])];
        let events = vec![local(1, "2025-10-18"), local(2, "2025-10-19")];
        assert_eq!(
            merge_calendar(Some(courses.as_slice()), &events, &Utc),
            merge_calendar(Some(courses.as_slice()), &events, &Utc)
        );
    }
}
