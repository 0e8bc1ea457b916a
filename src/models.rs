use crate::errors::{ClientError, CommandResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderDescriptor {
    pub name: String,
    pub filepath: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub filepath: String,
    pub filetype: String,
}

impl FileDescriptor {
    /// Vault-relative parent directory, `""` for the vault root.
    pub fn parent(&self) -> &str {
        match self.filepath.rfind('/') {
            Some(index) => &self.filepath[..index],
            None => "",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultCatalogue {
    pub folders: Vec<FolderDescriptor>,
    pub files: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteExtension {
    #[serde(rename = ".md")]
    Markdown,
    #[serde(rename = ".txt")]
    Text,
}

impl NoteExtension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => ".md",
            Self::Text => ".txt",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventColor {
    #[default]
    Blue,
    Green,
    Orange,
    Purple,
    Red,
    Teal,
}

impl EventColor {
    pub const PALETTE: [EventColor; 6] = [
        EventColor::Blue,
        EventColor::Green,
        EventColor::Orange,
        EventColor::Purple,
        EventColor::Red,
        EventColor::Teal,
    ];

    pub fn cycled(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "blue" => Some(Self::Blue),
            "green" => Some(Self::Green),
            "orange" => Some(Self::Orange),
            "purple" => Some(Self::Purple),
            "red" => Some(Self::Red),
            "teal" => Some(Self::Teal),
            _ => None,
        }
    }
}

/// Stored colors outside the palette fall back to the default so one odd
/// record does not make the whole event file unreadable.
fn stored_color<'de, D: Deserializer<'de>>(deserializer: D) -> Result<EventColor, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw {
        None => EventColor::default(),
        Some(name) => EventColor::from_name(&name).unwrap_or_else(|| {
            tracing::warn!(color = %name, "unknown event color, using default");
            EventColor::default()
        }),
    })
}

/// A locally authored calendar event as stored in the event file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "stored_color")]
    pub color: EventColor,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<EventColor>,
}

/// Fields to overwrite on an existing event; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<EventColor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCreated {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(rename = "courseId")]
    pub course_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

/// Courses as fetched from the LMS. `warnings` carries one entry per course
/// whose assignment fetch failed; that course keeps an empty list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCourses {
    pub courses: Vec<Course>,
    #[serde(default)]
    pub warnings: Vec<ClientError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    pub title: String,
    pub full_title: String,
    pub course_name: String,
    pub color: EventColor,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEntry {
    pub id: i64,
    pub title: String,
    pub color: EventColor,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CalendarEntry {
    Remote(RemoteEntry),
    Local(LocalEntry),
}

impl CalendarEntry {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub buckets: BTreeMap<String, Vec<CalendarEntry>>,
    #[serde(default)]
    pub remote_error: Option<ClientError>,
    #[serde(default)]
    pub warnings: Vec<ClientError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub vault: CommandResult<VaultCatalogue>,
    pub courses: CommandResult<RemoteCourses>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardDeck {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSet {
    pub name: String,
    pub filepath: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedDeck {
    pub name: String,
    pub cards: Vec<Flashcard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFlashcards {
    pub file_path: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotePayload {
    #[serde(default)]
    pub folder: String,
    pub name: String,
    pub extension: NoteExtension,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePayload {
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFlashcardsPayload {
    pub text: String,
    #[serde(default)]
    pub original_file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizePayload {
    pub text: String,
    #[serde(default)]
    pub original_file_path: Option<String>,
}
