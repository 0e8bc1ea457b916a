//! Flashcard and summary generation on top of an opaque text model.

pub mod structured;

use crate::errors::{AppError, AppResult};
use crate::fs::base_name;
use crate::models::{Flashcard, FlashcardDeck, FlashcardSet, GeneratedFlashcards, LoadedDeck, SummaryResponse, VaultCatalogue};
use crate::vault::Vault;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use structured::{card_list, resolve_structured_output, validate_structured_output, FLASHCARD_LIST_SCHEMA};

pub const FLASHCARDS_DIR: &str = "Flashcards";
const DECK_TITLE: &str = "Generated Flashcards";
const MISSING_FIELD: &str = "Error";

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = AppResult<String>> + Send + 'a>>;

/// Text in, text out. Transport problems surface as `UNAVAILABLE`.
pub trait TextGenerator: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    http: reqwest::Client,
    host: String,
    model: String,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(host: impl Into<String>, model: impl Into<String>, max_retries: u32) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|error| AppError::Internal(error.to_string()))?;
        Ok(Self {
            http,
            host: host.into(),
            model: model.into(),
            max_retries,
        })
    }

    async fn generate_once(&self, prompt: &str) -> AppResult<String> {
        let endpoint = format!("{}/api/generate", self.host.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0 }
        });

        let response = self.http.post(&endpoint).json(&payload).send().await.map_err(|error| {
            AppError::Unavailable(format!(
                "Ollama unavailable at {}. Start Ollama and ensure model '{}' is installed. Error: {}",
                self.host, self.model, error
            ))
        })?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(AppError::Unavailable(format!("Ollama error ({}): {}", status, body)));
        }
        body.get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidData(format!("Ollama response missing text: {}", body)))
    }
}

impl TextGenerator for OllamaGenerator {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.generate_once(prompt).await {
                    Ok(text) => return Ok(text),
                    Err(AppError::Unavailable(message)) if attempt < self.max_retries => {
                        attempt += 1;
                        tracing::warn!(attempt, model = %self.model, error = %message, "retrying ollama request");
                        tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                    }
                    Err(error) => return Err(error),
                }
            }
        })
    }
}

fn flashcard_prompt(text: &str) -> String {
    format!(
        "Turn the following content into flashcards in .JSON format for me.\n\
         Only give me the .JSON. Don't include markdown formatting like ```json.\n\
         The structure should be an array of objects, where each object has a \"question\" and \"answer\".\n\n\
         Content:\n{}",
        text
    )
}

fn summary_prompt(text: &str) -> String {
    format!(
        "Please summarize the following text. Capture the main points and key details concisely.\n\n\
         Text:\n{}",
        text
    )
}

/// Asks the model for cards, writes the deck under `Flashcards/` and returns
/// its vault-relative path.
pub async fn generate_flashcards(
    vault: &Vault,
    generator: &dyn TextGenerator,
    text: &str,
    source: Option<&str>,
) -> AppResult<GeneratedFlashcards> {
    if text.trim().is_empty() {
        return Err(AppError::InvalidData("No text to generate flashcards from".to_string()));
    }
    let source = source.map(str::trim).filter(|path| !path.is_empty());
    if let Some(source) = source {
        vault.resolve(source)?;
    }

    tracing::info!(source = ?source, "generating flashcards");
    let completion = generator.complete(&flashcard_prompt(text)).await?;
    let flashcards = parse_flashcards(&completion)?;
    let count = flashcards.len();

    let file_name = match source {
        Some(source) => format!("{}-flashcard.json", base_name(source)),
        None => format!(
            "flashcards_{}.json",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true).replace([':', '.'], "-")
        ),
    };
    let deck = FlashcardDeck {
        title: DECK_TITLE.to_string(),
        created_at: Utc::now(),
        flashcards,
    };
    let content = serde_json::to_string_pretty(&deck).map_err(|error| AppError::Internal(error.to_string()))?;

    let vault = vault.clone();
    let relative = format!("{}/{}", FLASHCARDS_DIR, file_name);
    let file_path = relative.clone();
    tokio::task::spawn_blocking(move || {
        vault.create_folder(FLASHCARDS_DIR)?;
        vault.write_file(&relative, &content)
    })
    .await
    .map_err(|error| AppError::Internal(error.to_string()))??;

    tracing::info!(path = %file_path, count, "wrote flashcard deck");
    Ok(GeneratedFlashcards { file_path, count })
}

/// Summarizes `text` into `<base>-summarize.txt` beside the source note.
pub async fn summarize_text(
    vault: &Vault,
    generator: &dyn TextGenerator,
    text: &str,
    source: Option<&str>,
) -> AppResult<SummaryResponse> {
    let Some(source) = source.map(str::trim).filter(|path| !path.is_empty()) else {
        return Err(AppError::InvalidData(
            "No original file path provided for summary.".to_string(),
        ));
    };
    vault.resolve(source)?;

    let summary = generator.complete(&summary_prompt(text)).await?;

    let file_name = format!("{}-summarize.txt", base_name(source));
    let relative = match source.rsplit_once(['/', '\\']) {
        Some((dir, _)) => format!("{}/{}", dir, file_name),
        None => file_name,
    };

    let vault = vault.clone();
    let file_path = relative.clone();
    tokio::task::spawn_blocking(move || vault.write_file(&relative, &summary))
        .await
        .map_err(|error| AppError::Internal(error.to_string()))??;

    tracing::info!(path = %file_path, "wrote summary");
    Ok(SummaryResponse { file_path })
}

/// Cleans a raw completion into cards. Whitespace runs collapse to one
/// space and a missing or blank field becomes `"Error"`.
pub fn parse_flashcards(raw: &str) -> AppResult<Vec<Flashcard>> {
    let Some(value) = resolve_structured_output(raw) else {
        return Err(AppError::InvalidData("AI did not return valid JSON.".to_string()));
    };
    cards_from_value(value)
}

fn cards_from_value(value: Value) -> AppResult<Vec<Flashcard>> {
    let validation = validate_structured_output(Some(card_list(value)), &FLASHCARD_LIST_SCHEMA);
    if let Some(error) = validation.error {
        return Err(AppError::InvalidData(format!("{} {}", error, validation.errors.join("; "))));
    }
    let cards: Vec<Flashcard> = validation
        .value
        .as_ref()
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| Flashcard {
                    question: clean_field(item.get("question")),
                    answer: clean_field(item.get("answer")),
                })
                .collect()
        })
        .unwrap_or_default();

    if cards.is_empty() {
        return Err(AppError::InvalidData("No flashcards were generated.".to_string()));
    }
    Ok(cards)
}

fn clean_field(value: Option<&Value>) -> String {
    let collapsed = value
        .and_then(Value::as_str)
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if collapsed.is_empty() {
        MISSING_FIELD.to_string()
    } else {
        collapsed
    }
}

/// `.json` files anywhere below a `Flashcards` folder.
pub fn list_flashcard_sets(catalogue: &VaultCatalogue) -> Vec<FlashcardSet> {
    catalogue
        .files
        .iter()
        .filter(|file| file.filetype == ".json")
        .filter(|file| file.parent().split('/').any(|segment| segment == FLASHCARDS_DIR))
        .map(|file| FlashcardSet {
            name: base_name(&file.name).to_string(),
            filepath: file.filepath.clone(),
        })
        .collect()
}

pub fn load_flashcard_deck(vault: &Vault, relative: &str) -> AppResult<LoadedDeck> {
    let raw = vault.read_file(relative)?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|error| AppError::InvalidData(format!("{} is not a flashcard deck: {}", relative, error)))?;
    let cards = cards_from_value(value).map_err(|error| error.context(relative))?;
    Ok(LoadedDeck {
        name: base_name(relative).to_string(),
        cards,
    })
}
