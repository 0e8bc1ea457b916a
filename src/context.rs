use crate::ai::{self, OllamaGenerator, TextGenerator};
use crate::calendar::{keyed_by_string, merge_calendar};
use crate::canvas::CanvasClient;
use crate::config::{self, AppPaths, AppSettings};
use crate::debounce::SaveDebouncer;
use crate::errors::{AppError, AppResult, ClientError};
use crate::events::EventStore;
use crate::export::{self, CommandPdfRenderer, PdfRenderer, UnconfiguredRenderer};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::models::{
    BooleanResponse, CalendarView, CreateNotePayload, DashboardSnapshot, Event, EventCreated, EventDraft,
    EventUpdate, ExportResponse, FileContent, FlashcardSet, GenerateFlashcardsPayload, GeneratedFlashcards,
    LoadedDeck, RemoteCourses, RenamePayload, SummarizePayload, SummaryResponse, VaultCatalogue,
};
use crate::vault::Vault;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Collaborators supplied by the caller. Whatever is left `None` is built
/// from settings and rebuilt whenever settings change.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub fs: Option<Arc<dyn FileSystem>>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub renderer: Option<Arc<dyn PdfRenderer>>,
    /// Runtime for debounced-save timers. Defaults to the runtime current
    /// during [`AppContext::initialize`].
    pub runtime: Option<tokio::runtime::Handle>,
}

/// Everything a running app session needs, created once at startup and
/// torn down with [`AppContext::shutdown`].
pub struct AppContext {
    paths: AppPaths,
    settings: RwLock<AppSettings>,
    vault: Vault,
    events: Arc<EventStore>,
    debouncer: SaveDebouncer,
    canvas: RwLock<Option<CanvasClient>>,
    generator: RwLock<Arc<dyn TextGenerator>>,
    renderer: RwLock<Arc<dyn PdfRenderer>>,
    injected: Collaborators,
    keyring_lock: Mutex<()>,
}

impl AppContext {
    pub fn initialize(paths: AppPaths, settings: AppSettings, injected: Collaborators) -> AppResult<Self> {
        std::fs::create_dir_all(&paths.data_dir).map_err(|error| AppError::from(error).context("create data dir"))?;

        let fs: Arc<dyn FileSystem> = match injected.fs.clone() {
            Some(fs) => fs,
            None => Arc::new(LocalFileSystem),
        };
        let vault = Vault::new(paths.vault_root(), fs.clone());
        vault.ensure_root().map_err(|error| error.context("create vault"))?;

        let events = Arc::new(EventStore::new(paths.events_file()));
        events.init()?;

        let mut debouncer = SaveDebouncer::new(fs, Duration::from_millis(settings.save_debounce_ms));
        if let Some(runtime) = injected.runtime.clone() {
            debouncer = debouncer.with_runtime(runtime);
        }
        let generator = match injected.generator.clone() {
            Some(generator) => generator,
            None => default_generator(&settings)?,
        };
        let renderer = injected.renderer.clone().unwrap_or_else(|| default_renderer(&settings));
        let canvas = canvas_client(&settings);

        tracing::info!(
            vault = %paths.vault_root().to_string_lossy(),
            events = %paths.events_file().to_string_lossy(),
            canvas_configured = canvas.is_some(),
            "app context initialized"
        );

        Ok(Self {
            paths,
            settings: RwLock::new(settings),
            vault,
            events,
            debouncer,
            canvas: RwLock::new(canvas),
            generator: RwLock::new(generator),
            renderer: RwLock::new(renderer),
            injected,
            keyring_lock: Mutex::new(()),
        })
    }

    /// Writes out pending editor saves.
    pub async fn shutdown(&self) {
        let flushed = self.debouncer.flush().await;
        tracing::info!(flushed, "app context shut down");
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub async fn scan_vault(&self) -> AppResult<VaultCatalogue> {
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || vault.scan())
            .await
            .map_err(|error| AppError::Internal(error.to_string()))
    }

    pub fn vault_path(&self) -> String {
        self.vault.root().to_string_lossy().to_string()
    }

    pub fn read_file(&self, path: &str) -> AppResult<FileContent> {
        self.vault.read_file(path).map(|content| FileContent { content })
    }

    /// Immediate write. Supersedes any debounced save still pending for the
    /// same file.
    pub fn write_file(&self, path: &str, content: &str) -> AppResult<BooleanResponse> {
        self.debouncer.cancel(&self.vault.resolve(path)?);
        self.vault.write_file(path, content)?;
        Ok(BooleanResponse { success: true })
    }

    /// Debounced variant of [`AppContext::write_file`] for editor keystrokes.
    pub fn schedule_save(&self, path: &str, content: String) -> AppResult<BooleanResponse> {
        let target = self.vault.resolve(path)?;
        if target == self.vault.root() {
            return Err(AppError::Policy("Cannot save over the vault root".to_string()));
        }
        self.debouncer.schedule(target, content)?;
        Ok(BooleanResponse { success: true })
    }

    pub fn create_note(&self, payload: CreateNotePayload) -> AppResult<String> {
        self.vault.create_note(&payload.folder, &payload.name, payload.extension)
    }

    pub fn create_folder(&self, name: &str) -> AppResult<String> {
        self.vault.create_folder(name)
    }

    pub fn delete_file(&self, path: &str) -> AppResult<BooleanResponse> {
        self.debouncer.cancel(&self.vault.resolve(path)?);
        self.vault.delete_file(path)?;
        Ok(BooleanResponse { success: true })
    }

    pub fn delete_folder(&self, path: &str) -> AppResult<BooleanResponse> {
        let dropped = self.debouncer.take_under(&self.vault.resolve(path)?).len();
        if dropped > 0 {
            tracing::info!(path = %path, dropped, "discarded pending saves in deleted folder");
        }
        self.vault.delete_folder(path)?;
        Ok(BooleanResponse { success: true })
    }

    /// Pending saves under the old path are written out first so the edits
    /// move with the item instead of recreating it.
    pub fn rename_item(&self, payload: RenamePayload) -> AppResult<String> {
        for (target, content) in self.debouncer.take_under(&self.vault.resolve(&payload.old_path)?) {
            self.vault.write_file(&self.vault.relative_path(&target), &content)?;
        }
        self.vault.rename_item(&payload.old_path, &payload.new_path)
    }

    pub async fn export_pdf(&self, path: &str) -> AppResult<ExportResponse> {
        let vault = self.vault.clone();
        let renderer = self.renderer.read().await.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || export::export_pdf(&vault, renderer.as_ref(), &path))
            .await
            .map_err(|error| AppError::Internal(error.to_string()))?
    }

    pub async fn fetch_canvas_data(&self) -> AppResult<RemoteCourses> {
        let client = self.canvas.read().await.clone();
        let Some(client) = client else {
            return Err(AppError::Unavailable(
                "Canvas is not configured; set CANVAS_DOMAIN and CANVAS_API_KEY".to_string(),
            ));
        };
        client.fetch_courses().await
    }

    /// Scans the vault and fetches courses side by side. Each half succeeds
    /// or fails on its own.
    pub async fn load_dashboard(&self) -> DashboardSnapshot {
        let (vault, courses) = tokio::join!(self.scan_vault(), self.fetch_canvas_data());
        DashboardSnapshot {
            vault: vault.into(),
            courses: courses.into(),
        }
    }

    /// Remote assignments and local events merged per day in the local
    /// timezone. A failed remote fetch still yields the local entries.
    pub async fn calendar_view(&self) -> AppResult<CalendarView> {
        let events = self.events.clone();
        let local = async move {
            tokio::task::spawn_blocking(move || events.list())
                .await
                .map_err(|error| AppError::Internal(error.to_string()))
        };
        let (remote, local) = tokio::join!(self.fetch_canvas_data(), local);
        let events = local?;

        let (courses, remote_error, warnings) = match remote {
            Ok(remote) => (Some(remote.courses), None, remote.warnings),
            Err(error) => {
                tracing::warn!(error = %error, "calendar shows local events only");
                (None, Some(ClientError::from(error)), Vec::new())
            }
        };
        let buckets = merge_calendar(courses.as_deref(), &events, &chrono::Local);
        Ok(CalendarView {
            buckets: keyed_by_string(buckets),
            remote_error,
            warnings,
        })
    }

    pub async fn generate_flashcards(&self, payload: GenerateFlashcardsPayload) -> AppResult<GeneratedFlashcards> {
        let generator = self.generator.read().await.clone();
        ai::generate_flashcards(
            &self.vault,
            generator.as_ref(),
            &payload.text,
            payload.original_file_path.as_deref(),
        )
        .await
    }

    pub async fn summarize_text(&self, payload: SummarizePayload) -> AppResult<SummaryResponse> {
        let generator = self.generator.read().await.clone();
        ai::summarize_text(
            &self.vault,
            generator.as_ref(),
            &payload.text,
            payload.original_file_path.as_deref(),
        )
        .await
    }

    pub async fn list_flashcard_sets(&self) -> AppResult<Vec<FlashcardSet>> {
        let catalogue = self.scan_vault().await?;
        Ok(ai::list_flashcard_sets(&catalogue))
    }

    pub fn load_flashcard_deck(&self, path: &str) -> AppResult<LoadedDeck> {
        ai::load_flashcard_deck(&self.vault, path)
    }

    pub fn events_list(&self) -> Vec<Event> {
        self.events.list()
    }

    pub fn event_add(&self, draft: EventDraft) -> AppResult<EventCreated> {
        self.events.add(draft)
    }

    pub fn event_update(&self, update: EventUpdate) -> AppResult<Event> {
        self.events.update(update)
    }

    pub fn event_delete(&self, id: i64) -> AppResult<BooleanResponse> {
        self.events.delete(id)?;
        Ok(BooleanResponse { success: true })
    }

    pub async fn get_settings(&self) -> AppSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, patch: serde_json::Value) -> AppResult<AppSettings> {
        let updated = {
            let mut settings = self.settings.write().await;
            let updated = settings.merged(patch)?;
            updated.save(&self.paths)?;
            *settings = updated.clone();
            updated
        };
        self.apply_runtime_settings(&updated).await?;
        tracing::info!("settings updated");
        Ok(updated)
    }

    pub async fn save_canvas_token(&self, token: String) -> AppResult<BooleanResponse> {
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(AppError::InvalidData("Canvas token cannot be empty".to_string()));
        }
        let _guard = self.keyring_lock.lock().await;
        config::save_canvas_token(&token)?;
        self.set_canvas_token(Some(token)).await?;
        Ok(BooleanResponse { success: true })
    }

    pub async fn clear_canvas_token(&self) -> AppResult<BooleanResponse> {
        let _guard = self.keyring_lock.lock().await;
        config::clear_canvas_token()?;
        self.set_canvas_token(None).await?;
        Ok(BooleanResponse { success: true })
    }

    pub async fn has_canvas_token(&self) -> BooleanResponse {
        let settings = self.settings.read().await;
        BooleanResponse {
            success: settings.canvas_token.is_some(),
        }
    }

    async fn set_canvas_token(&self, token: Option<String>) -> AppResult<()> {
        let updated = {
            let mut settings = self.settings.write().await;
            settings.canvas_token = token;
            settings.clone()
        };
        self.apply_runtime_settings(&updated).await
    }

    // The debounce interval is fixed for the session; pending saves keep their timers.
    async fn apply_runtime_settings(&self, settings: &AppSettings) -> AppResult<()> {
        *self.canvas.write().await = canvas_client(settings);
        if self.injected.generator.is_none() {
            *self.generator.write().await = default_generator(settings)?;
        }
        if self.injected.renderer.is_none() {
            *self.renderer.write().await = default_renderer(settings);
        }
        Ok(())
    }
}

fn default_generator(settings: &AppSettings) -> AppResult<Arc<dyn TextGenerator>> {
    let generator = OllamaGenerator::new(
        settings.ollama_host.clone(),
        settings.ollama_model.clone(),
        settings.ai_max_retries,
    )?;
    Ok(Arc::new(generator))
}

fn default_renderer(settings: &AppSettings) -> Arc<dyn PdfRenderer> {
    let timeout = Duration::from_millis(settings.pdf_timeout_ms);
    match settings
        .pdf_converter
        .as_deref()
        .and_then(|command| CommandPdfRenderer::from_command_line(command, timeout))
    {
        Some(renderer) => Arc::new(renderer) as Arc<dyn PdfRenderer>,
        None => Arc::new(UnconfiguredRenderer),
    }
}

fn canvas_client(settings: &AppSettings) -> Option<CanvasClient> {
    let config = settings.canvas_config()?;
    match CanvasClient::new(config) {
        Ok(client) => Some(client),
        Err(error) => {
            tracing::warn!(error = %error, "could not build canvas client");
            None
        }
    }
}
