use crate::config::{AppPaths, AppSettings};
use crate::context::{AppContext, Collaborators};
use crate::errors::{AppError, CommandResult};
use crate::init_tracing;
use crate::models::{
    BooleanResponse, CalendarView, CreateNotePayload, DashboardSnapshot, Event, EventCreated, EventDraft,
    EventUpdate, ExportResponse, FileContent, FlashcardSet, GenerateFlashcardsPayload, GeneratedFlashcards,
    LoadedDeck, RemoteCourses, RenamePayload, SummarizePayload, SummaryResponse, VaultCatalogue,
};
use std::sync::Arc;
use tauri::{AppHandle, Manager, RunEvent};

#[derive(Clone)]
struct AppState {
    context: Arc<AppContext>,
}

fn context(app: &AppHandle) -> Arc<AppContext> {
    app.state::<AppState>().context.clone()
}

#[tauri::command]
async fn scan_vault(app: AppHandle) -> CommandResult<VaultCatalogue> {
    context(&app).scan_vault().await.into()
}

#[tauri::command]
fn get_vault_path(state: tauri::State<'_, AppState>) -> CommandResult<String> {
    CommandResult::ok(state.context.vault_path())
}

#[tauri::command]
fn read_file(state: tauri::State<'_, AppState>, path: String) -> CommandResult<FileContent> {
    state.context.read_file(&path).into()
}

#[tauri::command]
fn write_file(state: tauri::State<'_, AppState>, path: String, content: String) -> CommandResult<BooleanResponse> {
    state.context.write_file(&path, &content).into()
}

#[tauri::command]
async fn schedule_save(app: AppHandle, path: String, content: String) -> CommandResult<BooleanResponse> {
    context(&app).schedule_save(&path, content).into()
}

#[tauri::command]
fn create_note(state: tauri::State<'_, AppState>, payload: CreateNotePayload) -> CommandResult<String> {
    state.context.create_note(payload).into()
}

#[tauri::command]
fn create_folder(state: tauri::State<'_, AppState>, name: String) -> CommandResult<String> {
    state.context.create_folder(&name).into()
}

#[tauri::command]
fn delete_file(state: tauri::State<'_, AppState>, path: String) -> CommandResult<BooleanResponse> {
    state.context.delete_file(&path).into()
}

#[tauri::command]
fn delete_folder(state: tauri::State<'_, AppState>, path: String) -> CommandResult<BooleanResponse> {
    state.context.delete_folder(&path).into()
}

#[tauri::command]
fn rename_item(state: tauri::State<'_, AppState>, payload: RenamePayload) -> CommandResult<String> {
    state.context.rename_item(payload).into()
}

#[tauri::command]
async fn export_pdf(app: AppHandle, path: String) -> CommandResult<ExportResponse> {
    context(&app).export_pdf(&path).await.into()
}

#[tauri::command]
async fn fetch_canvas_data(app: AppHandle) -> CommandResult<RemoteCourses> {
    context(&app).fetch_canvas_data().await.into()
}

#[tauri::command]
async fn load_dashboard(app: AppHandle) -> CommandResult<DashboardSnapshot> {
    CommandResult::ok(context(&app).load_dashboard().await)
}

#[tauri::command]
async fn calendar_view(app: AppHandle) -> CommandResult<CalendarView> {
    context(&app).calendar_view().await.into()
}

#[tauri::command]
async fn generate_flashcards(app: AppHandle, payload: GenerateFlashcardsPayload) -> CommandResult<GeneratedFlashcards> {
    context(&app).generate_flashcards(payload).await.into()
}

#[tauri::command]
async fn summarize_text(app: AppHandle, payload: SummarizePayload) -> CommandResult<SummaryResponse> {
    context(&app).summarize_text(payload).await.into()
}

#[tauri::command]
async fn list_flashcard_sets(app: AppHandle) -> CommandResult<Vec<FlashcardSet>> {
    context(&app).list_flashcard_sets().await.into()
}

#[tauri::command]
fn load_flashcard_deck(state: tauri::State<'_, AppState>, path: String) -> CommandResult<LoadedDeck> {
    state.context.load_flashcard_deck(&path).into()
}

#[tauri::command]
fn events_list(state: tauri::State<'_, AppState>) -> CommandResult<Vec<Event>> {
    CommandResult::ok(state.context.events_list())
}

#[tauri::command]
fn event_add(state: tauri::State<'_, AppState>, payload: EventDraft) -> CommandResult<EventCreated> {
    state.context.event_add(payload).into()
}

#[tauri::command]
fn event_update(state: tauri::State<'_, AppState>, payload: EventUpdate) -> CommandResult<Event> {
    state.context.event_update(payload).into()
}

#[tauri::command]
fn event_delete(state: tauri::State<'_, AppState>, id: i64) -> CommandResult<BooleanResponse> {
    state.context.event_delete(id).into()
}

#[tauri::command]
async fn get_settings(app: AppHandle) -> CommandResult<AppSettings> {
    CommandResult::ok(context(&app).get_settings().await)
}

#[tauri::command]
async fn update_settings(app: AppHandle, settings: serde_json::Value) -> CommandResult<AppSettings> {
    context(&app).update_settings(settings).await.into()
}

#[tauri::command]
async fn save_canvas_token(app: AppHandle, token: String) -> CommandResult<BooleanResponse> {
    context(&app).save_canvas_token(token).await.into()
}

#[tauri::command]
async fn clear_canvas_token(app: AppHandle) -> CommandResult<BooleanResponse> {
    context(&app).clear_canvas_token().await.into()
}

#[tauri::command]
async fn has_canvas_token(app: AppHandle) -> CommandResult<BooleanResponse> {
    CommandResult::ok(context(&app).has_canvas_token().await)
}

pub fn run() {
    let app = tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .setup(|app| {
            let paths = AppPaths::discover().map_err(|error| error.to_string())?;
            std::fs::create_dir_all(&paths.data_dir).map_err(|error| AppError::from(error).to_string())?;
            init_tracing(&paths.log_dir())?;

            let settings = AppSettings::load(&paths);
            let runtime = tauri::async_runtime::block_on(async { tokio::runtime::Handle::current() });
            let collaborators = Collaborators {
                runtime: Some(runtime),
                ..Collaborators::default()
            };
            let context =
                AppContext::initialize(paths, settings, collaborators).map_err(|error| error.to_string())?;

            app.manage(AppState {
                context: Arc::new(context),
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            scan_vault,
            get_vault_path,
            read_file,
            write_file,
            schedule_save,
            create_note,
            create_folder,
            delete_file,
            delete_folder,
            rename_item,
            export_pdf,
            fetch_canvas_data,
            load_dashboard,
            calendar_view,
            generate_flashcards,
            summarize_text,
            list_flashcard_sets,
            load_flashcard_deck,
            events_list,
            event_add,
            event_update,
            event_delete,
            get_settings,
            update_settings,
            save_canvas_token,
            clear_canvas_token,
            has_canvas_token
        ])
        .build(tauri::generate_context!())
        .expect("failed to build tauri app");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = handle.try_state::<AppState>() {
                let context = state.context.clone();
                tauri::async_runtime::block_on(async move { context.shutdown().await });
            }
        }
    });
}
