use memoura_lib::ai::{CompletionFuture, TextGenerator};
use memoura_lib::config::{AppPaths, AppSettings};
use memoura_lib::context::{AppContext, Collaborators};
use memoura_lib::errors::AppResult;
use memoura_lib::models::{
    CalendarEntry, CreateNotePayload, EventDraft, EventUpdate, GenerateFlashcardsPayload, NoteExtension,
    RenamePayload, SummarizePayload,
};
use std::sync::Arc;
use std::time::Duration;

struct FakeGenerator;

impl TextGenerator for FakeGenerator {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        let reply: AppResult<String> = if prompt.contains("flashcards") {
            Ok(r#"[{"question": "What is a vault?", "answer": "A folder of notes"}]"#.to_string())
        } else {
            Ok("Summary of the note.".to_string())
        };
        Box::pin(async move { reply })
    }
}

fn context(dir: &tempfile::TempDir) -> AppContext {
    let paths = AppPaths::new(dir.path().join("app"), dir.path().join("data"));
    let settings = AppSettings {
        save_debounce_ms: 20,
        ..AppSettings::default()
    };
    AppContext::initialize(
        paths,
        settings,
        Collaborators {
            generator: Some(Arc::new(FakeGenerator)),
            ..Collaborators::default()
        },
    )
    .expect("context")
}

#[tokio::test]
async fn vault_operations_are_visible_on_rescan() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);

    ctx.create_folder("School").expect("folder");
    let note = ctx
        .create_note(CreateNotePayload {
            folder: "School".to_string(),
            name: "week1".to_string(),
            extension: NoteExtension::Markdown,
        })
        .expect("note");
    assert_eq!(note, "School/week1.md");
    ctx.write_file(&note, "# Week 1").expect("write");

    let catalogue = ctx.scan_vault().await.expect("scan");
    assert_eq!(catalogue.folders.len(), 1);
    assert_eq!(catalogue.files[0].filepath, "School/week1.md");
    assert_eq!(catalogue.files[0].filetype, ".md");

    ctx.rename_item(RenamePayload {
        old_path: note.clone(),
        new_path: "School/week-one.md".to_string(),
    })
    .expect("rename");
    assert_eq!(ctx.read_file("School/week-one.md").expect("read").content, "# Week 1");

    ctx.delete_folder("School").expect("delete");
    let catalogue = ctx.scan_vault().await.expect("rescan");
    assert!(catalogue.folders.is_empty());
    assert!(catalogue.files.is_empty());
}

#[tokio::test]
async fn dashboard_reports_each_branch_independently() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);
    ctx.create_folder("Inbox").expect("folder");

    let snapshot = ctx.load_dashboard().await;
    assert!(snapshot.vault.success);
    assert_eq!(snapshot.vault.as_ok().map(|c| c.folders.len()), Some(1));
    assert!(!snapshot.courses.success);
    assert_eq!(snapshot.courses.error.as_ref().map(|e| e.code.as_str()), Some("UNAVAILABLE"));
}

#[tokio::test]
async fn calendar_falls_back_to_local_events() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);

    let created = ctx
        .event_add(EventDraft {
            title: "Exam".to_string(),
            date: "2025-10-18".to_string(),
            time: Some("09:00".to_string()),
            description: None,
            color: None,
        })
        .expect("add");
    ctx.event_update(EventUpdate {
        id: created.id,
        description: Some("Room 4".to_string()),
        ..EventUpdate::default()
    })
    .expect("update");

    let view = ctx.calendar_view().await.expect("calendar");
    assert_eq!(view.remote_error.as_ref().map(|e| e.code.as_str()), Some("UNAVAILABLE"));
    let entries = view.buckets.get("2025-9-18").expect("bucket");
    assert_eq!(entries.len(), 1);
    let CalendarEntry::Local(local) = &entries[0] else {
        panic!("expected a local entry");
    };
    assert_eq!(local.description.as_deref(), Some("Room 4"));

    ctx.event_delete(created.id).expect("delete");
    assert!(ctx.events_list().is_empty());
}

#[tokio::test]
async fn study_tools_write_artifacts_into_the_vault() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);
    ctx.create_folder("Bio").expect("folder");
    ctx.write_file("Bio/cells.md", "Cells are small.").expect("note");

    let deck = ctx
        .generate_flashcards(GenerateFlashcardsPayload {
            text: "Cells are small.".to_string(),
            original_file_path: Some("Bio/cells.md".to_string()),
        })
        .await
        .expect("flashcards");
    assert_eq!(deck.file_path, "Flashcards/cells-flashcard.json");
    assert_eq!(deck.count, 1);

    let sets = ctx.list_flashcard_sets().await.expect("sets");
    assert_eq!(sets.len(), 1);
    let loaded = ctx.load_flashcard_deck(&sets[0].filepath).expect("deck");
    assert_eq!(loaded.cards[0].answer, "A folder of notes");

    let summary = ctx
        .summarize_text(SummarizePayload {
            text: "Cells are small.".to_string(),
            original_file_path: Some("Bio/cells.md".to_string()),
        })
        .await
        .expect("summary");
    assert_eq!(summary.file_path, "Bio/cells-summarize.txt");

    let export = ctx.export_pdf("Bio/cells.md").await.expect_err("no converter configured");
    assert_eq!(export.code(), "UNAVAILABLE");
}

#[tokio::test]
async fn scheduled_saves_coalesce_and_flush_on_shutdown() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);
    ctx.write_file("draft.md", "").expect("note");

    for i in 0..5 {
        ctx.schedule_save("draft.md", format!("v{}", i)).expect("schedule");
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(ctx.read_file("draft.md").expect("read").content, "v4");

    ctx.schedule_save("draft.md", "final".to_string()).expect("schedule");
    ctx.shutdown().await;
    assert_eq!(ctx.read_file("draft.md").expect("read").content, "final");
}

#[tokio::test]
async fn settings_updates_persist_and_reload() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);

    let updated = ctx
        .update_settings(serde_json::json!({"ollamaModel": "llama3", "pdfTimeoutMs": 5000}))
        .await
        .expect("update");
    assert_eq!(updated.ollama_model, "llama3");

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(ctx.paths().settings_file()).expect("settings file"))
            .expect("json");
    assert_eq!(saved["pdfTimeoutMs"], 5000);
    assert!(!ctx.has_canvas_token().await.success);
}

#[test]
fn editor_saves_can_be_scheduled_from_threads_outside_the_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("runtime");
    let dir = tempfile::tempdir().expect("temp");
    let paths = AppPaths::new(dir.path().join("app"), dir.path().join("data"));
    let settings = AppSettings {
        save_debounce_ms: 20,
        ..AppSettings::default()
    };
    let ctx = Arc::new(
        AppContext::initialize(
            paths,
            settings,
            Collaborators {
                generator: Some(Arc::new(FakeGenerator)),
                runtime: Some(runtime.handle().clone()),
                ..Collaborators::default()
            },
        )
        .expect("context"),
    );
    ctx.write_file("draft.md", "old").expect("note");

    let editor = ctx.clone();
    std::thread::spawn(move || editor.schedule_save("draft.md", "new".to_string()))
        .join()
        .expect("editor thread")
        .expect("schedule");
    runtime.block_on(async { tokio::time::sleep(Duration::from_millis(200)).await });

    assert_eq!(ctx.read_file("draft.md").expect("read").content, "new");
}

#[tokio::test]
async fn deleted_items_are_not_recreated_by_pending_saves() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);
    ctx.write_file("note.md", "saved").expect("note");
    ctx.create_folder("School").expect("folder");
    ctx.write_file("School/week1.md", "saved").expect("nested note");

    ctx.schedule_save("note.md", "typing".to_string()).expect("schedule");
    ctx.schedule_save("School/week1.md", "typing".to_string()).expect("schedule nested");
    ctx.delete_file("note.md").expect("delete file");
    ctx.delete_folder("School").expect("delete folder");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let catalogue = ctx.scan_vault().await.expect("scan");
    assert!(catalogue.files.is_empty());
    assert!(catalogue.folders.is_empty());
}

#[tokio::test]
async fn immediate_write_supersedes_a_pending_save() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);
    ctx.write_file("note.md", "").expect("note");

    ctx.schedule_save("note.md", "older keystrokes".to_string()).expect("schedule");
    ctx.write_file("note.md", "explicit save").expect("write");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(ctx.read_file("note.md").expect("read").content, "explicit save");
}

#[tokio::test]
async fn rename_carries_pending_edits_to_the_new_path() {
    let dir = tempfile::tempdir().expect("temp");
    let ctx = context(&dir);
    ctx.write_file("draft.md", "first").expect("note");

    ctx.schedule_save("draft.md", "first and more".to_string()).expect("schedule");
    ctx.rename_item(RenamePayload {
        old_path: "draft.md".to_string(),
        new_path: "final.md".to_string(),
    })
    .expect("rename");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let catalogue = ctx.scan_vault().await.expect("scan");
    let names: Vec<&str> = catalogue.files.iter().map(|file| file.filepath.as_str()).collect();
    assert_eq!(names, vec!["final.md"]);
    assert_eq!(ctx.read_file("final.md").expect("read").content, "first and more");
}
