use crate::errors::{AppError, AppResult};
use crate::fs::FileSystem;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct PendingSave {
    generation: u64,
    content: String,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct PendingSaves {
    next_generation: u64,
    by_path: HashMap<PathBuf, PendingSave>,
}

/// Coalesces editor saves: each path is written once, with its latest
/// content, after it has been idle for the configured interval.
#[derive(Clone)]
pub struct SaveDebouncer {
    fs: Arc<dyn FileSystem>,
    interval: Duration,
    runtime: Option<Handle>,
    pending: Arc<Mutex<PendingSaves>>,
}

impl SaveDebouncer {
    /// Timers run on the runtime current at construction, if any.
    pub fn new(fs: Arc<dyn FileSystem>, interval: Duration) -> Self {
        Self {
            fs,
            interval,
            runtime: Handle::try_current().ok(),
            pending: Arc::new(Mutex::new(PendingSaves::default())),
        }
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replaces any pending save for `path`. Callable from any thread once
    /// the debouncer has a runtime to run its timers on.
    pub fn schedule(&self, path: PathBuf, content: String) -> AppResult<()> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current()
                .map_err(|error| AppError::Internal(format!("save debouncer needs a runtime: {}", error)))?,
        };
        let mut pending = self.lock()?;
        pending.next_generation += 1;
        let generation = pending.next_generation;

        let this = self.clone();
        let task_path = path.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(this.interval).await;
            this.write_if_current(task_path, generation).await;
        });

        if let Some(previous) = pending.by_path.insert(
            path,
            PendingSave {
                generation,
                content,
                task,
            },
        ) {
            previous.task.abort();
        }
        Ok(())
    }

    /// Drops the pending save for `path`. Returns whether there was one.
    pub fn cancel(&self, path: &Path) -> bool {
        match self.lock() {
            Ok(mut pending) => match pending.by_path.remove(path) {
                Some(save) => {
                    save.task.abort();
                    true
                }
                None => false,
            },
            Err(error) => {
                tracing::error!(error = %error, "cannot cancel pending save");
                false
            }
        }
    }

    /// Removes and returns the pending saves for `root` and everything
    /// below it, without writing them.
    pub fn take_under(&self, root: &Path) -> Vec<(PathBuf, String)> {
        let mut pending = match self.lock() {
            Ok(pending) => pending,
            Err(error) => {
                tracing::error!(error = %error, "cannot take pending saves");
                return Vec::new();
            }
        };
        let matching: Vec<PathBuf> = pending
            .by_path
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect();
        matching
            .into_iter()
            .filter_map(|path| {
                let save = pending.by_path.remove(&path)?;
                save.task.abort();
                Some((path, save.content))
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().map(|pending| pending.by_path.len()).unwrap_or_default()
    }

    /// Writes every pending save now. Returns how many were written.
    pub async fn flush(&self) -> usize {
        let drained: Vec<(PathBuf, String)> = match self.lock() {
            Ok(mut pending) => pending
                .by_path
                .drain()
                .map(|(path, save)| {
                    save.task.abort();
                    (path, save.content)
                })
                .collect(),
            Err(error) => {
                tracing::error!(error = %error, "cannot flush pending saves");
                return 0;
            }
        };

        let mut written = 0;
        for (path, content) in drained {
            if self.write(path, content).await {
                written += 1;
            }
        }
        written
    }

    async fn write_if_current(&self, path: PathBuf, generation: u64) {
        let content = match self.lock() {
            Ok(mut pending) => {
                let current = pending
                    .by_path
                    .get(&path)
                    .is_some_and(|save| save.generation == generation);
                if current {
                    pending.by_path.remove(&path).map(|save| save.content)
                } else {
                    None
                }
            }
            Err(error) => {
                tracing::error!(error = %error, "pending saves unavailable");
                None
            }
        };
        if let Some(content) = content {
            self.write(path, content).await;
        }
    }

    async fn write(&self, path: PathBuf, content: String) -> bool {
        let fs = self.fs.clone();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || fs.write(&target, &content)).await {
            Ok(Ok(())) => {
                tracing::debug!(path = %path.to_string_lossy(), "debounced save written");
                true
            }
            Ok(Err(error)) => {
                tracing::error!(path = %path.to_string_lossy(), error = %error, "debounced save failed");
                false
            }
            Err(error) => {
                tracing::error!(path = %path.to_string_lossy(), error = %error, "debounced save task failed");
                false
            }
        }
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, PendingSaves>> {
        self.pending
            .lock()
            .map_err(|_| AppError::Internal("pending saves mutex poisoned".to_string()))
    }
}
