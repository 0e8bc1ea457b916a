use crate::errors::{AppError, AppResult};
use crate::fs::{base_name, extension_of};
use crate::models::ExportResponse;
use crate::vault::Vault;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Turns an HTML document into a PDF file at `output`.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, html: &str, output: &Path) -> AppResult<()>;
}

/// Used when no converter is configured.
pub struct UnconfiguredRenderer;

impl PdfRenderer for UnconfiguredRenderer {
    fn render(&self, _html: &str, _output: &Path) -> AppResult<()> {
        Err(AppError::Unavailable(
            "PDF export needs a converter; set pdfConverter in settings".to_string(),
        ))
    }
}

/// Runs an external converter. The command line is split on whitespace, the
/// HTML is written to its stdin and the output path is appended as the last
/// argument, e.g. `wkhtmltopdf --quiet -`.
pub struct CommandPdfRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandPdfRenderer {
    pub fn from_command_line(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

impl PdfRenderer for CommandPdfRenderer {
    fn render(&self, html: &str, output: &Path) -> AppResult<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| AppError::Unavailable(format!("failed to start {}: {}", self.program, error)))?;

        // Fed from a thread so a converter that stops reading cannot block the wait.
        let writer = child.stdin.take().map(|mut stdin| {
            let html = html.to_string();
            std::thread::spawn(move || {
                let _ = stdin.write_all(html.as_bytes());
            })
        });

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program = %self.program, timeout_ms = self.timeout.as_millis() as u64, "pdf converter timed out");
                return Err(AppError::Unavailable(format!(
                    "{} did not finish within {} ms",
                    self.program,
                    self.timeout.as_millis()
                )));
            }
        };
        if let Some(writer) = writer {
            let _ = writer.join();
        }
        if !status.success() {
            return Err(AppError::Io(format!("{} exited with {}", self.program, status)));
        }
        Ok(())
    }
}

pub fn render_html(title: &str, content: &str, extension: &str) -> String {
    let body = if extension == ".md" {
        markdown::to_html(content)
    } else {
        format!("<pre>{}</pre>", escape_html(content))
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Renders the note and writes `<base>.pdf` next to it.
pub fn export_pdf(vault: &Vault, renderer: &dyn PdfRenderer, relative: &str) -> AppResult<ExportResponse> {
    let content = vault.read_file(relative)?;
    let base = base_name(relative);
    let html = render_html(base, &content, &extension_of(relative));

    let target = match relative.rsplit_once(['/', '\\']) {
        Some((dir, _)) => format!("{}/{}.pdf", dir, base),
        None => format!("{}.pdf", base),
    };
    let output = vault.resolve(&target)?;
    renderer
        .render(&html, &output)
        .map_err(|error| error.context("export pdf"))?;
    tracing::info!(source = %relative, path = %target, "exported pdf");
    Ok(ExportResponse { path: target })
}
