use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::discovery::{EditorRoots, SessionFile, list_sessions, list_workspaces, locate_session};
use crate::document::Document;
use crate::error::{ChatlogError, Result};
use crate::materialize;
use crate::render::{SessionMeta, render_html, render_json, render_text};

const EXPORT_ID_CHARS: usize = 12;

static UNSAFE_DIRNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"));
static DIRNAME_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\s]+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    Json,
    Jsonl,
    Text,
}

impl ExportFormat {
    /// Output extension. Raw copies keep the extension of their source.
    pub fn extension(self, source: &Path) -> String {
        match self {
            Self::Html => "html".to_string(),
            Self::Json => "json".to_string(),
            Self::Text => "txt".to_string(),
            Self::Jsonl => source
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("jsonl")
                .to_string(),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => write!(f, "html"),
            Self::Json => write!(f, "json"),
            Self::Jsonl => write!(f, "jsonl"),
            Self::Text => write!(f, "text"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ChatlogError;

    fn from_str(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            "jsonl" => Ok(Self::Jsonl),
            "text" | "txt" => Ok(Self::Text),
            _ => Err(ChatlogError::InvalidFormat(input.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub format: ExportFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub session: SessionFile,
    /// Shown in the page header; defaults to the workspace id.
    pub workspace_label: Option<String>,
    pub output_dir: PathBuf,
    pub format: ExportFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFailure {
    pub session_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub exported: Vec<PathBuf>,
    pub skipped: Vec<String>,
    pub failed: Vec<ExportFailure>,
}

impl ExportReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: Self) {
        self.exported.extend(other.exported);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    fn record(&mut self, session_id: &str, outcome: Result<PathBuf>) {
        match outcome {
            Ok(path) => self.exported.push(path),
            Err(err) => {
                warn!(session_id, error = %err, "session export failed");
                self.failed.push(ExportFailure {
                    session_id: session_id.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

fn read_session_raw(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|source| ChatlogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(ChatlogError::EmptySessionFile {
            path: path.to_path_buf(),
        });
    }

    Ok(bytes)
}

/// Loads a session file: delta logs (`.jsonl`) are replayed, legacy `.json` files parsed.
pub fn read_session_file(path: &Path) -> Result<Document> {
    let is_log = match path.extension().and_then(|ext| ext.to_str()) {
        Some("jsonl") => true,
        Some("json") => false,
        _ => {
            return Err(ChatlogError::UnsupportedSessionFile {
                path: path.to_path_buf(),
            });
        }
    };

    let bytes = read_session_raw(path)?;
    let raw = String::from_utf8(bytes).map_err(|_| ChatlogError::NonUtf8SessionFile {
        path: path.to_path_buf(),
    })?;

    if is_log {
        let replay = materialize::replay(raw.lines()).map_err(|source| {
            ChatlogError::Materialization {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!(
            path = %path.display(),
            applied = replay.stats.applied,
            skipped = replay.stats.skipped,
            undecodable = replay.stats.undecodable,
            "replayed delta log"
        );
        Ok(replay.document)
    } else {
        Document::from_json(&raw).map_err(|source| ChatlogError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Writes one session to `output_dir` and returns the written file.
pub fn export_session(request: &ExportRequest) -> Result<PathBuf> {
    let session = &request.session;
    fs::create_dir_all(&request.output_dir).map_err(|source| ChatlogError::Io {
        path: request.output_dir.clone(),
        source,
    })?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let file_name = format!(
        "chat_{}_{stamp}.{}",
        id_prefix(&session.session_id),
        request.format.extension(&session.path)
    );
    let target = request.output_dir.join(file_name);

    let content = match request.format {
        ExportFormat::Jsonl => read_session_raw(&session.path)?,
        format => {
            let document = read_session_file(&session.path)?;
            let meta = SessionMeta {
                session_id: session.session_id.clone(),
                workspace: Some(
                    request
                        .workspace_label
                        .clone()
                        .unwrap_or_else(|| session.workspace_id.clone()),
                ),
                exported_at: Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            };
            let rendered = match format {
                ExportFormat::Html => render_html(&document, &meta),
                ExportFormat::Text => render_text(&document, &meta),
                ExportFormat::Json | ExportFormat::Jsonl => render_json(&document)?,
            };
            rendered.into_bytes()
        }
    };

    fs::write(&target, content).map_err(|source| ChatlogError::Io {
        path: target.clone(),
        source,
    })?;
    debug!(session_id = %session.session_id, path = %target.display(), "exported session");
    Ok(target)
}

/// Exports the sessions named by `selection`: one id, a comma-separated list, or `*`.
pub fn export_workspace(
    roots: &EditorRoots,
    workspace_id: &str,
    selection: &str,
    options: &ExportOptions,
) -> Result<ExportReport> {
    let session_ids = if selection.trim() == "*" {
        list_sessions(roots, workspace_id)?
            .into_iter()
            .map(|session| session.id)
            .collect::<Vec<_>>()
    } else {
        selection
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
            .collect()
    };
    let workspace_label = list_workspaces(roots)
        .into_iter()
        .find(|workspace| workspace.id == workspace_id)
        .map(|workspace| workspace.name);

    let mut report = ExportReport::default();
    for session_id in session_ids {
        let outcome = locate_session(roots, workspace_id, &session_id).and_then(|session| {
            export_session(&ExportRequest {
                session,
                workspace_label: workspace_label.clone(),
                output_dir: options.output_dir.clone(),
                format: options.format,
            })
        });
        report.record(&session_id, outcome);
    }
    Ok(report)
}

/// Exports every workspace into `<output_dir>/<editor variant>/<workspace name>`.
///
/// Sessions that already have an export with the same id prefix and extension are skipped.
pub fn export_all(roots: &EditorRoots, options: &ExportOptions) -> ExportReport {
    let mut report = ExportReport::default();

    for workspace in list_workspaces(roots) {
        let output_dir = options
            .output_dir
            .join(sanitize_dirname(&workspace.variant))
            .join(sanitize_dirname(&workspace.name));
        info!(
            workspace = %workspace.name,
            sessions = workspace.session_count,
            output = %output_dir.display(),
            "exporting workspace"
        );

        // Only this root: another editor variant may hold a workspace with the same id.
        let single_root = EditorRoots::single(&workspace.root);
        let sessions = match list_sessions(&single_root, &workspace.id) {
            Ok(sessions) => sessions,
            Err(err) => {
                report.record(&workspace.id, Err(err));
                continue;
            }
        };

        let mut workspace_report = ExportReport::default();
        for session in sessions {
            let format = options.format;
            let extension = format.extension(&session.path);
            if already_exported(&output_dir, &session.id, &extension) {
                workspace_report.skipped.push(session.id);
                continue;
            }

            let outcome = locate_session(&single_root, &workspace.id, &session.id).and_then(|file| {
                export_session(&ExportRequest {
                    session: file,
                    workspace_label: Some(workspace.name.clone()),
                    output_dir: output_dir.clone(),
                    format,
                })
            });
            workspace_report.record(&session.id, outcome);
        }
        report.merge(workspace_report);
    }

    report
}

/// Directory-safe form of a workspace or editor name.
pub fn sanitize_dirname(name: &str) -> String {
    let replaced = UNSAFE_DIRNAME_RE.replace_all(name, "_");
    let collapsed = DIRNAME_RUN_RE.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches(['_', '.', ' ']);
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn id_prefix(session_id: &str) -> String {
    session_id.chars().take(EXPORT_ID_CHARS).collect()
}

fn already_exported(output_dir: &Path, session_id: &str, extension: &str) -> bool {
    let Ok(entries) = fs::read_dir(output_dir) else {
        return false;
    };
    let prefix = format!("chat_{}", id_prefix(session_id));
    let suffix = format!(".{extension}");
    entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .any(|name| name.starts_with(&prefix) && name.ends_with(&suffix))
}
