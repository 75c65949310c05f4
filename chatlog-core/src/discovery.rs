use std::cmp::Reverse;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::document::base_name;
use crate::error::{ChatlogError, Result};
use crate::service::read_session_file;

const EDITOR_VARIANTS: &[&str] = &["Code", "Code - Insiders"];

/// VS Code user-data directories that hold chat sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorRoots {
    roots: Vec<PathBuf>,
}

impl EditorRoots {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn single(root: impl Into<PathBuf>) -> Self {
        Self::new(vec![root.into()])
    }

    pub fn from_env_or_home() -> Result<Self> {
        // Precedence:
        // 1) CHATLOG_VSCODE_PATH (one explicit user-data root)
        // 2) <config dir>/Code and <config dir>/Code - Insiders, whichever exist
        //    (~/.config on Linux, ~/Library/Application Support on macOS, %APPDATA% on Windows)
        if let Some(root) = env::var_os("CHATLOG_VSCODE_PATH").filter(|path| !path.is_empty()) {
            return Ok(Self::single(root));
        }

        let config = dirs::config_dir().ok_or(ChatlogError::ConfigDirectoryNotFound)?;
        let roots = EDITOR_VARIANTS
            .iter()
            .map(|variant| config.join(variant))
            .filter(|path| path.is_dir())
            .collect();
        Ok(Self::new(roots))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionFormat {
    Json,
    Jsonl,
}

impl SessionFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jsonl") => Some(Self::Jsonl),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
    pub session_count: usize,
    /// Editor flavour, taken from the root directory name (`Code`, `Code - Insiders`).
    pub variant: String,
    pub root: PathBuf,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub file: String,
    pub format: SessionFormat,
    pub size_bytes: u64,
    pub size_human: String,
    pub modified: Option<String>,
    #[serde(skip_serializing)]
    pub modified_at: SystemTime,
    pub message_count: usize,
    pub title: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMatch {
    pub workspace_id: String,
    pub workspace_name: String,
    pub session_id: String,
    pub file: String,
    pub size_human: String,
    pub variant: String,
    pub path: PathBuf,
}

/// A located session file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub workspace_id: String,
    pub session_id: String,
    pub format: SessionFormat,
    pub path: PathBuf,
}

/// Rejects ids that could escape the storage directory.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        return Err(ChatlogError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

pub fn list_workspaces(roots: &EditorRoots) -> Vec<WorkspaceInfo> {
    let mut workspaces = Vec::new();

    for root in roots.roots() {
        let storage = storage_dir(root);
        let Ok(entries) = fs::read_dir(&storage) else {
            continue;
        };
        let variant = variant_name(root);

        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            let session_count = session_files(&path.join("chatSessions")).len();
            if session_count == 0 {
                continue;
            }

            let id = entry.file_name().to_string_lossy().into_owned();
            workspaces.push(WorkspaceInfo {
                name: workspace_name(&path).unwrap_or_else(|| id.clone()),
                id,
                session_count,
                variant: variant.clone(),
                root: root.clone(),
                path,
            });
        }
    }

    workspaces.sort_by(|left, right| {
        right
            .session_count
            .cmp(&left.session_count)
            .then_with(|| left.name.cmp(&right.name))
    });
    workspaces
}

/// Workspace info for one id, from the first root that has sessions for it.
pub fn find_workspace(roots: &EditorRoots, workspace_id: &str) -> Result<WorkspaceInfo> {
    validate_id(workspace_id)?;
    list_workspaces(roots)
        .into_iter()
        .find(|workspace| workspace.id == workspace_id)
        .ok_or_else(|| ChatlogError::WorkspaceNotFound {
            workspace_id: workspace_id.to_string(),
            searched_roots: roots.roots().to_vec(),
        })
}

pub fn list_sessions(roots: &EditorRoots, workspace_id: &str) -> Result<Vec<SessionInfo>> {
    validate_id(workspace_id)?;
    let mut found_workspace = false;
    let mut sessions = Vec::new();

    for root in roots.roots() {
        let chat_dir = storage_dir(root).join(workspace_id).join("chatSessions");
        if !chat_dir.is_dir() {
            continue;
        }
        found_workspace = true;

        for path in session_files(&chat_dir) {
            let Some(format) = SessionFormat::from_path(&path) else {
                continue;
            };
            let metadata = fs::metadata(&path).ok();
            let size_bytes = metadata.as_ref().map_or(0, fs::Metadata::len);
            let modified_at = metadata
                .and_then(|meta| meta.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let (message_count, title) = match read_session_file(&path) {
                Ok(document) => (
                    document.request_count(),
                    document.title().map(ToString::to_string),
                ),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "session listed without summary");
                    (0, None)
                }
            };

            sessions.push(SessionInfo {
                id: file_stem(&path),
                file: file_name(&path),
                format,
                size_bytes,
                size_human: human_size(size_bytes),
                modified: (modified_at != SystemTime::UNIX_EPOCH).then(|| {
                    DateTime::<Local>::from(modified_at)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                }),
                modified_at,
                message_count,
                title,
                path,
            });
        }
    }

    if !found_workspace {
        return Err(ChatlogError::WorkspaceNotFound {
            workspace_id: workspace_id.to_string(),
            searched_roots: roots.roots().to_vec(),
        });
    }

    sessions.sort_by_key(|session| Reverse(session.modified_at));
    Ok(sessions)
}

/// Finds the file of one session, preferring the delta log over a legacy document.
pub fn locate_session(
    roots: &EditorRoots,
    workspace_id: &str,
    session_id: &str,
) -> Result<SessionFile> {
    validate_id(workspace_id)?;
    validate_id(session_id)?;

    for root in roots.roots() {
        let chat_dir = storage_dir(root).join(workspace_id).join("chatSessions");
        for format in [SessionFormat::Jsonl, SessionFormat::Json] {
            let path = chat_dir.join(format!("{session_id}.{}", format.extension()));
            if path.is_file() {
                return Ok(SessionFile {
                    workspace_id: workspace_id.to_string(),
                    session_id: session_id.to_string(),
                    format,
                    path,
                });
            }
        }
    }

    Err(ChatlogError::SessionNotFound {
        workspace_id: workspace_id.to_string(),
        session_id: session_id.to_string(),
        searched_roots: roots.roots().to_vec(),
    })
}

/// Sessions whose raw file contains `needle`.
pub fn search_sessions(roots: &EditorRoots, needle: &str) -> Vec<SessionMatch> {
    let mut matches = Vec::new();

    for root in roots.roots() {
        let storage = storage_dir(root);
        if !storage.is_dir() {
            continue;
        }
        let variant = variant_name(root);

        let candidates = WalkDir::new(&storage)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| {
                path.parent()
                    .and_then(Path::file_name)
                    .is_some_and(|name| name == "chatSessions")
                    && SessionFormat::from_path(path).is_some()
            });

        for path in candidates {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            if !content.contains(needle) {
                continue;
            }
            let Some(workspace_dir) = path.parent().and_then(Path::parent) else {
                continue;
            };
            let workspace_id = workspace_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            matches.push(SessionMatch {
                workspace_name: workspace_name(workspace_dir)
                    .unwrap_or_else(|| workspace_id.clone()),
                workspace_id,
                session_id: file_stem(&path),
                file: file_name(&path),
                size_human: human_size(content.len() as u64),
                variant: variant.clone(),
                path,
            });
        }
    }

    matches
}

/// `1.5 KB` style sizes with one decimal.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

fn storage_dir(root: &Path) -> PathBuf {
    root.join("User").join("workspaceStorage")
}

fn variant_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

fn session_files(chat_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(chat_dir) else {
        return Vec::new();
    };
    let mut files = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && SessionFormat::from_path(path).is_some())
        .collect::<Vec<_>>();
    files.sort();
    files
}

/// Last segment of the decoded `folder` URI in `workspace.json`.
fn workspace_name(workspace_dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(workspace_dir.join("workspace.json")).ok()?;
    let value = serde_json::from_str::<Value>(&raw).ok()?;
    let folder = value
        .get("folder")
        .and_then(Value::as_str)
        .filter(|folder| !folder.is_empty())?;
    let decoded = urlencoding::decode(folder)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| folder.to_string());
    let path = decoded
        .strip_prefix("file:///")
        .or_else(|| decoded.strip_prefix("file://"))
        .unwrap_or(&decoded);
    let name = base_name(path.trim_end_matches(['/', '\\']));
    let name = if name.is_empty() { path } else { name };
    Some(name.to_string())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
