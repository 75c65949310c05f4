pub mod block;
pub mod discovery;
pub mod document;
pub mod error;
pub mod group;
pub mod interpret;
pub mod item;
pub mod markdown;
pub mod materialize;
pub mod path;
pub mod render;
pub mod service;
pub mod tool;

pub use block::{Block, ToolCallBlock};
pub use discovery::{
    EditorRoots, SessionFile, SessionFormat, SessionInfo, SessionMatch, WorkspaceInfo,
    find_workspace, list_sessions, list_workspaces, locate_session, search_sessions,
};
pub use document::{Document, Exchange};
pub use error::{ChatlogError, DecodeError, MaterializationError, Result};
pub use group::{GroupBlock, GroupStatus, Segment, group};
pub use interpret::{interpret, interpret_response};
pub use item::TurnItem;
pub use materialize::{MutationRecord, Replay, ReplayStats, apply, materialize, replay};
pub use path::{PathAddress, PathStep};
pub use render::{SessionMeta, render_html, render_json, render_text};
pub use service::{
    ExportFailure, ExportFormat, ExportOptions, ExportReport, ExportRequest, export_all,
    export_session, export_workspace, read_session_file, sanitize_dirname,
};
