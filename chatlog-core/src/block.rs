use crate::item::{TerminalRun, TodoEntry};

/// One renderable unit of an assistant response.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(TextBlock),
    ToolCall(ToolCallBlock),
    Thinking(ThinkingBlock),
    ReasoningDone { stop_reason: Option<String> },
    FileEdit(FileEditBlock),
    Progress(ProgressBlock),
    McpStart { server_ids: Vec<String> },
    CodeblockRef { file_name: String, is_edit: bool },
}

impl Block {
    /// Round label used by the grouper. Only tool calls, thinking and file edits carry one.
    ///
    /// A thinking title counts as a tag, so titled thinking ends forward
    /// absorption and is never pulled into a group.
    pub fn round_tag(&self) -> Option<&str> {
        match self {
            Self::ToolCall(block) => block.round_tag.as_deref(),
            Self::Thinking(block) => block.title.as_deref(),
            Self::FileEdit(block) => block.round_tag.as_deref(),
            _ => None,
        }
    }

    /// Non-text blocks that may be pulled into a neighbouring round group.
    pub fn is_absorbable(&self) -> bool {
        matches!(
            self,
            Self::ToolCall(_)
                | Self::Thinking(_)
                | Self::Progress(_)
                | Self::McpStart { .. }
                | Self::FileEdit(_)
                | Self::CodeblockRef { .. }
        )
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallBlock> {
        match self {
            Self::ToolCall(block) => Some(block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub markdown: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallBlock {
    pub tool_id: String,
    pub tool_call_id: Option<String>,
    pub display_name: String,
    pub icon: &'static str,
    pub is_complete: bool,
    pub summary: Option<String>,
    pub invocation: Option<String>,
    pub confirmation: Option<&'static str>,
    pub source: Option<String>,
    pub terminal: Option<TerminalRun>,
    pub todo_list: Vec<TodoEntry>,
    pub search: Option<SearchResults>,
    pub input: Option<String>,
    pub outputs: Vec<ToolOutputText>,
    pub round_tag: Option<String>,
}

impl ToolCallBlock {
    pub fn status_glyph(&self) -> &'static str {
        if self.is_complete { "✅" } else { "⏳" }
    }

    pub fn has_details(&self) -> bool {
        self.invocation.is_some()
            || self.terminal.is_some()
            || !self.todo_list.is_empty()
            || self.search.is_some()
            || self.input.is_some()
            || !self.outputs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    pub hits: Vec<SearchRow>,
    pub omitted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRow {
    pub path: String,
    pub file_name: String,
    /// `L3` or `L3-L5`.
    pub lines: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutputText {
    pub text: String,
    /// `None` for plain string outputs that carry no error flag.
    pub is_error: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingBlock {
    pub text: String,
    pub title: Option<String>,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEditBlock {
    pub path: String,
    pub file_name: String,
    pub done: bool,
    pub edit_count: usize,
    pub text: String,
    pub line_count: usize,
    pub round_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressBlock {
    pub label: String,
    pub is_complete: bool,
}

impl ProgressBlock {
    pub fn status_glyph(&self) -> &'static str {
        if self.is_complete { "✅" } else { "⏳" }
    }
}
