use serde_json::Value;

use crate::document::{base_name, fs_path};

/// Discriminant of one raw response item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Text,
    Thinking,
    PrepareTool,
    ToolResult,
    FileEdit,
    Progress,
    McpStart,
    CodeblockRef,
    InlineReference,
    UndoStop,
    Unknown,
}

impl ItemKind {
    /// Classifies a raw item. Non-mapping items have no kind.
    pub fn of(item: &Value) -> Option<Self> {
        let map = item.as_object()?;
        let kind = map.get("kind").and_then(Value::as_str).unwrap_or_default();
        Some(match kind {
            "" if map.contains_key("value") => Self::Text,
            "thinking" => Self::Thinking,
            "prepareToolInvocation" => Self::PrepareTool,
            "toolInvocationSerialized" => Self::ToolResult,
            "textEditGroup" => Self::FileEdit,
            "progressTaskSerialized" | "progressTask" => Self::Progress,
            "mcpServersStarting" => Self::McpStart,
            "codeblockUri" => Self::CodeblockRef,
            "inlineReference" => Self::InlineReference,
            "undoStop" => Self::UndoStop,
            _ if map.contains_key("value") => Self::Text,
            _ => Self::Unknown,
        })
    }
}

/// A response item with only the fields its kind carries.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnItem {
    Text(String),
    InlineReference { name: String },
    Thinking(Thinking),
    PrepareTool(ToolInvocation),
    ToolResult(ToolInvocation),
    FileEdit(FileEdit),
    Progress(Progress),
    McpStart { server_ids: Vec<String> },
    CodeblockRef { path: String, is_edit: bool },
    UndoStop,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thinking {
    pub text: String,
    pub title: Option<String>,
    /// `Some` when the item marks the end of reasoning; holds the stop reason.
    pub done: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolInvocation {
    pub tool_id: String,
    pub tool_call_id: Option<String>,
    pub is_complete: bool,
    pub past_tense_message: Option<String>,
    pub invocation_message: Option<String>,
    pub confirmation: Option<i64>,
    pub source_label: Option<String>,
    pub terminal: Option<TerminalRun>,
    pub todo_list: Vec<TodoEntry>,
    pub search_hits: Vec<SearchHit>,
    pub input: Option<Value>,
    pub output: Option<ToolOutput>,
    pub generated_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerminalRun {
    pub command: String,
    pub cwd: Option<String>,
    pub exit_code: Option<i64>,
    pub duration_ms: Option<f64>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoEntry {
    pub id: String,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: String,
    pub start_line: Option<String>,
    pub end_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Blocks(Vec<OutputBlock>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputBlock {
    pub value: Value,
    pub is_error: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileEdit {
    pub path: String,
    pub done: bool,
    pub edit_texts: Vec<String>,
    pub generated_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub label: String,
    pub is_complete: bool,
}

impl TurnItem {
    pub fn from_value(item: &Value) -> Option<Self> {
        let kind = ItemKind::of(item)?;
        Some(match kind {
            ItemKind::Text => Self::Text(value_text(item.get("value"))),
            ItemKind::Thinking => Self::Thinking(parse_thinking(item)),
            ItemKind::PrepareTool => Self::PrepareTool(parse_tool_invocation(item)),
            ItemKind::ToolResult => Self::ToolResult(parse_tool_invocation(item)),
            ItemKind::FileEdit => Self::FileEdit(parse_file_edit(item)),
            ItemKind::Progress => Self::Progress(parse_progress(item)),
            ItemKind::McpStart => Self::McpStart {
                server_ids: item
                    .get("didStartServerIds")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .map(display_scalar)
                    .collect(),
            },
            ItemKind::CodeblockRef => Self::CodeblockRef {
                path: item.get("uri").and_then(fs_path).unwrap_or_default(),
                is_edit: flag(item, "isEdit"),
            },
            ItemKind::InlineReference => Self::InlineReference {
                name: inline_reference_name(item),
            },
            ItemKind::UndoStop => Self::UndoStop,
            ItemKind::Unknown => Self::Unknown,
        })
    }
}

fn parse_thinking(item: &Value) -> Thinking {
    let done = item
        .get("metadata")
        .filter(|metadata| {
            metadata
                .get("vscodeReasoningDone")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .map(|metadata| non_empty_string(metadata.get("stopReason")));

    Thinking {
        text: value_text(item.get("value")),
        title: non_empty_string(item.get("generatedTitle")),
        done,
    }
}

fn parse_tool_invocation(item: &Value) -> ToolInvocation {
    let tool_id = non_empty_string(item.get("toolId"))
        .or_else(|| non_empty_string(item.get("toolName")))
        .unwrap_or_else(|| "unknown".to_string());

    let specific = item.get("toolSpecificData");
    let specific_kind = specific
        .and_then(|data| data.get("kind"))
        .and_then(Value::as_str);

    let terminal = specific
        .filter(|_| specific_kind == Some("terminal"))
        .map(parse_terminal);
    let todo_list = specific
        .filter(|_| specific_kind == Some("todoList"))
        .and_then(|data| data.get("todoList"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|entry| entry.is_object())
        .map(|entry| TodoEntry {
            id: entry.get("id").map(display_scalar).unwrap_or_default(),
            title: non_empty_string(entry.get("title")).unwrap_or_default(),
            status: non_empty_string(entry.get("status")).unwrap_or_else(|| "unknown".to_string()),
        })
        .collect();

    let details = item.get("resultDetails");
    let search_hits = details
        .and_then(Value::as_array)
        .filter(|hits| hits.first().is_some_and(|hit| hit.get("uri").is_some()))
        .into_iter()
        .flatten()
        .filter(|hit| hit.is_object())
        .map(parse_search_hit)
        .collect();
    let io = details.filter(|details| details.is_object());
    let input = io.and_then(|details| details.get("input")).cloned();
    let output = io
        .and_then(|details| details.get("output"))
        .and_then(|output| match output {
            Value::Array(blocks) => Some(ToolOutput::Blocks(
                blocks
                    .iter()
                    .filter(|block| block.is_object())
                    .map(|block| OutputBlock {
                        value: block.get("value").cloned().unwrap_or(Value::Null),
                        is_error: flag(block, "isError") || flag(block, "error"),
                    })
                    .collect(),
            )),
            Value::String(text) => Some(ToolOutput::Text(text.clone())),
            _ => None,
        });

    ToolInvocation {
        tool_id,
        tool_call_id: non_empty_string(item.get("toolCallId")),
        is_complete: flag(item, "isComplete"),
        past_tense_message: message_text(item.get("pastTenseMessage")),
        invocation_message: message_text(item.get("invocationMessage")),
        confirmation: item
            .get("isConfirmed")
            .and_then(|confirmed| confirmed.get("type"))
            .and_then(Value::as_i64),
        source_label: item
            .get("source")
            .and_then(|source| non_empty_string(source.get("label"))),
        terminal,
        todo_list,
        search_hits,
        input,
        output,
        generated_title: non_empty_string(item.get("generatedTitle")),
    }
}

fn parse_terminal(data: &Value) -> TerminalRun {
    let command = match data.get("commandLine") {
        Some(Value::Object(command)) => command
            .get("original")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => display_scalar(other),
    };
    let state = data.get("terminalCommandState");
    let output = match data.get("terminalCommandOutput") {
        Some(Value::Object(output)) => output
            .get("text")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        Some(Value::String(text)) => Some(text.clone()),
        _ => None,
    };

    TerminalRun {
        command,
        cwd: data.get("cwd").and_then(fs_path),
        exit_code: state
            .and_then(|state| state.get("exitCode"))
            .and_then(Value::as_i64),
        duration_ms: state
            .and_then(|state| state.get("duration"))
            .and_then(Value::as_f64),
        output,
    }
}

fn parse_search_hit(hit: &Value) -> SearchHit {
    let path = hit.get("uri").and_then(fs_path).unwrap_or_default();
    let range = hit.get("range").filter(|range| range.is_object());
    let start_line = range.and_then(|range| {
        range
            .get("startLineNumber")
            .or_else(|| range.get("start").and_then(|start| start.get("line")))
            .map(display_scalar)
    });
    let end_line = range.and_then(|range| {
        range
            .get("endLineNumber")
            .or_else(|| range.get("end").and_then(|end| end.get("line")))
            .map(display_scalar)
    });

    SearchHit {
        path,
        start_line,
        end_line,
    }
}

fn parse_file_edit(item: &Value) -> FileEdit {
    let path = item
        .get("uri")
        .and_then(|uri| {
            ["path", "fsPath"]
                .iter()
                .find_map(|key| uri.get(*key).and_then(Value::as_str))
        })
        .filter(|path| !path.is_empty())
        .unwrap_or("unknown")
        .to_string();

    let mut edit_texts = Vec::new();
    for group in item
        .get("edits")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        match group {
            Value::Array(edits) => edit_texts.extend(
                edits
                    .iter()
                    .filter_map(|edit| edit.get("text").and_then(Value::as_str))
                    .map(ToString::to_string),
            ),
            Value::Object(edit) => {
                if let Some(text) = edit.get("text").and_then(Value::as_str) {
                    edit_texts.push(text.to_string());
                }
            }
            _ => {}
        }
    }

    FileEdit {
        path,
        done: flag(item, "done"),
        edit_texts,
        generated_title: non_empty_string(item.get("generatedTitle")),
    }
}

fn parse_progress(item: &Value) -> Progress {
    let content = match item.get("content") {
        Some(Value::Object(content)) => content
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::String(content)) => content.clone(),
        _ => String::new(),
    };
    let label = Some(content)
        .filter(|content| !content.is_empty())
        .or_else(|| non_empty_string(item.get("title")))
        .unwrap_or_else(|| "Processing...".to_string());

    Progress {
        label,
        is_complete: flag(item, "isComplete"),
    }
}

fn inline_reference_name(item: &Value) -> String {
    let reference = item.get("inlineReference").unwrap_or(item);
    match reference {
        Value::Object(map) => ["fsPath", "path", "name"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|path| !path.is_empty())
            .map(|path| base_name(path).to_string())
            .or_else(|| {
                ["uri", "location"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .find_map(|nested| fs_path(nested.get("uri").unwrap_or(nested)))
                    .map(|path| base_name(&path).to_string())
            })
            .unwrap_or_else(|| reference.to_string()),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Text of a `value` field: a string, or a sequence of strings concatenated.
fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts.iter().filter_map(Value::as_str).collect(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Messages are either a plain string or a markdown-string object `{value}`.
fn message_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(message) => non_empty_string(message.get("value")),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn flag(item: &Value, key: &str) -> bool {
    item.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ItemKind, ToolOutput, TurnItem};

    #[test]
    fn classify_by_kind_and_value() {
        assert_eq!(ItemKind::of(&json!({"value": "hi"})), Some(ItemKind::Text));
        assert_eq!(
            ItemKind::of(&json!({"kind": "markdownContent", "value": "x"})),
            Some(ItemKind::Text)
        );
        assert_eq!(
            ItemKind::of(&json!({"kind": "progressTask"})),
            Some(ItemKind::Progress)
        );
        assert_eq!(ItemKind::of(&json!({"kind": "undoStop"})), Some(ItemKind::UndoStop));
        assert_eq!(ItemKind::of(&json!({"kind": "other"})), Some(ItemKind::Unknown));
        assert_eq!(ItemKind::of(&json!("loose string")), None);
    }

    #[test]
    fn tool_invocation_reads_terminal_data() {
        let item = json!({
            "kind": "toolInvocationSerialized",
            "toolId": "run_in_terminal",
            "toolCallId": "t1",
            "isComplete": true,
            "invocationMessage": {"value": "Running `cargo test`"},
            "pastTenseMessage": "Ran `cargo test`",
            "isConfirmed": {"type": 2},
            "toolSpecificData": {
                "kind": "terminal",
                "commandLine": {"original": "cargo test"},
                "cwd": {"fsPath": "/repo"},
                "terminalCommandState": {"exitCode": 0, "duration": 1532},
                "terminalCommandOutput": {"text": "ok"}
            },
            "generatedTitle": "Run tests"
        });

        let Some(TurnItem::ToolResult(tool)) = TurnItem::from_value(&item) else {
            panic!("expected tool result");
        };
        assert_eq!(tool.tool_id, "run_in_terminal");
        assert_eq!(tool.tool_call_id.as_deref(), Some("t1"));
        assert!(tool.is_complete);
        assert_eq!(tool.past_tense_message.as_deref(), Some("Ran `cargo test`"));
        assert_eq!(tool.confirmation, Some(2));
        assert_eq!(tool.generated_title.as_deref(), Some("Run tests"));
        let terminal = tool.terminal.expect("terminal");
        assert_eq!(terminal.command, "cargo test");
        assert_eq!(terminal.cwd.as_deref(), Some("/repo"));
        assert_eq!(terminal.exit_code, Some(0));
        assert_eq!(terminal.duration_ms, Some(1532.0));
    }

    #[test]
    fn prepare_uses_tool_name() {
        let item = json!({"kind": "prepareToolInvocation", "toolName": "copilot_readFile"});
        let Some(TurnItem::PrepareTool(tool)) = TurnItem::from_value(&item) else {
            panic!("expected prepare");
        };
        assert_eq!(tool.tool_id, "copilot_readFile");
        assert_eq!(tool.tool_call_id, None);
    }

    #[test]
    fn result_details_split_into_io_and_search_hits() {
        let io = json!({
            "kind": "toolInvocationSerialized",
            "toolId": "mcp_github-mcp_get_issue",
            "resultDetails": {
                "input": "{\"issue\": 7}",
                "output": [{"value": "{\"title\":\"bug\"}", "isError": false}]
            }
        });
        let Some(TurnItem::ToolResult(tool)) = TurnItem::from_value(&io) else {
            panic!("expected tool result");
        };
        assert_eq!(tool.input, Some(json!("{\"issue\": 7}")));
        assert!(matches!(tool.output, Some(ToolOutput::Blocks(ref blocks)) if blocks.len() == 1));
        assert!(tool.search_hits.is_empty());

        let search = json!({
            "kind": "toolInvocationSerialized",
            "toolId": "copilot_findTextInFiles",
            "resultDetails": [
                {"uri": {"fsPath": "/repo/a.rs"}, "range": {"startLineNumber": 3, "endLineNumber": 5}}
            ]
        });
        let Some(TurnItem::ToolResult(tool)) = TurnItem::from_value(&search) else {
            panic!("expected tool result");
        };
        assert_eq!(tool.search_hits.len(), 1);
        assert_eq!(tool.search_hits[0].path, "/repo/a.rs");
        assert_eq!(tool.search_hits[0].start_line.as_deref(), Some("3"));
        assert!(tool.output.is_none());
    }

    #[test]
    fn file_edit_collects_nested_and_flat_entries() {
        let item = json!({
            "kind": "textEditGroup",
            "uri": {"path": "/repo/src/main.rs"},
            "done": true,
            "edits": [[{"text": "fn main() {\n"}, {"text": "}\n"}], {"text": "// tail"}, []]
        });
        let Some(TurnItem::FileEdit(edit)) = TurnItem::from_value(&item) else {
            panic!("expected file edit");
        };
        assert_eq!(edit.path, "/repo/src/main.rs");
        assert!(edit.done);
        assert_eq!(edit.edit_texts.len(), 3);
    }

    #[test]
    fn thinking_done_marker_and_text_parts() {
        let done = json!({"kind": "thinking", "value": "", "metadata": {"vscodeReasoningDone": true, "stopReason": "end"}});
        let Some(TurnItem::Thinking(thinking)) = TurnItem::from_value(&done) else {
            panic!("expected thinking");
        };
        assert_eq!(thinking.done, Some(Some("end".to_string())));

        let parts = json!({"kind": "thinking", "value": ["a", "b"]});
        let Some(TurnItem::Thinking(thinking)) = TurnItem::from_value(&parts) else {
            panic!("expected thinking");
        };
        assert_eq!(thinking.text, "ab");
        assert_eq!(thinking.done, None);
    }

    #[test]
    fn inline_reference_uses_base_name() {
        let item = json!({"kind": "inlineReference", "inlineReference": {"fsPath": "/repo/src/lib.rs"}});
        assert_eq!(
            TurnItem::from_value(&item),
            Some(TurnItem::InlineReference {
                name: "lib.rs".to_string()
            })
        );

        let symbol = json!({"kind": "inlineReference", "inlineReference": {"location": {"uri": {"path": "/repo/x.ts"}}}});
        assert_eq!(
            TurnItem::from_value(&symbol),
            Some(TurnItem::InlineReference {
                name: "x.ts".to_string()
            })
        );
    }

    #[test]
    fn progress_label_fallbacks() {
        let item = json!({"kind": "progressTaskSerialized", "content": {"value": "Indexing"}, "isComplete": true});
        let Some(TurnItem::Progress(progress)) = TurnItem::from_value(&item) else {
            panic!("expected progress");
        };
        assert_eq!(progress.label, "Indexing");
        assert!(progress.is_complete);

        let bare = json!({"kind": "progressTask"});
        let Some(TurnItem::Progress(progress)) = TurnItem::from_value(&bare) else {
            panic!("expected progress");
        };
        assert_eq!(progress.label, "Processing...");
    }
}
