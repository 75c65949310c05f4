use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::block::{SearchResults, SearchRow, ToolCallBlock, ToolOutputText};
use crate::document::base_name;
use crate::item::{SearchHit, ToolInvocation, ToolOutput};

const SUMMARY_CHARS: usize = 120;
const SEARCH_HIT_LIMIT: usize = 50;

static ANSI_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("valid regex"));

pub fn tool_call_block(tool: ToolInvocation) -> ToolCallBlock {
    let (display_name, icon) = display_name(&tool.tool_id);
    let summary = tool
        .past_tense_message
        .clone()
        .or_else(|| {
            tool.invocation_message
                .as_deref()
                .map(|message| message.chars().take(SUMMARY_CHARS).collect())
        });
    let terminal = tool.terminal.map(|mut run| {
        run.output = run.output.as_deref().map(strip_ansi);
        run
    });
    let search = (!tool.search_hits.is_empty()).then(|| search_results(&tool.search_hits));
    let input = tool.input.as_ref().map(pretty_input);
    let outputs = match tool.output {
        Some(ToolOutput::Blocks(blocks)) => blocks
            .into_iter()
            .map(|block| ToolOutputText {
                text: pretty_output(&block.value),
                is_error: Some(block.is_error),
            })
            .collect(),
        Some(ToolOutput::Text(text)) => vec![ToolOutputText {
            text,
            is_error: None,
        }],
        None => Vec::new(),
    };

    ToolCallBlock {
        display_name,
        icon,
        is_complete: tool.is_complete,
        summary,
        invocation: tool.invocation_message,
        confirmation: tool.confirmation.and_then(confirmation_label),
        source: tool.source_label,
        terminal,
        todo_list: tool.todo_list,
        search,
        input,
        outputs,
        round_tag: tool.generated_title,
        tool_call_id: tool.tool_call_id,
        tool_id: tool.tool_id,
    }
}

/// Human name and icon for a tool identifier.
pub fn display_name(tool_id: &str) -> (String, &'static str) {
    let known = match tool_id {
        "run_in_terminal" => Some(("Terminal", "💻")),
        "copilot_createFile" => Some(("Create File", "📝")),
        "copilot_readFile" => Some(("Read File", "📝")),
        "copilot_editFile" => Some(("Edit File", "📝")),
        "copilot_listDirectory" => Some(("List Directory", "📝")),
        "copilot_semanticSearch" => Some(("Semantic Search", "📝")),
        "copilot_grepSearch" => Some(("Grep Search", "📝")),
        "copilot_fileSearch" => Some(("File Search", "📝")),
        "copilot_runNotebookCell" => Some(("Run Notebook Cell", "📝")),
        "copilot_findTextInFiles" => Some(("Find in Files", "🔍")),
        "copilot_replaceString" => Some(("Replace String", "✏️")),
        "copilot_multiReplaceString" => Some(("Multi Replace", "✏️")),
        "manage_todo_list" => Some(("Todo List", "📋")),
        "list_code_usages" => Some(("List Code Usages", "🔍")),
        _ => None,
    };
    if let Some((name, icon)) = known {
        return (name.to_string(), icon);
    }

    if tool_id.starts_with("mcp_")
        && let Some((server, tool)) = tool_id.split_once("-mcp_")
    {
        return (format!("[MCP] {server}: {tool}"), "🔌");
    }

    if let Some(rest) = tool_id.strip_prefix("copilot_") {
        return (title_case(&rest.replace('_', " ")), "📝");
    }

    (title_case(&tool_id.replace('_', " ")), "🔧")
}

pub fn confirmation_label(kind: i64) -> Option<&'static str> {
    match kind {
        1 | 4 => Some("Auto-approved"),
        2 => Some("User approved"),
        3 => Some("User rejected"),
        _ => None,
    }
}

/// Removes ANSI color sequences and normalizes line endings.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE_RE
        .replace_all(text, "")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

/// `1.5s` above one second, `532ms` otherwise.
pub fn format_duration(ms: f64) -> String {
    if ms > 1000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

/// Uppercases the first letter of every alphabetic run and lowercases the rest.
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn search_results(hits: &[SearchHit]) -> SearchResults {
    let rows = hits
        .iter()
        .take(SEARCH_HIT_LIMIT)
        .map(|hit| {
            let start = hit.start_line.as_deref().unwrap_or("?");
            let lines = match hit.end_line.as_deref() {
                Some(end) if !end.is_empty() && end != start => format!("L{start}-L{end}"),
                _ => format!("L{start}"),
            };
            let file_name = if hit.path.is_empty() {
                "?".to_string()
            } else {
                base_name(&hit.path).to_string()
            };
            SearchRow {
                path: hit.path.clone(),
                file_name,
                lines,
            }
        })
        .collect();

    SearchResults {
        hits: rows,
        omitted: hits.len().saturating_sub(SEARCH_HIT_LIMIT),
    }
}

/// Inputs usually arrive as JSON text; show them structured when they parse.
fn pretty_input(input: &Value) -> String {
    let parsed = match input {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => parsed,
            Err(_) => return text.clone(),
        },
        other => other.clone(),
    };
    match parsed {
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| parsed.to_string())
        }
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn pretty_output(value: &Value) -> String {
    match value {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| text.clone()),
            Err(_) => text.clone(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
