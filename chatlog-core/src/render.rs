use chrono::{DateTime, Local, Utc};
use serde_json::{Map, Value};

use crate::block::{Block, FileEditBlock, ThinkingBlock, ToolCallBlock};
use crate::discovery::human_size;
use crate::document::{Document, Exchange};
use crate::error::{ChatlogError, Result};
use crate::group::{GroupBlock, Segment, group};
use crate::interpret::interpret_response;
use crate::markdown::{escape_html, markdown_to_html};
use crate::tool::format_duration;

const TERMINAL_TEXT_LINES: usize = 20;
const ATTACHMENT_PREVIEW_CHARS: usize = 5000;
const LARGE_ATTACHMENT_CHARS: usize = 100_000;
const INLINE_IMAGE_MIN_CHARS: usize = 1000;
const RULE_WIDTH: usize = 60;

const STYLE: &str = r"
:root { --bg: #1e1e1e; --bg-elevated: #252526; --bg-input: #2d2d30; --bg-deep: #0d1117;
  --border: #3c3c3c; --text: #cccccc; --muted: #8c8c8c; --bright: #f0f6fc;
  --blue: #58a6ff; --green: #3fb950; --red: #f85149; --yellow: #d29922; --purple: #bc8cff; }
body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; background: var(--bg); color: var(--text); margin: 0; line-height: 1.6; }
.container { max-width: 960px; margin: 0 auto; }
.header, .controls, .footer { background: var(--bg-elevated); padding: 12px 24px; border-bottom: 1px solid var(--border); }
.header h1 { margin: 0; font-size: 16px; color: var(--bright); }
.header-stat, .meta-badge, .tool-meta-badge { font-size: 11px; color: var(--muted); background: var(--bg-deep); padding: 2px 8px; border-radius: 10px; margin-right: 6px; }
.messages { padding: 20px 24px; }
.msg { margin-bottom: 28px; }
.msg-header { display: flex; gap: 8px; font-weight: 600; color: var(--bright); }
.msg-body { background: var(--bg-input); padding: 12px 16px; border-radius: 8px; border: 1px solid var(--border); word-break: break-word; }
.msg-body pre, .detail-pre { white-space: pre-wrap; }
.md-pre, .md-code { background: #161b22; border-radius: 4px; padding: 2px 6px; }
.tool-call, .tool-group, .thinking-block, .file-edit-block { margin: 8px 0; border: 1px solid var(--border); border-radius: 6px; }
.tool-header, .tool-group-header, .thinking-header, .file-edit-header, .meta-toggle, .attachment-header { cursor: pointer; padding: 6px 12px; display: flex; gap: 8px; font-size: 13px; }
.tool-name { font-weight: 600; color: var(--blue); }
.tool-summary, .thinking-preview { color: var(--muted); flex: 1; overflow: hidden; white-space: nowrap; text-overflow: ellipsis; }
.tool-details, .thinking-content, .file-edit-content, .attachment-content { padding: 8px 12px; background: var(--bg-deep); font-size: 12px; }
.terminal-cmd { color: var(--green); font-family: monospace; }
.exit-success { color: var(--green); }
.exit-error { color: var(--red); }
.thinking-title { color: var(--purple); font-weight: 600; }
.thinking-done, .mcp-servers { color: var(--purple); font-size: 12px; padding: 4px 12px; }
.progress-task, .codeblock-uri { font-size: 12px; padding: 2px 12px; }
.meta-error { color: var(--red); }
.search-line { color: var(--yellow); }
";

const SCRIPT: &str = r"
function toggle(id) {
  var el = document.getElementById(id);
  if (!el) return;
  var show = el.style.display === 'none';
  el.style.display = show ? 'block' : 'none';
  var chevron = document.getElementById('chevron_' + id);
  if (chevron) chevron.textContent = show ? '▼' : '▶';
}
function setAll(display) {
  document.querySelectorAll('.collapsible').forEach(function(el) { el.style.display = display; });
}
";

/// Session-level facts that are not part of the document itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    pub session_id: String,
    pub workspace: Option<String>,
    pub exported_at: Option<String>,
}

/// Monotonic element ids for collapsible sections of one page.
#[derive(Debug, Default)]
struct IdGen {
    next: usize,
}

impl IdGen {
    fn next(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{}", self.next);
        self.next += 1;
        id
    }
}

pub fn render_json(document: &Document) -> Result<String> {
    serde_json::to_string_pretty(document.as_value())
        .map_err(|err| ChatlogError::Serialization(err.to_string()))
}

pub fn render_html(document: &Document, meta: &SessionMeta) -> String {
    let requests = document.requests();
    let title = page_title(document, &meta.session_id);
    let models = models_used(&requests);
    let total_ms = requests
        .iter()
        .filter_map(|exchange| exchange.result().total_elapsed_ms)
        .sum::<f64>();
    let total = if total_ms > 0.0 {
        format!("{:.0}s", total_ms / 1000.0)
    } else {
        "N/A".to_string()
    };
    let workspace = meta.workspace.as_deref().unwrap_or_default();
    let short_id = meta.session_id.chars().take(16).collect::<String>();

    let mut ids = IdGen::default();
    let mut output = String::new();
    output.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
    output.push_str(&format!("<title>Chat - {}</title>\n", escape_html(&title)));
    output.push_str(&format!("<style>{STYLE}</style>\n</head>\n<body>\n<div class=\"container\">\n"));
    output.push_str(&format!(
        "<div class=\"header\">\n  <h1>{}</h1>\n  <span>{} exchanges</span>\n  <div class=\"header-stats\">\
         <span class=\"header-stat\">🤖 {}</span><span class=\"header-stat\">⏱️ Total: {total}</span>\
         <span class=\"header-stat\">📝 Session: {}...</span><span class=\"header-stat\">📁 Workspace: {}</span></div>\n</div>\n",
        escape_html(&title),
        requests.len(),
        escape_html(&models),
        escape_html(&short_id),
        escape_html(workspace),
    ));
    output.push_str(
        "<div class=\"controls\"><button onclick=\"setAll('block')\">▼ Expand all</button>\
         <button onclick=\"setAll('none')\">▲ Collapse all</button></div>\n<div class=\"messages\">\n",
    );

    if requests.is_empty() {
        output.push_str("<div class=\"empty\"><p>No messages in this session</p></div>\n");
    }

    for (idx, exchange) in requests.iter().enumerate() {
        write_user_message(&mut output, &mut ids, idx, exchange);
        write_assistant_message(&mut output, &mut ids, exchange);
    }

    output.push_str("</div>\n");
    output.push_str(&format!(
        "<div class=\"footer\">Session: {} &bull; Workspace: {} &bull; Model: {}{}</div>\n",
        escape_html(&meta.session_id),
        escape_html(workspace),
        escape_html(&models),
        meta.exported_at
            .as_deref()
            .map(|at| format!(" &bull; Exported: {}", escape_html(at)))
            .unwrap_or_default(),
    ));
    output.push_str(&format!("</div>\n<script>{SCRIPT}</script>\n</body>\n</html>\n"));
    output
}

fn write_user_message(output: &mut String, ids: &mut IdGen, idx: usize, exchange: &Exchange<'_>) {
    let time = exchange
        .timestamp_ms()
        .and_then(clock_time)
        .map(|time| format!("<span class=\"msg-time\">{time}</span>"))
        .unwrap_or_default();

    output.push_str(&format!(
        "<div class=\"msg user\">\n  <div class=\"msg-header\"><span class=\"author\">You</span><span class=\"msg-number\">#{}</span>{time}</div>\n  <div class=\"msg-body\">{}</div>\n",
        idx + 1,
        markdown_to_html(&exchange.user_text()),
    ));
    for attachment in exchange.attachments() {
        write_attachment(output, ids, attachment);
    }
    output.push_str("</div>\n");
}

fn write_assistant_message(output: &mut String, ids: &mut IdGen, exchange: &Exchange<'_>) {
    output.push_str("<div class=\"msg assistant\">\n  <div class=\"msg-header\"><span class=\"author\">Assistant</span></div>\n  <div class=\"msg-body\">");
    for segment in exchange_segments(exchange) {
        write_segment(output, ids, &segment);
    }
    output.push_str("</div>\n");

    let badges = request_badges(exchange);
    if !badges.is_empty() {
        let id = ids.next("meta");
        output.push_str(&format!(
            "  <div class=\"request-meta\"><div onclick=\"toggle('{id}')\" class=\"meta-toggle\">ℹ️ Request info</div>\
             <div id=\"{id}\" style=\"display:none;\" class=\"collapsible meta-details\">{}</div></div>\n",
            badges.join(" "),
        ));
    }
    output.push_str("</div>\n");
}

fn exchange_segments(exchange: &Exchange<'_>) -> Vec<Segment> {
    exchange
        .response()
        .map(|response| group(interpret_response(response)))
        .unwrap_or_default()
}

fn write_segment(output: &mut String, ids: &mut IdGen, segment: &Segment) {
    match segment {
        Segment::Block(block) => write_block(output, ids, block),
        Segment::Group(group) => write_group(output, ids, group),
    }
}

fn write_group(output: &mut String, ids: &mut IdGen, group: &GroupBlock) {
    let id = ids.next("group");
    let count = group.status.tool_count();
    let mut status = Vec::new();
    if group.status.completed > 0 {
        status.push(format!("{} ✅", group.status.completed));
    }
    if group.status.pending > 0 {
        status.push(format!("{} ⏳", group.status.pending));
    }
    let check = if group.status.is_fully_complete() { "✔" } else { "○" };

    output.push_str(&format!(
        "<div class=\"tool-group\">\n<div onclick=\"toggle('{id}')\" class=\"tool-group-header\">\
         <span id=\"chevron_{id}\">▶</span><span>{check}</span><span class=\"tool-group-title\">{}</span>\
         <span class=\"tool-group-count\">{count} tool{}</span><span class=\"tool-group-status\">{}</span></div>\n\
         <div id=\"{id}\" style=\"display:none;\" class=\"collapsible tool-group-content\">\n",
        escape_html(&group.title),
        if count == 1 { "" } else { "s" },
        status.join(" "),
    ));
    for block in &group.blocks {
        write_block(output, ids, block);
    }
    output.push_str("</div>\n</div>\n");
}

fn write_block(output: &mut String, ids: &mut IdGen, block: &Block) {
    match block {
        Block::Text(text) => output.push_str(&text.html),
        Block::ToolCall(tool) => write_tool_call(output, ids, tool),
        Block::Thinking(thinking) => write_thinking(output, ids, thinking),
        Block::ReasoningDone { stop_reason } => {
            let reason = stop_reason
                .as_deref()
                .map(|reason| format!(" ({})", escape_html(reason)))
                .unwrap_or_default();
            output.push_str(&format!(
                "<div class=\"thinking-done\">💭 Reasoning complete{reason}</div>\n"
            ));
        }
        Block::FileEdit(edit) => write_file_edit(output, ids, edit),
        Block::Progress(progress) => output.push_str(&format!(
            "<div class=\"progress-task\">{} <span>{}</span></div>\n",
            progress.status_glyph(),
            escape_html(&progress.label),
        )),
        Block::McpStart { server_ids } => {
            if server_ids.is_empty() {
                output.push_str("<div class=\"mcp-servers\">🔌 MCP servers initialized</div>\n");
            } else {
                output.push_str(&format!(
                    "<div class=\"mcp-servers\">🔌 MCP servers started: {}</div>\n",
                    escape_html(&server_ids.join(", ")),
                ));
            }
        }
        Block::CodeblockRef { file_name, is_edit } => output.push_str(&format!(
            "<div class=\"codeblock-uri\">{} <span class=\"codeblock-path\">{}</span></div>\n",
            if *is_edit { "✏️" } else { "📄" },
            escape_html(file_name),
        )),
    }
}

fn write_tool_call(output: &mut String, ids: &mut IdGen, tool: &ToolCallBlock) {
    let id = ids.next("tool");
    let summary = tool
        .summary
        .as_deref()
        .map(|summary| format!("<span class=\"tool-summary\">{}</span>", escape_html(summary)))
        .unwrap_or_default();
    let badges = [tool.confirmation.map(str::to_string), tool.source.clone()]
        .into_iter()
        .flatten()
        .map(|badge| format!("<span class=\"tool-meta-badge\">{}</span>", escape_html(&badge)))
        .collect::<String>();

    output.push_str(&format!(
        "<div class=\"tool-call\">\n<div onclick=\"toggle('{id}')\" class=\"tool-header\">\
         <span>{}</span><span class=\"tool-name\">{}</span>{summary}<span class=\"tool-badges\">{badges}<span>{}</span></span></div>\n\
         <div id=\"{id}\" style=\"display:none;\" class=\"collapsible tool-details\">\n",
        tool.icon,
        escape_html(&tool.display_name),
        tool.status_glyph(),
    ));

    if !tool.has_details() {
        output.push_str("<span class=\"no-details\">No additional details</span>\n");
    }
    if let Some(invocation) = &tool.invocation {
        output.push_str(&format!(
            "<div class=\"tool-detail-section\"><strong>📋 Invocation:</strong><pre class=\"detail-pre\">{}</pre></div>\n",
            escape_html(invocation),
        ));
    }
    if let Some(terminal) = &tool.terminal {
        let cwd = terminal
            .cwd
            .as_deref()
            .map(|cwd| format!("<div class=\"terminal-cwd\">📂 {}</div>", escape_html(cwd)))
            .unwrap_or_default();
        let exit = terminal
            .exit_code
            .map(|code| {
                let class = if code == 0 { "exit-success" } else { "exit-error" };
                format!("<span class=\"{class}\">exit: {code}</span>")
            })
            .unwrap_or_default();
        let duration = terminal
            .duration_ms
            .map(|ms| format!("<span class=\"tool-meta-badge\">{}</span>", format_duration(ms)))
            .unwrap_or_default();
        let text = terminal.output.as_deref().unwrap_or_default().trim();
        let text = if text.is_empty() { "(no output)" } else { text };
        output.push_str(&format!(
            "<div class=\"terminal-block\">{cwd}<div class=\"terminal-cmd\">$ {}</div><div class=\"terminal-badges\">{exit}{duration}</div>\
             <pre class=\"terminal-output\">{}</pre></div>\n",
            escape_html(&terminal.command),
            escape_html(text),
        ));
    }
    if !tool.todo_list.is_empty() {
        output.push_str("<table class=\"todo-table\"><tr><th></th><th>#</th><th>Task</th><th>Status</th></tr>");
        for entry in &tool.todo_list {
            let icon = match entry.status.as_str() {
                "completed" => "✅",
                "in-progress" => "🔄",
                "not-started" => "⬜",
                _ => "❓",
            };
            output.push_str(&format!(
                "<tr><td>{icon}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&entry.id),
                escape_html(&entry.title),
                escape_html(&entry.status),
            ));
        }
        output.push_str("</table>\n");
    }
    if let Some(search) = &tool.search {
        output.push_str("<div class=\"search-results-block\">");
        for hit in &search.hits {
            output.push_str(&format!(
                "<div class=\"search-result-item\">📄 <span class=\"search-file\">{}</span> <span class=\"search-line\">{}</span> <span class=\"search-path\">{}</span></div>",
                escape_html(&hit.file_name),
                escape_html(&hit.lines),
                escape_html(&hit.path),
            ));
        }
        if search.omitted > 0 {
            output.push_str(&format!(
                "<div class=\"search-result-item\">... and {} more results</div>",
                search.omitted
            ));
        }
        output.push_str("</div>\n");
    }
    if let Some(input) = &tool.input {
        output.push_str(&format!(
            "<div class=\"mcp-io\"><strong>📥 Input:</strong><pre class=\"detail-pre\">{}</pre></div>\n",
            escape_html(input),
        ));
    }
    for tool_output in &tool.outputs {
        let icon = match tool_output.is_error {
            Some(true) => " ❌",
            Some(false) => " ✅",
            None => "",
        };
        output.push_str(&format!(
            "<div class=\"mcp-io\"><strong>📤 Output{icon}:</strong><pre class=\"detail-pre\">{}</pre></div>\n",
            escape_html(&tool_output.text),
        ));
    }

    output.push_str("</div>\n</div>\n");
}

fn write_thinking(output: &mut String, ids: &mut IdGen, thinking: &ThinkingBlock) {
    let id = ids.next("think");
    let title = thinking
        .title
        .as_deref()
        .map(|title| format!(": {}", escape_html(title)))
        .unwrap_or_default();
    output.push_str(&format!(
        "<div class=\"thinking-block\">\n<div onclick=\"toggle('{id}')\" class=\"thinking-header\">\
         <span>💭</span><span class=\"thinking-title\">Thinking{title}</span><span class=\"thinking-preview\">{}</span></div>\n\
         <div id=\"{id}\" style=\"display:none;\" class=\"collapsible thinking-content\"><pre class=\"detail-pre\">{}</pre></div>\n</div>\n",
        escape_html(&thinking.preview),
        escape_html(&thinking.text),
    ));
}

fn write_file_edit(output: &mut String, ids: &mut IdGen, edit: &FileEditBlock) {
    let id = ids.next("edit");
    output.push_str(&format!(
        "<div class=\"file-edit-block\">\n<div onclick=\"toggle('{id}')\" class=\"file-edit-header\">\
         <span>📝</span><span class=\"file-edit-name\">{}</span><span class=\"file-edit-meta\">{} edits, ~{} lines</span>\
         <span class=\"file-edit-path\">{}</span><span>{}</span></div>\n\
         <div id=\"{id}\" style=\"display:none;\" class=\"collapsible file-edit-content\"><pre class=\"detail-pre\">{}</pre></div>\n</div>\n",
        escape_html(&edit.file_name),
        edit.edit_count,
        edit.line_count,
        escape_html(&edit.path),
        if edit.done { "✅" } else { "⏳" },
        escape_html(&edit.text),
    ));
}

fn request_badges(exchange: &Exchange<'_>) -> Vec<String> {
    let mut badges = Vec::new();
    let mut badge = |class: &str, text: String| {
        badges.push(format!(
            "<span class=\"meta-badge {class}\">{}</span>",
            escape_html(&text)
        ));
    };

    if let Some(model) = exchange.model_id() {
        badge("meta-model", format!("🤖 {model}"));
    }
    if let Some(time) = exchange.timestamp_ms().and_then(clock_time) {
        badge("", format!("🕐 {time}"));
    }
    let result = exchange.result();
    if let Some(details) = &result.details {
        badge("meta-details", format!("📌 {details}"));
    }
    if let Some(state) = exchange.model_state() {
        badge("meta-state", model_state_label(state));
    }
    if let Some((name, version)) = exchange.agent() {
        let version = version.map(|version| format!(" v{version}")).unwrap_or_default();
        badge("", format!("🤖 Agent: {name}{version}"));
    }
    if let Some(error) = result.error.as_ref().and_then(|error| error.summary()) {
        badge("meta-error", format!("⚠️ {error}"));
    }
    if let Some(total) = result.total_elapsed_ms {
        badge("", format!("⏱️ {} total", format_duration(total)));
    }
    if let Some(first) = result.first_progress_ms {
        badge("", format!("⚡ {} first token", format_duration(first)));
    }
    if let Some(tokens) = result.prompt_tokens {
        badge("meta-tokens", format!("📥 {} prompt tokens", thousands(tokens)));
    }
    if let Some(tokens) = result.output_tokens {
        badge("meta-tokens", format!("📤 {} output tokens", thousands(tokens)));
    }
    if let Some(rounds) = result.tool_call_rounds {
        badge("", format!("🔄 {rounds} tool call rounds"));
    }
    let references = exchange.content_references();
    if !references.is_empty() {
        badge("", format!("📎 {}", references.join(", ")));
    }
    let edited = exchange.edited_files();
    if !edited.is_empty() {
        badge("meta-edited", format!("✏️ Edited: {}", edited.join(", ")));
    }
    let followups = exchange.followup_count();
    if followups > 0 {
        badge("", format!("{followups} follow-ups"));
    }

    badges
}

fn model_state_label(state: i64) -> String {
    match state {
        0 => "⬜ Pending".to_string(),
        1 => "🔄 In Progress".to_string(),
        2 => "❌ Canceled".to_string(),
        4 => "✅ Completed".to_string(),
        other => format!("State: {other}"),
    }
}

fn write_attachment(output: &mut String, ids: &mut IdGen, attachment: &Map<String, Value>) {
    let id = ids.next("att");
    let var_id = attachment
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    let name = attachment
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    let value = attachment.get("value").unwrap_or(&Value::Null);
    let value_len = match value {
        Value::Null => 0,
        Value::String(text) => text.chars().count(),
        other => other.to_string().chars().count(),
    };
    let lower_name = name.to_lowercase();
    let (icon, kind) = if var_id.contains("prompt") || lower_name.contains("prompt") {
        ("📋", "prompt")
    } else if ["image", "pasted", "screenshot"]
        .iter()
        .any(|marker| lower_name.contains(marker))
    {
        ("🖼️", "image")
    } else if var_id.contains("copilot-instructions") {
        ("⚙️", "instructions")
    } else if value_len > LARGE_ATTACHMENT_CHARS {
        ("📦", "large attachment")
    } else {
        ("📄", "file")
    };
    let size = if value_len > 0 {
        human_size(value_len as u64)
    } else {
        String::new()
    };

    let preview = match value {
        Value::String(data) if kind == "image" && value_len > INLINE_IMAGE_MIN_CHARS => {
            if data.starts_with("data:image") {
                format!("<div><img src=\"{}\" style=\"max-width:100%;max-height:300px;\" /></div>", escape_html(data))
            } else {
                format!("<div class=\"image-note\">Image data ({size})</div>")
            }
        }
        _ => String::new(),
    };

    let mut display = attachment_display(value);
    if display.chars().count() > ATTACHMENT_PREVIEW_CHARS {
        display = display.chars().take(ATTACHMENT_PREVIEW_CHARS).collect();
        display.push_str(&format!("\n\n... (truncated, total {size})"));
    }

    let metadata = attachment
        .iter()
        .filter(|(key, _)| key.as_str() != "value")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<Map<String, Value>>();
    let metadata_block = if metadata.is_empty() {
        String::new()
    } else {
        let meta_id = format!("{id}_meta");
        let pretty = serde_json::to_string_pretty(&metadata).unwrap_or_default();
        format!(
            "<div><span onclick=\"toggle('{meta_id}')\" class=\"attachment-meta-toggle\">📋 metadata ▸</span>\
             <pre id=\"{meta_id}\" style=\"display:none;\" class=\"collapsible detail-pre\">{}</pre></div>",
            escape_html(&pretty),
        )
    };

    output.push_str(&format!(
        "<div class=\"attachment-item\">\n<div onclick=\"toggle('{id}')\" class=\"attachment-header\">\
         <span>{icon}</span><span class=\"attachment-name\">{}</span><span class=\"attachment-meta\">{kind} • {size}</span></div>\n\
         <div id=\"{id}\" style=\"display:none;\" class=\"collapsible attachment-content\">{preview}<pre class=\"detail-pre\">{}</pre>{metadata_block}</div>\n</div>\n",
        escape_html(name),
        escape_html(&display),
    ));
}

/// Structured values are pretty printed, including JSON carried inside strings.
fn attachment_display(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => {
                serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| text.clone())
            }
            _ => text.clone(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn render_text(document: &Document, meta: &SessionMeta) -> String {
    let requests = document.requests();
    let title = document.title().unwrap_or(&meta.session_id);

    let mut lines = vec![
        format!("# Chat: {title}"),
        format!("# Session: {}", meta.session_id),
        format!("# Messages: {}", requests.len()),
        String::new(),
    ];

    for (idx, exchange) in requests.iter().enumerate() {
        lines.push("=".repeat(RULE_WIDTH));
        lines.push(format!("[USER] Message {}", idx + 1));
        lines.push("=".repeat(RULE_WIDTH));
        lines.push(exchange.user_text());
        lines.push(String::new());

        lines.push("[ASSISTANT]".to_string());
        lines.push("-".repeat(RULE_WIDTH));
        for segment in exchange_segments(exchange) {
            match segment {
                Segment::Block(block) => push_block_text(&mut lines, &block, ""),
                Segment::Group(group) => {
                    let count = group.status.tool_count();
                    lines.push(format!(
                        "[{}] {count} tool{} ({} ✅ {} ⏳)",
                        group.title,
                        if count == 1 { "" } else { "s" },
                        group.status.completed,
                        group.status.pending,
                    ));
                    for block in &group.blocks {
                        push_block_text(&mut lines, block, "  ");
                    }
                }
            }
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn push_block_text(lines: &mut Vec<String>, block: &Block, indent: &str) {
    match block {
        Block::Text(text) => lines.extend(
            text.markdown
                .lines()
                .map(|line| format!("{indent}{line}")),
        ),
        Block::ToolCall(tool) => {
            let summary = tool
                .summary
                .as_deref()
                .map(|summary| format!(": {summary}"))
                .unwrap_or_default();
            lines.push(format!(
                "{indent}{} {} {}{summary}",
                tool.icon,
                tool.display_name,
                tool.status_glyph()
            ));
            if let Some(terminal) = &tool.terminal {
                lines.push(format!("{indent}  $ {}", terminal.command));
                let output = terminal.output.as_deref().unwrap_or_default().trim();
                let output_lines = output.lines().collect::<Vec<_>>();
                lines.extend(
                    output_lines
                        .iter()
                        .take(TERMINAL_TEXT_LINES)
                        .map(|line| format!("{indent}  {line}")),
                );
                if output_lines.len() > TERMINAL_TEXT_LINES {
                    lines.push(format!(
                        "{indent}  ... ({} more lines)",
                        output_lines.len() - TERMINAL_TEXT_LINES
                    ));
                }
            }
        }
        Block::Thinking(thinking) => {
            let title = thinking
                .title
                .as_deref()
                .map(|title| format!(" ({title})"))
                .unwrap_or_default();
            lines.push(format!("{indent}💭 Thinking{title}: {}", thinking.preview));
        }
        Block::ReasoningDone { .. } => lines.push(format!("{indent}💭 Reasoning complete")),
        Block::FileEdit(edit) => lines.push(format!(
            "{indent}📝 {} ({} edits, ~{} lines) {}",
            edit.file_name,
            edit.edit_count,
            edit.line_count,
            if edit.done { "✅" } else { "⏳" },
        )),
        Block::Progress(progress) => lines.push(format!(
            "{indent}{} {}",
            progress.status_glyph(),
            progress.label
        )),
        Block::McpStart { server_ids } => lines.push(if server_ids.is_empty() {
            format!("{indent}🔌 MCP servers initialized")
        } else {
            format!("{indent}🔌 MCP servers started: {}", server_ids.join(", "))
        }),
        Block::CodeblockRef { file_name, is_edit } => lines.push(format!(
            "{indent}{} {file_name}",
            if *is_edit { "✏️" } else { "📄" }
        )),
    }
}

fn page_title(document: &Document, session_id: &str) -> String {
    document.title().map_or_else(
        || format!("Session {}", session_id.chars().take(8).collect::<String>()),
        ToString::to_string,
    )
}

fn models_used(requests: &[Exchange<'_>]) -> String {
    let mut models = Vec::<&str>::new();
    for model in requests.iter().filter_map(Exchange::model_id) {
        if !models.contains(&model) {
            models.push(model);
        }
    }
    if models.is_empty() {
        "unknown".to_string()
    } else {
        models.join(", ")
    }
}

fn clock_time(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|time| time.with_timezone(&Local).format("%H:%M:%S").to_string())
}

/// `12345` as `12,345`.
fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{SessionMeta, render_html, render_json, render_text, thousands};
    use crate::document::Document;

    fn meta() -> SessionMeta {
        SessionMeta {
            session_id: "0123456789abcdef-session".to_string(),
            workspace: Some("my-repo".to_string()),
            exported_at: None,
        }
    }

    fn sample() -> Document {
        Document::new(json!({
            "customTitle": "Fix <parser>",
            "requests": [{
                "message": {"text": "Why does **this** fail?"},
                "modelId": "copilot/gpt-4.1",
                "result": {
                    "timings": {"totalElapsed": 2500},
                    "metadata": {"promptTokens": 12345}
                },
                "variableData": {"variables": [
                    {"id": "file:///repo/src/lib.rs", "name": "lib.rs", "value": "fn main() {}"}
                ]},
                "response": [
                    {"value": "Let me look."},
                    {"kind": "toolInvocationSerialized", "toolId": "copilot_readFile", "toolCallId": "a",
                     "isComplete": true, "pastTenseMessage": "Read lib.rs", "generatedTitle": "Reading"},
                    {"kind": "toolInvocationSerialized", "toolId": "run_in_terminal", "toolCallId": "b",
                     "isComplete": true, "generatedTitle": "Reading",
                     "toolSpecificData": {"kind": "terminal", "commandLine": {"original": "cargo test"},
                                          "terminalCommandOutput": {"text": "ok"}}},
                    {"value": "Fixed."}
                ]
            }]
        }))
    }

    #[test]
    fn html_page_escapes_and_groups() {
        let html = render_html(&sample(), &meta());
        assert!(html.contains("<h1>Fix &lt;parser&gt;</h1>"));
        assert!(html.contains("Why does <strong>this</strong> fail?"));
        assert!(html.contains("class=\"tool-group-title\">Reading</span>"));
        assert!(html.contains("2 tools"));
        assert!(html.contains("$ cargo test"));
        assert!(html.contains("📥 12,345 prompt tokens"));
        assert!(html.contains("⏱️ 2.5s total"));
        assert!(html.contains("Session: 0123456789abcdef..."));
        assert!(html.contains("attachment-name\">lib.rs</span>"));
    }

    #[test]
    fn html_ids_are_unique_per_render() {
        let html = render_html(&sample(), &meta());
        assert!(html.contains("id=\"att_0\""));
        assert!(html.contains("id=\"group_1\""));
        assert!(html.contains("id=\"tool_2\""));
        assert!(html.contains("id=\"tool_3\""));
        assert!(html.contains("id=\"meta_4\""));
    }

    #[test]
    fn empty_session_page() {
        let html = render_html(&Document::new(json!({"requests": []})), &meta());
        assert!(html.contains("No messages in this session"));
        assert!(html.contains("<h1>Session 01234567</h1>"));
    }

    #[test]
    fn text_transcript_lists_blocks() {
        let text = render_text(&sample(), &meta());
        assert!(text.starts_with("# Chat: Fix <parser>\n# Session: 0123456789abcdef-session\n# Messages: 1"));
        assert!(text.contains("[USER] Message 1"));
        assert!(text.contains("[Reading] 2 tools (2 ✅ 0 ⏳)"));
        assert!(text.contains("  📝 Read File ✅: Read lib.rs"));
        assert!(text.contains("    $ cargo test"));
        assert!(text.contains("Fixed."));
    }

    #[test]
    fn text_terminal_output_is_capped() {
        let output = (1..=25).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let document = Document::new(json!({"requests": [{
            "message": "run it",
            "response": [{"kind": "toolInvocationSerialized", "toolId": "run_in_terminal",
                          "toolSpecificData": {"kind": "terminal", "commandLine": "make",
                                               "terminalCommandOutput": output}}]
        }]}));
        let text = render_text(&document, &meta());
        assert!(text.contains("  line 20\n  ... (5 more lines)"));
        assert!(!text.contains("line 21"));
    }

    #[test]
    fn json_is_pretty_printed() {
        let json = render_json(&Document::new(json!({"requests": []}))).expect("render");
        assert_eq!(json, "{\n  \"requests\": []\n}");
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(7), "7");
        assert_eq!(thousands(1234), "1,234");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }
}
