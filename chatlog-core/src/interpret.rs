//! Turns the raw `response` stream of one exchange into renderable blocks.
//!
//! The stream interleaves markdown fragments with structured items. Tool calls
//! usually appear twice: a `prepareToolInvocation` while the model streams and a
//! `toolInvocationSerialized` once the call resolved. Only the richer of the two
//! is rendered.

use std::collections::HashSet;

use serde_json::Value;

use crate::block::{Block, FileEditBlock, ProgressBlock, TextBlock, ThinkingBlock};
use crate::document::base_name;
use crate::item::{FileEdit, Thinking, ToolInvocation, TurnItem};
use crate::markdown::markdown_to_html;
use crate::tool::tool_call_block;

const PREVIEW_CHARS: usize = 150;

/// Interprets a whole `response` field.
///
/// A sequence is interpreted item by item. A single mapping with a `value` is
/// one text fragment. Anything else yields no blocks.
pub fn interpret_response(response: &Value) -> Vec<Block> {
    match response {
        Value::Array(items) => interpret(items),
        Value::Object(map) => match map.get("value") {
            Some(value) => {
                let text = value
                    .as_str()
                    .map_or_else(|| value.to_string(), ToString::to_string);
                vec![text_block(text)]
            }
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

pub fn interpret(items: &[Value]) -> Vec<Block> {
    let mut state = Interpreter::default();
    let mut cursor = 0;

    while cursor < items.len() {
        let Some(item) = TurnItem::from_value(&items[cursor]) else {
            cursor += 1;
            continue;
        };

        match item {
            TurnItem::Text(text) => state.pending_text.push_str(&text),
            TurnItem::InlineReference { name } => {
                state.pending_text.push_str(&format!(" 📁 `{name}` "));
            }
            TurnItem::Thinking(thinking) => {
                state.flush_text();
                if let Some(block) = thinking_block(thinking) {
                    state.blocks.push(block);
                }
            }
            TurnItem::PrepareTool(prepared) => {
                state.flush_text();
                match find_result(items, cursor + 1, &prepared) {
                    Some((position, result)) => {
                        state.push_tool(result);
                        cursor = position;
                    }
                    None => state.push_tool(prepared),
                }
            }
            TurnItem::ToolResult(result) => {
                let rendered = result
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| state.rendered.contains(id));
                if !rendered {
                    state.flush_text();
                    state.push_tool(result);
                }
            }
            TurnItem::FileEdit(edit) => {
                state.flush_text();
                state.blocks.push(file_edit_block(edit));
            }
            TurnItem::Progress(progress) => {
                state.flush_text();
                state.blocks.push(Block::Progress(ProgressBlock {
                    label: progress.label,
                    is_complete: progress.is_complete,
                }));
            }
            TurnItem::McpStart { server_ids } => {
                state.flush_text();
                state.blocks.push(Block::McpStart { server_ids });
            }
            TurnItem::CodeblockRef { path, is_edit } => {
                state.flush_text();
                state.blocks.push(Block::CodeblockRef {
                    file_name: base_name(&path).to_string(),
                    is_edit,
                });
            }
            TurnItem::UndoStop | TurnItem::Unknown => {}
        }

        cursor += 1;
    }

    state.flush_text();
    state.blocks
}

#[derive(Default)]
struct Interpreter {
    blocks: Vec<Block>,
    pending_text: String,
    rendered: HashSet<String>,
}

impl Interpreter {
    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let markdown = std::mem::take(&mut self.pending_text);
        self.blocks.push(text_block(markdown));
    }

    fn push_tool(&mut self, tool: ToolInvocation) {
        if let Some(id) = &tool.tool_call_id {
            self.rendered.insert(id.clone());
        }
        self.blocks.push(Block::ToolCall(tool_call_block(tool)));
    }
}

/// Nearest later result matching the preparation by call id or tool name.
fn find_result(
    items: &[Value],
    start: usize,
    prepared: &ToolInvocation,
) -> Option<(usize, ToolInvocation)> {
    let prepared_name = prepared_tool_name(prepared);
    items
        .iter()
        .enumerate()
        .skip(start)
        .find_map(|(position, raw)| {
            let TurnItem::ToolResult(result) = TurnItem::from_value(raw)? else {
                return None;
            };
            let same_call = prepared
                .tool_call_id
                .as_ref()
                .is_some_and(|id| result.tool_call_id.as_ref() == Some(id));
            let same_tool = prepared_name.is_some_and(|name| result.tool_id == name);
            (same_call || same_tool).then_some((position, result))
        })
}

/// Tool name of a preparation, unless it fell back to the placeholder.
fn prepared_tool_name(prepared: &ToolInvocation) -> Option<&str> {
    Some(prepared.tool_id.as_str()).filter(|name| *name != "unknown")
}

fn text_block(markdown: String) -> Block {
    let html = markdown_to_html(&markdown);
    Block::Text(TextBlock { markdown, html })
}

fn thinking_block(thinking: Thinking) -> Option<Block> {
    if let Some(stop_reason) = thinking.done {
        return Some(Block::ReasoningDone { stop_reason });
    }
    if thinking.text.is_empty() {
        return None;
    }
    let preview = preview(&thinking.text);
    Some(Block::Thinking(ThinkingBlock {
        text: thinking.text,
        title: thinking.title,
        preview,
    }))
}

/// First characters of the reasoning with whitespace runs collapsed.
fn preview(text: &str) -> String {
    let head = text.chars().take(PREVIEW_CHARS).collect::<String>();
    let mut preview = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}

fn file_edit_block(edit: FileEdit) -> Block {
    let text = edit.edit_texts.concat();
    let line_count = if text.is_empty() {
        0
    } else {
        text.matches('\n').count() + 1
    };

    Block::FileEdit(FileEditBlock {
        file_name: base_name(&edit.path).to_string(),
        done: edit.done,
        edit_count: edit.edit_texts.len(),
        text,
        line_count,
        round_tag: edit.generated_title,
        path: edit.path,
    })
}
