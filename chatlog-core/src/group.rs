use crate::block::Block;

/// Grouper output: a lone block or a round of blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Block(Block),
    Group(GroupBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBlock {
    pub title: String,
    pub blocks: Vec<Block>,
    pub status: GroupStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStatus {
    pub completed: usize,
    pub pending: usize,
}

impl GroupStatus {
    fn of(blocks: &[Block]) -> Self {
        blocks
            .iter()
            .filter_map(Block::as_tool_call)
            .fold(Self::default(), |mut status, tool| {
                if tool.is_complete {
                    status.completed += 1;
                } else {
                    status.pending += 1;
                }
                status
            })
    }

    pub fn tool_count(&self) -> usize {
        self.completed + self.pending
    }

    pub fn is_fully_complete(&self) -> bool {
        self.completed > 0 && self.pending == 0
    }
}

/// Wraps tool calls that share a round tag, plus their untagged neighbours,
/// into [`GroupBlock`]s. Everything else passes through in order.
pub fn group(blocks: Vec<Block>) -> Vec<Segment> {
    let mut output: Vec<Segment> = Vec::with_capacity(blocks.len());
    let mut blocks = blocks.into_iter().peekable();

    while let Some(block) = blocks.next() {
        let tag = match &block {
            Block::ToolCall(tool) => tool.round_tag.clone(),
            _ => None,
        };
        let Some(tag) = tag else {
            output.push(Segment::Block(block));
            continue;
        };

        let mut run = vec![block];
        while let Some(next) = blocks.next_if(|next| {
            next.as_tool_call().is_some() && next.round_tag() == Some(tag.as_str())
        }) {
            run.push(next);
        }
        while let Some(next) = blocks.next_if(is_untagged_absorbable) {
            run.push(next);
        }

        let mut pulled = Vec::new();
        while let Some(Segment::Block(previous)) = output.last()
            && is_untagged_absorbable(previous)
        {
            if let Some(Segment::Block(previous)) = output.pop() {
                pulled.push(previous);
            }
        }
        pulled.reverse();
        pulled.extend(run);

        let status = GroupStatus::of(&pulled);
        output.push(Segment::Group(GroupBlock {
            title: tag,
            blocks: pulled,
            status,
        }));
    }

    output
}

fn is_untagged_absorbable(block: &Block) -> bool {
    block.is_absorbable() && block.round_tag().is_none()
}

#[cfg(test)]
mod tests {
    use super::{GroupStatus, Segment, group};
    use crate::block::{
        Block, FileEditBlock, ProgressBlock, TextBlock, ThinkingBlock, ToolCallBlock,
    };

    fn tool(id: &str, tag: Option<&str>, complete: bool) -> Block {
        Block::ToolCall(ToolCallBlock {
            tool_id: id.to_string(),
            tool_call_id: Some(id.to_string()),
            display_name: id.to_string(),
            icon: "🔧",
            is_complete: complete,
            summary: None,
            invocation: None,
            confirmation: None,
            source: None,
            terminal: None,
            todo_list: Vec::new(),
            search: None,
            input: None,
            outputs: Vec::new(),
            round_tag: tag.map(ToString::to_string),
        })
    }

    fn text(markdown: &str) -> Block {
        Block::Text(TextBlock {
            markdown: markdown.to_string(),
            html: markdown.to_string(),
        })
    }

    fn thinking(title: Option<&str>) -> Block {
        Block::Thinking(ThinkingBlock {
            text: "hmm".to_string(),
            title: title.map(ToString::to_string),
            preview: "hmm".to_string(),
        })
    }

    fn progress() -> Block {
        Block::Progress(ProgressBlock {
            label: "Working".to_string(),
            is_complete: true,
        })
    }

    fn file_edit(tag: Option<&str>) -> Block {
        Block::FileEdit(FileEditBlock {
            path: "/repo/src/lib.rs".to_string(),
            file_name: "lib.rs".to_string(),
            done: true,
            edit_count: 1,
            text: "fn main() {}".to_string(),
            line_count: 1,
            round_tag: tag.map(ToString::to_string),
        })
    }

    fn group_of(segment: &Segment) -> &super::GroupBlock {
        match segment {
            Segment::Group(group) => group,
            Segment::Block(block) => panic!("expected group, got {block:?}"),
        }
    }

    #[test]
    fn untagged_blocks_pass_through() {
        let blocks = vec![text("a"), tool("t1", None, true), progress()];
        let segments = group(blocks.clone());
        assert_eq!(
            segments,
            blocks.into_iter().map(Segment::Block).collect::<Vec<_>>()
        );
    }

    #[test]
    fn forward_absorption_stops_at_text() {
        let segments = group(vec![
            tool("t1", Some("Explore"), true),
            tool("t2", Some("Explore"), false),
            tool("t3", None, true),
            text("done"),
        ]);
        assert_eq!(segments.len(), 2);
        let group = group_of(&segments[0]);
        assert_eq!(group.title, "Explore");
        assert_eq!(group.blocks.len(), 3);
        assert_eq!(
            group.status,
            GroupStatus {
                completed: 2,
                pending: 1
            }
        );
        assert!(!group.status.is_fully_complete());
        assert!(matches!(segments[1], Segment::Block(Block::Text(_))));
    }

    #[test]
    fn untagged_file_edit_joins_preceding_round() {
        let segments = group(vec![
            tool("t1", Some("Fix bug"), true),
            tool("t2", Some("Fix bug"), true),
            file_edit(None),
        ]);
        assert_eq!(segments.len(), 1);
        let group = group_of(&segments[0]);
        assert_eq!(group.title, "Fix bug");
        assert_eq!(group.blocks.len(), 3);
        assert!(matches!(group.blocks[2], Block::FileEdit(_)));
        assert_eq!(group.status.tool_count(), 2);
    }

    #[test]
    fn backward_absorption_pulls_preceding_blocks() {
        let segments = group(vec![
            text("intro"),
            thinking(None),
            progress(),
            tool("t1", Some("Read"), true),
        ]);
        assert_eq!(segments.len(), 2);
        let group = group_of(&segments[1]);
        assert_eq!(group.blocks.len(), 3);
        assert!(matches!(group.blocks[0], Block::Thinking(_)));
        assert!(matches!(group.blocks[1], Block::Progress(_)));
        assert_eq!(group.status.tool_count(), 1);
        assert!(group.status.is_fully_complete());
    }

    #[test]
    fn different_tag_starts_a_new_group() {
        let segments = group(vec![
            tool("t1", Some("A"), true),
            tool("t2", Some("B"), true),
            tool("t3", None, true),
        ]);
        assert_eq!(segments.len(), 2);
        assert_eq!(group_of(&segments[0]).blocks.len(), 1);
        let second = group_of(&segments[1]);
        assert_eq!(second.title, "B");
        assert_eq!(second.blocks.len(), 2);
    }

    #[test]
    fn tagged_thinking_is_not_absorbed() {
        let segments = group(vec![
            thinking(Some("Plan")),
            tool("t1", Some("Read"), true),
            Block::ReasoningDone { stop_reason: None },
            tool("t2", None, true),
        ]);
        assert_eq!(segments.len(), 4);
        assert!(matches!(segments[0], Segment::Block(Block::Thinking(_))));
        assert_eq!(group_of(&segments[1]).blocks.len(), 1);
        assert!(matches!(
            segments[2],
            Segment::Block(Block::ReasoningDone { .. })
        ));
    }

    #[test]
    fn empty_input() {
        assert!(group(Vec::new()).is_empty());
    }
}
