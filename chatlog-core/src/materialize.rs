//! Replays a delta log (`.jsonl` chat session) into a complete document.
//!
//! Line 0 carries the initial state (`kind: 0`). Every later line either sets
//! a value at a key path (`kind: 1`) or appends to an array at a key path
//! (`kind: 2`, optionally inserting at index `i`). The log may be cut short by
//! a concurrent writer, so bad lines and records that race ahead of the
//! structure are dropped instead of failing the replay.

use serde_json::{Map, Value};
use tracing::debug;

use crate::document::Document;
use crate::error::{DecodeError, MaterializationError};
use crate::path::{PathAddress, PathStep};

/// Most null slots a single step may add past the end of a sequence.
const MAX_SEQUENCE_PAD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReplaceInitial,
    SetAtPath,
    AppendAtPath,
}

impl Operation {
    fn from_kind(kind: i64) -> Option<Self> {
        match kind {
            0 => Some(Self::ReplaceInitial),
            1 => Some(Self::SetAtPath),
            2 => Some(Self::AppendAtPath),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub operation: Operation,
    pub path: PathAddress,
    pub value: Value,
    pub insert_index: Option<i64>,
}

impl MutationRecord {
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let mut raw = serde_json::from_str::<Value>(line)?;
        let kind = raw
            .get("kind")
            .and_then(Value::as_i64)
            .ok_or(DecodeError::MissingKind)?;
        let operation = Operation::from_kind(kind).ok_or(DecodeError::UnknownKind(kind))?;

        let path = match raw.get("k") {
            Some(Value::Null) | None => PathAddress::default(),
            Some(path) => PathAddress::from_value(path)?,
        };
        let insert_index = raw.get("i").and_then(Value::as_i64);
        let value = raw.get_mut("v").map(Value::take).unwrap_or_default();

        Ok(Self {
            operation,
            path,
            value,
            insert_index,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyPath,
    /// A non-container value sits at this depth of the path.
    ScalarInPath { depth: usize },
    /// A key step addressed a sequence and does not parse as an index.
    KeyOnSequence { depth: usize },
    /// An index at this depth lies too far past the end of its sequence.
    IndexOutOfRange { depth: usize },
    TargetNotSequence,
    UnexpectedReplace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
    pub undecodable: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub document: Document,
    pub stats: ReplayStats,
}

pub fn materialize<'a, I>(lines: I) -> Result<Document, MaterializationError>
where
    I: IntoIterator<Item = &'a str>,
{
    replay(lines).map(|replay| replay.document)
}

pub fn replay<'a, I>(lines: I) -> Result<Replay, MaterializationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stats = ReplayStats::default();
    let mut snapshot = None::<Value>;

    for (line_idx, line) in lines.into_iter().enumerate() {
        let line_no = line_idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record = match MutationRecord::decode(trimmed) {
            Ok(record) => record,
            Err(err) => {
                debug!(line = line_no, error = %err, "skipping undecodable delta record");
                stats.undecodable += 1;
                continue;
            }
        };

        match snapshot.as_mut() {
            Some(document) => match apply(document, &record) {
                ApplyOutcome::Applied => stats.applied += 1,
                ApplyOutcome::Skipped(reason) => {
                    debug!(line = line_no, path = %record.path, ?reason, "dropping delta record");
                    stats.skipped += 1;
                }
            },
            None if record.operation == Operation::ReplaceInitial => {
                snapshot = Some(record.value);
            }
            None => return Err(MaterializationError::NoInitialState),
        }
    }

    let snapshot = snapshot.ok_or(MaterializationError::NoInitialState)?;
    debug!(
        applied = stats.applied,
        skipped = stats.skipped,
        undecodable = stats.undecodable,
        "delta log replayed"
    );

    Ok(Replay {
        document: Document::new(snapshot),
        stats,
    })
}

/// Applies one record to the working snapshot.
///
/// A skipped record never leaves partial changes behind: containers are only
/// created below the last pre-existing node, and every failure is detected on
/// pre-existing nodes.
pub fn apply(document: &mut Value, record: &MutationRecord) -> ApplyOutcome {
    match record.operation {
        Operation::ReplaceInitial => ApplyOutcome::Skipped(SkipReason::UnexpectedReplace),
        Operation::SetAtPath => set_at_path(document, &record.path, record.value.clone()),
        Operation::AppendAtPath => append_at_path(
            document,
            &record.path,
            &record.value,
            record.insert_index,
        ),
    }
}

fn set_at_path(document: &mut Value, path: &PathAddress, value: Value) -> ApplyOutcome {
    let Some((last, parents)) = path.split_last() else {
        return ApplyOutcome::Skipped(SkipReason::EmptyPath);
    };

    let parent = match navigate_to_parent(document, parents, last) {
        Ok(parent) => parent,
        Err(reason) => return ApplyOutcome::Skipped(reason),
    };

    match slot(parent, last, parents.len()) {
        Ok(target) => {
            *target = value;
            ApplyOutcome::Applied
        }
        Err(reason) => ApplyOutcome::Skipped(reason),
    }
}

fn append_at_path(
    document: &mut Value,
    path: &PathAddress,
    value: &Value,
    insert_index: Option<i64>,
) -> ApplyOutcome {
    let Some((last, parents)) = path.split_last() else {
        return ApplyOutcome::Skipped(SkipReason::EmptyPath);
    };

    let parent = match navigate_to_parent(document, parents, last) {
        Ok(parent) => parent,
        Err(reason) => return ApplyOutcome::Skipped(reason),
    };

    let target = match slot(parent, last, parents.len()) {
        Ok(target) => target,
        Err(reason) => return ApplyOutcome::Skipped(reason),
    };

    if target.is_null() {
        *target = Value::Array(Vec::new());
    }
    let Value::Array(items) = target else {
        return ApplyOutcome::Skipped(SkipReason::TargetNotSequence);
    };

    let additions = match value {
        Value::Array(values) => values.clone(),
        other => vec![other.clone()],
    };

    match insert_index {
        Some(index) => {
            let start = clamp_insert_index(index, items.len());
            for (offset, item) in additions.into_iter().enumerate() {
                items.insert(start + offset, item);
            }
        }
        None => items.extend(additions),
    }

    ApplyOutcome::Applied
}

/// Insert position with list-insert semantics: negative counts from the end,
/// out-of-range positions clamp to the ends.
fn clamp_insert_index(index: i64, len: usize) -> usize {
    if index >= 0 {
        usize::try_from(index).map_or(len, |index| index.min(len))
    } else {
        let from_end = usize::try_from(index.unsigned_abs()).unwrap_or(usize::MAX);
        len.saturating_sub(from_end)
    }
}

fn navigate_to_parent<'v>(
    document: &'v mut Value,
    parents: &[PathStep],
    last: &PathStep,
) -> Result<&'v mut Value, SkipReason> {
    let mut current = document;
    for (depth, step) in parents.iter().enumerate() {
        let next_step = parents.get(depth + 1).unwrap_or(last);
        let child = slot(current, step, depth)?;
        if child.is_null() {
            *child = empty_container_for(next_step);
        }
        current = child;
    }

    if current.is_null() {
        *current = empty_container_for(last);
    }
    Ok(current)
}

/// Mutable slot addressed by `step` inside `container`, creating it (as null)
/// when missing.
fn slot<'v>(
    container: &'v mut Value,
    step: &PathStep,
    depth: usize,
) -> Result<&'v mut Value, SkipReason> {
    match container {
        Value::Object(map) => Ok(map.entry(step.as_key()).or_insert(Value::Null)),
        Value::Array(items) => {
            let index = step.as_index().ok_or(SkipReason::KeyOnSequence { depth })?;
            if items.len() <= index {
                let new_len = index
                    .checked_add(1)
                    .filter(|len| *len - items.len() <= MAX_SEQUENCE_PAD)
                    .ok_or(SkipReason::IndexOutOfRange { depth })?;
                items.resize(new_len, Value::Null);
            }
            Ok(&mut items[index])
        }
        _ => Err(SkipReason::ScalarInPath { depth }),
    }
}

fn empty_container_for(step: &PathStep) -> Value {
    match step {
        PathStep::Key(_) => Value::Object(Map::new()),
        PathStep::Index(_) => Value::Array(Vec::new()),
    }
}
