use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::DecodeError;

/// One step into a nested document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    /// Sequence position addressed by this step, if it can address one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Key(key) => key.parse().ok(),
        }
    }

    /// Mapping key addressed by this step. Indices address their decimal form.
    pub fn as_key(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key:?}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Ordered list of steps from the document root.
///
/// Delta logs encode paths either as a JSON array or as a list literal string
/// such as `"['requests', 0, 'response']"`. Both decode to this one type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathAddress {
    steps: Vec<PathStep>,
}

impl PathAddress {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Splits into the steps leading to the parent container and the final step.
    pub fn split_last(&self) -> Option<(&PathStep, &[PathStep])> {
        self.steps.split_last()
    }

    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(step_from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::new),
            Value::String(raw) => raw.parse(),
            other => Err(DecodeError::InvalidPath(other.to_string())),
        }
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, step) in self.steps.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{step}")?;
        }
        write!(f, "]")
    }
}

impl FromStr for PathAddress {
    type Err = DecodeError;

    fn from_str(input: &str) -> Result<Self, DecodeError> {
        let invalid = || DecodeError::InvalidPath(input.to_string());
        let inner = input
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;

        let mut steps = Vec::new();
        let mut chars = inner.chars().peekable();

        loop {
            while chars
                .peek()
                .is_some_and(|ch| ch.is_whitespace() || *ch == ',')
            {
                chars.next();
            }

            let Some(&first) = chars.peek() else {
                break;
            };

            if first == '\'' || first == '"' {
                chars.next();
                let mut key = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some('n') => key.push('\n'),
                            Some('t') => key.push('\t'),
                            Some(escaped) => key.push(escaped),
                            None => return Err(invalid()),
                        },
                        ch if ch == first => {
                            closed = true;
                            break;
                        }
                        ch => key.push(ch),
                    }
                }
                if !closed {
                    return Err(invalid());
                }
                steps.push(PathStep::Key(key));
            } else {
                let mut token = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == ',' {
                        break;
                    }
                    token.push(ch);
                    chars.next();
                }
                let index = token.trim().parse::<usize>().map_err(|_| invalid())?;
                steps.push(PathStep::Index(index));
            }
        }

        Ok(Self::new(steps))
    }
}

fn step_from_value(value: &Value) -> Result<PathStep, DecodeError> {
    match value {
        Value::String(key) => Ok(PathStep::Key(key.clone())),
        Value::Number(number) => number
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .map(PathStep::Index)
            .ok_or_else(|| DecodeError::InvalidPath(number.to_string())),
        other => Err(DecodeError::InvalidPath(other.to_string())),
    }
}
