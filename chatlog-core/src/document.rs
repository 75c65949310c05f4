use serde_json::{Map, Value};

/// A fully materialized chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(Value);

impl Document {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Reads a legacy whole-document session (`.json`).
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw).map(Self)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn title(&self) -> Option<&str> {
        self.0
            .get("customTitle")
            .and_then(Value::as_str)
            .filter(|title| !title.trim().is_empty())
    }

    pub fn requests(&self) -> Vec<Exchange<'_>> {
        self.0
            .get("requests")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|request| request.is_object())
            .map(Exchange::new)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.0
            .get("requests")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// Borrowed view over one user/assistant round.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    raw: &'a Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDetails {
    pub message: Option<String>,
    pub code: Option<String>,
    pub response_is_incomplete: bool,
}

impl ErrorDetails {
    /// One-line description, if there is anything to say.
    pub fn summary(&self) -> Option<String> {
        let mut text = self
            .message
            .clone()
            .filter(|message| !message.is_empty())
            .or_else(|| self.code.clone())
            .unwrap_or_default();
        if self.response_is_incomplete {
            if text.is_empty() {
                text = "Response incomplete".to_string();
            } else {
                text.push_str(" (incomplete)");
            }
        }
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMeta {
    pub details: Option<String>,
    pub total_elapsed_ms: Option<f64>,
    pub first_progress_ms: Option<f64>,
    pub prompt_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub tool_call_rounds: Option<u64>,
    pub error: Option<ErrorDetails>,
}

impl<'a> Exchange<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &'a Value {
        self.raw
    }

    /// User prompt text: `message.text`, concatenated `message.parts`, or a bare string.
    pub fn user_text(&self) -> String {
        match self.raw.get("message") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Object(message)) => {
                if let Some(text) = message.get("text").and_then(Value::as_str) {
                    return text.to_string();
                }
                message
                    .get("parts")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect()
            }
            _ => String::new(),
        }
    }

    pub fn response(&self) -> Option<&'a Value> {
        self.raw.get("response")
    }

    pub fn model_id(&self) -> Option<&'a str> {
        non_empty_str(self.raw.get("modelId"))
    }

    /// Request time in epoch milliseconds.
    pub fn timestamp_ms(&self) -> Option<i64> {
        let timestamp = self.raw.get("timestamp")?;
        timestamp
            .as_i64()
            .or_else(|| timestamp.as_f64().map(|ms| ms as i64))
    }

    pub fn model_state(&self) -> Option<i64> {
        self.raw
            .get("modelState")
            .and_then(|state| state.get("value"))
            .and_then(Value::as_i64)
    }

    pub fn agent(&self) -> Option<(&'a str, Option<&'a str>)> {
        let agent = self.raw.get("agent")?;
        let name = non_empty_str(agent.get("name"))?;
        Some((name, non_empty_str(agent.get("extensionVersion"))))
    }

    pub fn result(&self) -> ResultMeta {
        let Some(result) = self.raw.get("result").filter(|value| value.is_object()) else {
            return ResultMeta::default();
        };

        let timings = result.get("timings");
        let metadata = result.get("metadata");
        let error = result
            .get("errorDetails")
            .and_then(Value::as_object)
            .filter(|details| !details.is_empty())
            .map(|details| ErrorDetails {
                message: details
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                code: details.get("code").and_then(scalar_to_string),
                response_is_incomplete: details
                    .get("responseIsIncomplete")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            });

        ResultMeta {
            details: non_empty_str(result.get("details")).map(ToString::to_string),
            total_elapsed_ms: timings
                .and_then(|timings| timings.get("totalElapsed"))
                .and_then(Value::as_f64)
                .filter(|ms| *ms > 0.0),
            first_progress_ms: timings
                .and_then(|timings| timings.get("firstProgress"))
                .and_then(Value::as_f64)
                .filter(|ms| *ms > 0.0),
            prompt_tokens: metadata
                .and_then(|metadata| metadata.get("promptTokens"))
                .and_then(Value::as_u64),
            output_tokens: metadata
                .and_then(|metadata| metadata.get("outputTokens"))
                .and_then(Value::as_u64),
            tool_call_rounds: metadata
                .and_then(|metadata| metadata.get("toolCallRounds"))
                .and_then(Value::as_u64),
            error,
        }
    }

    /// File names of instruction/context files referenced by the request.
    pub fn content_references(&self) -> Vec<String> {
        self.raw
            .get("contentReferences")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|reference| {
                let data = reference.get("reference").unwrap_or(reference);
                fs_path(data).map(|path| base_name(&path).to_string())
            })
            .collect()
    }

    pub fn edited_files(&self) -> Vec<String> {
        self.raw
            .get("editedFileEvents")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|event| event.get("uri").and_then(fs_path))
            .map(|path| base_name(&path).to_string())
            .collect()
    }

    pub fn followup_count(&self) -> usize {
        self.raw
            .get("followups")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    pub fn attachments(&self) -> Vec<&'a Map<String, Value>> {
        self.raw
            .get("variableData")
            .and_then(|data| data.get("variables"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .collect()
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// `fsPath`, then `path`, of a URI-like mapping (or the string itself).
pub(crate) fn fs_path(value: &Value) -> Option<String> {
    match value {
        Value::String(path) if !path.is_empty() => Some(path.clone()),
        Value::Object(map) => ["fsPath", "path"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|path| !path.is_empty())
            .map(ToString::to_string),
        _ => None,
    }
}

/// Last path segment, accepting both `/` and `\` separators.
pub(crate) fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Document, base_name};

    #[test]
    fn user_text_reads_text_parts_and_strings() {
        let document = Document::new(json!({
            "requests": [
                {"message": {"text": "plain"}},
                {"message": {"parts": [{"text": "a"}, {"kind": "x"}, {"text": "b"}]}},
                {"message": "bare"},
                "not a request"
            ]
        }));

        let texts = document
            .requests()
            .iter()
            .map(super::Exchange::user_text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["plain", "ab", "bare"]);
        assert_eq!(document.request_count(), 4);
    }

    #[test]
    fn result_metadata_is_collected() {
        let document = Document::new(json!({
            "customTitle": "Refactor parser",
            "requests": [{
                "modelId": "copilot/gpt-4.1",
                "timestamp": 1_700_000_000_000_i64,
                "result": {
                    "details": "GPT-4.1 • 1x",
                    "timings": {"totalElapsed": 2500, "firstProgress": 400},
                    "metadata": {"promptTokens": 12345, "outputTokens": 67, "toolCallRounds": 3},
                    "errorDetails": {"code": "canceled", "responseIsIncomplete": true}
                },
                "contentReferences": [{"reference": {"fsPath": "/repo/.github/copilot-instructions.md"}}],
                "editedFileEvents": [{"uri": {"path": "/repo/src/lib.rs"}}],
                "followups": [{}, {}]
            }]
        }));

        assert_eq!(document.title(), Some("Refactor parser"));
        let requests = document.requests();
        let exchange = requests[0];
        assert_eq!(exchange.model_id(), Some("copilot/gpt-4.1"));
        assert_eq!(exchange.timestamp_ms(), Some(1_700_000_000_000));

        let result = exchange.result();
        assert_eq!(result.details.as_deref(), Some("GPT-4.1 • 1x"));
        assert_eq!(result.total_elapsed_ms, Some(2500.0));
        assert_eq!(result.prompt_tokens, Some(12345));
        assert_eq!(result.tool_call_rounds, Some(3));
        assert_eq!(
            result.error.and_then(|error| error.summary()).as_deref(),
            Some("canceled (incomplete)")
        );
        assert_eq!(exchange.content_references(), vec!["copilot-instructions.md"]);
        assert_eq!(exchange.edited_files(), vec!["lib.rs"]);
        assert_eq!(exchange.followup_count(), 2);
    }

    #[test]
    fn base_name_handles_both_separators() {
        assert_eq!(base_name("/a/b/c.rs"), "c.rs");
        assert_eq!(base_name(r"C:\work\main.py"), "main.py");
        assert_eq!(base_name("plain"), "plain");
    }
}
