//! Script Output Formatting
//!
//! Turns raw script stdout into structured data, display text and a short
//! spoken (TTS) sentence.

use super::sandbox::ScriptResult;
use serde_json::{Map, Value};

/// Default cap on formatted text
pub const DEFAULT_MAX_LENGTH: usize = 2000;

/// Spoken fallback for raw output is cut to this many characters
const TTS_RAW_LIMIT: usize = 100;

/// Fields shown first, in this order
const PRIORITY_FIELDS: &[&str] = &[
    "city",
    "temperature",
    "condition",
    "humidity",
    "wind",
    "expression",
    "result",
    "cpu",
    "memory",
    "disk",
    "hostname",
    "system",
];

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    Text,
    Structured,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    pub format: OutputFormat,
    /// `{field}` placeholders are replaced with parsed output fields
    pub template: Option<String>,
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResult {
    pub text: String,
    pub tts_text: String,
    pub truncated: bool,
    pub data: Map<String, Value>,
}

/// Formats [`ScriptResult`]s for display and speech
#[derive(Debug, Clone)]
pub struct ResultFormatter {
    max_length: usize,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH)
    }
}

impl ResultFormatter {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn format(&self, result: &ScriptResult, options: &FormatOptions) -> FormattedResult {
        let max_length = options.max_length.unwrap_or(self.max_length);
        let data = parse_output(&result.stdout);

        let text = match &options.template {
            Some(template) => apply_template(template, &data),
            None => format_by_type(result, &data, options.format),
        };
        let tts_text = tts_text(result, &data);

        let truncated = text.chars().count() > max_length;
        let (text, tts_text) = if truncated {
            (
                format!("{}...", take_chars(&text, max_length)),
                take_chars(&tts_text, max_length),
            )
        } else {
            (text, tts_text)
        };

        FormattedResult {
            text,
            tts_text,
            truncated,
            data,
        }
    }
}

/// Parse stdout as a JSON object, JSON array, `key: value` lines, or raw text
pub fn parse_output(stdout: &str) -> Map<String, Value> {
    let trimmed = stdout.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => return map,
            Ok(Value::Array(items)) => {
                let mut map = Map::new();
                map.insert("items".to_string(), Value::Array(items));
                return map;
            }
            _ => {}
        }
    }

    if trimmed.contains(':') && trimmed.contains('\n') {
        let mut map = Map::new();
        for line in trimmed.lines() {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if !key.is_empty() {
                    map.insert(key.to_string(), Value::String(value.trim().to_string()));
                }
            }
        }
        if !map.is_empty() {
            return map;
        }
    }

    let mut map = Map::new();
    map.insert("rawOutput".to_string(), Value::String(trimmed.to_string()));
    map
}

/// Replace every `{key}` with the matching field
pub fn apply_template(template: &str, data: &Map<String, Value>) -> String {
    data.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), &value_text(value))
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn format_by_type(result: &ScriptResult, data: &Map<String, Value>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(data).unwrap_or_default(),
        OutputFormat::Text => result.stdout.clone(),
        OutputFormat::Structured => format_structured(data),
        OutputFormat::Auto => {
            if !result.success {
                let reason = result.error.clone().unwrap_or_else(|| result.stderr.clone());
                format!("Execution failed: {}", reason)
            } else if !data.contains_key("rawOutput") || data.len() > 1 {
                format_structured(data)
            } else {
                result.stdout.clone()
            }
        }
    }
}

fn field_label(field: &str) -> &str {
    match field {
        "city" => "City",
        "temperature" => "Temperature",
        "condition" => "Condition",
        "humidity" => "Humidity",
        "wind" => "Wind",
        "expression" => "Expression",
        "result" => "Result",
        "cpu" => "CPU",
        "memory" => "Memory",
        "disk" => "Disk",
        "hostname" => "Host",
        "system" => "System",
        "timestamp" => "Time",
        "error" => "Error",
        other => other,
    }
}

fn format_structured(data: &Map<String, Value>) -> String {
    let mut parts = Vec::new();

    for field in PRIORITY_FIELDS {
        if let Some(value) = data.get(*field) {
            parts.push(format!("{}: {}", field_label(field), value_text(value)));
        }
    }
    for (key, value) in data {
        if !PRIORITY_FIELDS.contains(&key.as_str()) && key != "rawOutput" {
            parts.push(format!("{}: {}", field_label(key), value_text(value)));
        }
    }

    if parts.is_empty() {
        if let Some(raw) = data.get("rawOutput") {
            return value_text(raw);
        }
    }
    parts.join(", ")
}

fn present(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(value_text(v)),
    }
}

fn tts_text(result: &ScriptResult, data: &Map<String, Value>) -> String {
    if !result.success {
        return format!(
            "Sorry, the script failed. {}",
            result.error.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string();
    }

    if let (Some(city), Some(temperature)) = (present(data, "city"), present(data, "temperature")) {
        let mut parts = vec![format!("Current weather in {}", city)];
        if let Some(condition) = present(data, "condition") {
            parts.push(condition);
        }
        parts.push(format!("{} degrees", temperature));
        if let Some(humidity) = present(data, "humidity") {
            parts.push(format!("humidity {}%", humidity));
        }
        return parts.join(", ");
    }

    if let (Some(expression), Some(value)) = (present(data, "expression"), present(data, "result")) {
        return format!("{} equals {}", expression, value);
    }

    let host = present(data, "hostname");
    let system = present(data, "system");
    if host.is_some() || system.is_some() {
        let mut parts = Vec::new();
        if let Some(h) = host {
            parts.push(format!("host {}", h));
        }
        if let Some(s) = system {
            parts.push(format!("system {}", s));
        }
        return parts.join(", ");
    }

    if let Some(raw) = present(data, "rawOutput") {
        if raw.chars().count() > TTS_RAW_LIMIT {
            return format!("{}...", take_chars(&raw, TTS_RAW_LIMIT));
        }
        return raw;
    }

    "Script finished".to_string()
}
