//! Execution requests, results and context

use super::types::{Domain, ScriptCapabilityExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Slot values of one capability call
pub type Slots = Map<String, Value>;

/// Failure category of a capability call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownCapability,
    ValidationError,
    ExecutionError,
    ScriptError,
    ScriptTimeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownCapability => "UNKNOWN_CAPABILITY",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::ScriptError => "SCRIPT_ERROR",
            Self::ScriptTimeout => "SCRIPT_TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device-level command produced by a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl Command {
    pub fn new(command_type: &str, domain: Domain) -> Self {
        Self {
            command_type: command_type.to_string(),
            params: Map::new(),
            domain,
            priority: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome of one capability call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillResult {
    pub success: bool,
    /// Capability name
    pub intent: String,
    pub slots: Slots,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub confidence: f64,
    /// Parsed script output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SkillResult {
    pub fn success(capability: &str, slots: Slots) -> Self {
        Self {
            success: true,
            intent: capability.to_string(),
            slots,
            commands: Vec::new(),
            tts_text: None,
            error: None,
            error_code: None,
            confidence: 1.0,
            data: None,
        }
    }

    pub fn error(capability: &str, slots: Slots, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            intent: capability.to_string(),
            slots,
            commands: Vec::new(),
            tts_text: None,
            error: Some(message.into()),
            error_code: Some(code),
            confidence: 0.0,
            data: None,
        }
    }

    pub fn with_tts(mut self, text: impl Into<String>) -> Self {
        self.tts_text = Some(text.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// What a native handler returns
#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    pub success: bool,
    pub commands: Vec<Command>,
    pub tts_text: Option<String>,
    pub error: Option<String>,
}

impl HandlerOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_tts(mut self, text: impl Into<String>) -> Self {
        self.tts_text = Some(text.into());
        self
    }
}

/// Intent recognized by the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedIntent {
    pub skill_id: String,
    pub capability: String,
    #[serde(default)]
    pub slots: Slots,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// One entry of a batch execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub skill_id: String,
    pub capability: String,
    pub slots: Slots,
    /// Per-request override of the registered script binding
    pub script_extension: Option<ScriptCapabilityExtension>,
}

impl ExecutionRequest {
    pub fn new(skill_id: &str, capability: &str, slots: Slots) -> Self {
        Self {
            skill_id: skill_id.to_string(),
            capability: capability.to_string(),
            slots,
            script_extension: None,
        }
    }

    pub fn with_script(mut self, extension: ScriptCapabilityExtension) -> Self {
        self.script_extension = Some(extension);
        self
    }
}

impl From<RecognizedIntent> for ExecutionRequest {
    fn from(intent: RecognizedIntent) -> Self {
        Self {
            skill_id: intent.skill_id,
            capability: intent.capability,
            slots: intent.slots,
            script_extension: None,
        }
    }
}

/// One turn of the dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogMessage {
    pub role: String,
    pub content: String,
}

/// Read-only context shared by every call of a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillContext {
    /// Snapshot of the vehicle state
    #[serde(default)]
    pub vehicle_state: Value,
    #[serde(default)]
    pub dialog_history: Vec<DialogMessage>,
    #[serde(default)]
    pub previous_domain: Option<Domain>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_value(ErrorCode::UnknownCapability).unwrap(),
            json!("UNKNOWN_CAPABILITY")
        );
        assert_eq!(ErrorCode::ScriptTimeout.to_string(), "SCRIPT_TIMEOUT");
    }

    #[test]
    fn test_error_result_has_zero_confidence() {
        let result = SkillResult::error("x", Slots::new(), ErrorCode::ScriptError, "boom");
        assert!(!result.success);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_intent_defaults() {
        let intent: RecognizedIntent =
            serde_json::from_value(json!({"skillId": "music", "capability": "play_music"})).unwrap();
        assert_eq!(intent.confidence, 0.5);
        let request = ExecutionRequest::from(intent);
        assert!(request.slots.is_empty());
        assert!(request.script_extension.is_none());
    }

    #[test]
    fn test_command_shape() {
        let cmd = Command::new("set_temperature", Domain::VehicleControl).with_param("value", 22);
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["type"], "set_temperature");
        assert_eq!(value["domain"], "vehicle_control");
        assert_eq!(value["params"]["value"], 22);
    }
}
