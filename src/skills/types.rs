//! Skill Type Definitions
//!
//! Manifest shapes as they appear in `skill.yaml` (or `.toml` / `.json`) and the
//! validated descriptors the registry hands out.

use super::error::{SkillError, SkillLoadResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default priority for skills that do not declare one (lower runs first)
pub const DEFAULT_PRIORITY: i32 = 100;

/// Business domain a skill belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    VehicleControl,
    Music,
    Navigation,
    Chat,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::VehicleControl,
        Domain::Music,
        Domain::Navigation,
        Domain::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VehicleControl => "vehicle_control",
            Self::Music => "music",
            Self::Navigation => "navigation",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s.trim())
            .ok_or_else(|| SkillError::UnknownDomain(s.to_string()))
    }
}

/// Slot value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    String,
    Number,
    Boolean,
    Enum,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
        }
    }
}

/// Typed parameter of a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SlotDescriptor {
    fn with_type(name: &str, slot_type: SlotType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            slot_type,
            required,
            enum_values: None,
            min: None,
            max: None,
            max_length: None,
            pattern: None,
            description: None,
        }
    }

    pub fn string(name: &str, required: bool) -> Self {
        Self::with_type(name, SlotType::String, required)
    }

    pub fn number(name: &str, required: bool) -> Self {
        Self::with_type(name, SlotType::Number, required)
    }

    pub fn boolean(name: &str, required: bool) -> Self {
        Self::with_type(name, SlotType::Boolean, required)
    }

    pub fn enumeration(name: &str, values: &[&str], required: bool) -> Self {
        let mut slot = Self::with_type(name, SlotType::Enum, required);
        slot.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        slot
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Binds a capability to an external script instead of a native handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCapabilityExtension {
    pub script_id: String,
    /// slot name -> argument name (defaults to `--<slot>`)
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,
    /// Output template with `{field}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_template: Option<String>,
    /// Hint for the orchestrator, not acted on here
    #[serde(default)]
    pub summarize_with_llm: bool,
}

impl ScriptCapabilityExtension {
    pub fn new(script_id: &str) -> Self {
        Self {
            script_id: script_id.to_string(),
            input_mapping: BTreeMap::new(),
            output_template: None,
            summarize_with_llm: false,
        }
    }

    pub fn map_input(mut self, slot: &str, arg: &str) -> Self {
        self.input_mapping.insert(slot.to_string(), arg.to_string());
        self
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.output_template = Some(template.to_string());
        self
    }
}

/// A named capability of a skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub slots: Vec<SlotDescriptor>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, rename = "script", skip_serializing_if = "Option::is_none")]
    pub script_extension: Option<ScriptCapabilityExtension>,
}

impl CapabilityDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            examples: Vec::new(),
            slots: Vec::new(),
            keywords: Vec::new(),
            script_extension: None,
        }
    }

    pub fn with_slot(mut self, slot: SlotDescriptor) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn with_example(mut self, example: &str) -> Self {
        self.examples.push(example.to_string());
        self
    }

    pub fn with_script(mut self, extension: ScriptCapabilityExtension) -> Self {
        self.script_extension = Some(extension);
        self
    }
}

/// Raw skill manifest as written on disk.
///
/// Required fields are optional here so a malformed manifest can be reported by
/// name instead of failing deserialization wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillManifest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub scripts_dir: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDescriptor>,
}

impl SkillManifest {
    /// Check required fields and convert into a descriptor
    pub fn into_descriptor(self) -> SkillLoadResult<SkillDescriptor> {
        let id = required(self.id, "id")?;
        let name = required(self.name, "name")?;
        let description = required(self.description, "description")?;
        let domain: Domain = required(self.domain, "domain")?.parse()?;

        for cap in &self.capabilities {
            if cap.name.trim().is_empty() {
                return Err(SkillError::MissingField("capabilities[].name".to_string()));
            }
        }

        Ok(SkillDescriptor {
            id,
            name,
            description,
            domain,
            version: self.version,
            author: self.author,
            tags: self.tags,
            dependencies: self.dependencies,
            capabilities: self.capabilities,
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
            enabled: self.enabled.unwrap_or(true),
            scripts_dir: self.scripts_dir.filter(|d| !d.trim().is_empty()),
        })
    }
}

fn required(value: Option<String>, field: &str) -> SkillLoadResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(SkillError::MissingField(field.to_string())),
    }
}

/// Validated skill metadata (first disclosure layer)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub domain: Domain,
    pub version: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub capabilities: Vec<CapabilityDescriptor>,
    pub priority: i32,
    pub enabled: bool,
    pub scripts_dir: Option<String>,
}

impl SkillDescriptor {
    pub fn capability(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.iter().find(|c| c.name == name)
    }
}

/// Skill instructions (second disclosure layer, `SKILL.md`)
#[derive(Debug, Clone, PartialEq)]
pub struct SkillInstructions {
    pub content: String,
    /// SHA-256 of the file contents, hex encoded
    pub digest: String,
    pub path: PathBuf,
}
