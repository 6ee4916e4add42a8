//! Input Validator
//!
//! Rule-based validation and sanitization of untyped parameter maps before they
//! reach a script's argv. Dangerous shell and path characters are errors;
//! strings that look like credentials only produce warnings.

use super::types::{SlotDescriptor, SlotType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Upper bound applied to every string rule
pub const DEFAULT_MAX_STRING_LENGTH: usize = 1000;

struct PatternCheck {
    pattern: Regex,
    message: &'static str,
}

fn check(pattern: &str, message: &'static str) -> PatternCheck {
    PatternCheck {
        pattern: Regex::new(pattern).expect("static pattern compiles"),
        message,
    }
}

static DANGEROUS_PATTERNS: Lazy<Vec<PatternCheck>> = Lazy::new(|| {
    vec![
        // Shell injection
        check(r"[;&|`$]", "contains shell metacharacters"),
        check(r"\$\(", "contains command substitution"),
        check(r"\$\{", "contains variable expansion"),
        check(r"`", "contains backtick substitution"),
        // Path traversal
        check(r"\.\.", "contains path traversal"),
        check(r"~", "references a home directory"),
        // Control characters (tab is tolerated)
        check(r"\x00", "contains a NUL byte"),
        check(r"[\n\r]", "contains a line break"),
        check(r"[\x01-\x08\x0B\x0C\x0E-\x1F\x7F]", "contains control characters"),
    ]
});

static SENSITIVE_PATTERNS: Lazy<Vec<PatternCheck>> = Lazy::new(|| {
    vec![
        check(r"(?i)password", "may contain a password"),
        check(r"(?i)secret", "may contain a secret"),
        check(r"(?i)api[_-]?key", "may contain an API key"),
        check(r"(?i)token", "may contain a token"),
        check(r"(?i)private[_-]?key", "may contain a private key"),
        check(r"[a-zA-Z0-9]{32,}", "may contain a long key string"),
    ]
});

/// Rule value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    String,
    Number,
    Boolean,
    Enum,
}

impl From<SlotType> for RuleType {
    fn from(value: SlotType) -> Self {
        match value {
            SlotType::String => Self::String,
            SlotType::Number => Self::Number,
            SlotType::Boolean => Self::Boolean,
            SlotType::Enum => Self::Enum,
        }
    }
}

/// Extra check run after the type checks; `Err` carries the message
pub type CustomCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Validation rule for one parameter
#[derive(Clone)]
pub struct ValidationRule {
    pub name: String,
    pub rule_type: RuleType,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enum_values: Option<Vec<String>>,
    pub pattern: Option<String>,
    pub custom: Option<CustomCheck>,
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name)
            .field("rule_type", &self.rule_type)
            .field("required", &self.required)
            .field("custom", &self.custom.is_some())
            .finish_non_exhaustive()
    }
}

impl ValidationRule {
    pub fn new(name: &str, rule_type: RuleType) -> Self {
        Self {
            name: name.to_string(),
            rule_type,
            required: false,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            enum_values: None,
            pattern: None,
            custom: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn matching(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(f));
        self
    }
}

impl From<&SlotDescriptor> for ValidationRule {
    fn from(slot: &SlotDescriptor) -> Self {
        Self {
            name: slot.name.clone(),
            rule_type: slot.slot_type.into(),
            required: slot.required,
            min_length: None,
            max_length: slot.max_length,
            min: slot.min,
            max: slot.max,
            enum_values: slot.enum_values.clone(),
            pattern: slot.pattern.clone(),
            custom: None,
        }
    }
}

/// Validator options
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    pub max_string_length: usize,
    /// Skip the credential heuristics
    pub allow_sensitive_patterns: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            allow_sensitive_patterns: false,
        }
    }
}

/// Result of validating a parameter map
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Known, valid parameters with canonical types
    pub sanitized_value: Map<String, Value>,
}

struct FieldOutcome {
    errors: Vec<String>,
    warnings: Vec<String>,
    value: Option<Value>,
}

impl FieldOutcome {
    fn rejected(error: String) -> Self {
        Self {
            errors: vec![error],
            warnings: Vec::new(),
            value: None,
        }
    }
}

/// Rule-based input validator
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    rules: BTreeMap<String, ValidationRule>,
    options: ValidatorOptions,
}

impl InputValidator {
    pub fn new(options: ValidatorOptions) -> Self {
        Self {
            rules: BTreeMap::new(),
            options,
        }
    }

    /// Build rules from a capability's slot schema
    pub fn from_slots(slots: &[SlotDescriptor], options: ValidatorOptions) -> Self {
        let mut validator = Self::new(options);
        for slot in slots {
            validator.add_rule(slot.into());
        }
        validator
    }

    pub fn add_rule(&mut self, rule: ValidationRule) {
        self.rules.insert(rule.name.clone(), rule);
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = ValidationRule>) {
        for rule in rules {
            self.add_rule(rule);
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Validate an input map against the registered rules
    pub fn validate(&self, input: &Map<String, Value>) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut sanitized = Map::new();

        for (name, rule) in &self.rules {
            let value = match input.get(name) {
                None | Some(Value::Null) => {
                    if rule.required {
                        errors.push(format!("Missing required parameter: {}", name));
                    }
                    continue;
                }
                Some(v) => v,
            };

            let outcome = self.validate_value(name, value, rule);
            let field_ok = outcome.errors.is_empty();
            errors.extend(outcome.errors);
            warnings.extend(outcome.warnings);
            if field_ok {
                if let Some(v) = outcome.value {
                    sanitized.insert(name.clone(), v);
                }
            }
        }

        for key in input.keys() {
            if !self.rules.contains_key(key) {
                warnings.push(format!("Unknown parameter ignored: {}", key));
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            sanitized_value: sanitized,
        }
    }

    fn validate_value(&self, name: &str, value: &Value, rule: &ValidationRule) -> FieldOutcome {
        let mut outcome = match rule.rule_type {
            RuleType::String => self.validate_string(name, value, rule),
            RuleType::Number => validate_number(name, value, rule),
            RuleType::Boolean => validate_boolean(name, value),
            RuleType::Enum => match &rule.enum_values {
                Some(values) if !values.is_empty() => validate_enum(name, value, values),
                // an open enum is screened like any free-form string
                _ => self.validate_string(name, value, rule),
            },
        };

        if outcome.errors.is_empty() {
            if let (Some(custom), Some(v)) = (&rule.custom, &outcome.value) {
                if let Err(message) = custom(v) {
                    outcome.errors.push(message);
                }
            }
        }
        outcome
    }

    fn validate_string(&self, name: &str, value: &Value, rule: &ValidationRule) -> FieldOutcome {
        let Some(s) = value.as_str() else {
            return FieldOutcome::rejected(format!("Parameter {} must be a string", name));
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let len = s.chars().count();
        let min_len = rule.min_length.unwrap_or(0);
        let max_len = rule
            .max_length
            .unwrap_or(self.options.max_string_length)
            .min(self.options.max_string_length);
        if len < min_len {
            errors.push(format!("Parameter {} must be at least {} characters", name, min_len));
        }
        if len > max_len {
            errors.push(format!("Parameter {} must be at most {} characters", name, max_len));
        }

        for check in DANGEROUS_PATTERNS.iter() {
            if check.pattern.is_match(s) {
                errors.push(format!("Parameter {}: {}", name, check.message));
            }
        }

        if !self.options.allow_sensitive_patterns {
            for check in SENSITIVE_PATTERNS.iter() {
                if check.pattern.is_match(s) {
                    warnings.push(format!("Parameter {}: {}", name, check.message));
                }
            }
        }

        if let Some(pattern) = &rule.pattern {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => errors.push(format!("Parameter {} has an invalid format", name)),
                Err(_) => errors.push(format!("Parameter {} has an unusable pattern", name)),
            }
        }

        FieldOutcome {
            errors,
            warnings,
            value: Some(Value::String(s.trim().to_string())),
        }
    }

    /// True if the string contains none of the dangerous patterns
    pub fn is_safe_string(value: &str) -> bool {
        !DANGEROUS_PATTERNS.iter().any(|c| c.pattern.is_match(value))
    }

    /// Remove every dangerous sequence and trim
    pub fn sanitize_string(value: &str) -> String {
        let mut result = value.to_string();
        for check in DANGEROUS_PATTERNS.iter() {
            result = check.pattern.replace_all(&result, "").into_owned();
        }
        result.trim().to_string()
    }
}

fn validate_number(name: &str, value: &Value, rule: &ValidationRule) -> FieldOutcome {
    let num = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => return FieldOutcome::rejected(format!("Parameter {} is not a valid number", name)),
        },
        _ => None,
    };
    let Some(num) = num else {
        return FieldOutcome::rejected(format!("Parameter {} must be a number", name));
    };

    let mut errors = Vec::new();
    if let Some(min) = rule.min {
        if num < min {
            errors.push(format!("Parameter {} must not be less than {}", name, min));
        }
    }
    if let Some(max) = rule.max {
        if num > max {
            errors.push(format!("Parameter {} must not be greater than {}", name, max));
        }
    }

    FieldOutcome {
        errors,
        warnings: Vec::new(),
        value: Some(canonical_number(num)),
    }
}

/// Integral values become JSON integers, the rest stay floats
pub(crate) fn canonical_number(num: f64) -> Value {
    if num.fract() == 0.0 && num.abs() < i64::MAX as f64 {
        Value::Number(Number::from(num as i64))
    } else {
        Number::from_f64(num).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn validate_boolean(name: &str, value: &Value) -> FieldOutcome {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => {
                return FieldOutcome::rejected(format!("Parameter {} is not a valid boolean", name))
            }
        },
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    };

    match parsed {
        Some(b) => FieldOutcome {
            errors: Vec::new(),
            warnings: Vec::new(),
            value: Some(Value::Bool(b)),
        },
        None => FieldOutcome::rejected(format!("Parameter {} must be a boolean", name)),
    }
}

fn validate_enum(name: &str, value: &Value, allowed: &[String]) -> FieldOutcome {
    let Some(s) = value.as_str() else {
        return FieldOutcome::rejected(format!("Parameter {} must be a string", name));
    };

    if !allowed.iter().any(|v| v == s) {
        return FieldOutcome::rejected(format!(
            "Parameter {} must be one of: {}",
            name,
            allowed.join(", ")
        ));
    }

    FieldOutcome {
        errors: Vec::new(),
        warnings: Vec::new(),
        value: Some(Value::String(s.to_string())),
    }
}
