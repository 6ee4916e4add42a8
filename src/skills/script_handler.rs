//! Script-backed capabilities
//!
//! Resolves a [`ScriptCapabilityExtension`] to a [`ScriptConfig`], screens the
//! slot values, turns them into argv and maps the sandbox outcome onto a
//! [`SkillResult`].

use super::formatter::{apply_template, parse_output, FormatOptions, ResultFormatter};
use super::registry::SkillRegistry;
use super::result::{ErrorCode, SkillResult, Slots};
use super::sandbox::{ExecuteOptions, ScriptResult, ScriptRunner};
use super::script_config::{ScriptCatalog, ScriptConfig, ScriptConfigLoader};
use super::types::ScriptCapabilityExtension;
use super::validator::InputValidator;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Runs capabilities bound to external scripts
pub struct ScriptCapabilityHandler {
    runner: Arc<dyn ScriptRunner>,
    registry: Option<Arc<SkillRegistry>>,
    global_loader: Option<ScriptConfigLoader>,
    global_catalog: OnceCell<Arc<ScriptCatalog>>,
    formatter: ResultFormatter,
}

impl ScriptCapabilityHandler {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            runner,
            registry: None,
            global_loader: None,
            global_catalog: OnceCell::new(),
            formatter: ResultFormatter::default(),
        }
    }

    /// Look up skill-scoped catalogs through the registry
    pub fn with_registry(mut self, registry: Arc<SkillRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Fallback catalog at `<root>/scripts.yaml`
    pub fn with_global_catalog(mut self, root: impl Into<PathBuf>) -> Self {
        self.global_loader = Some(ScriptConfigLoader::new(root));
        self
    }

    pub fn with_formatter(mut self, formatter: ResultFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// The global catalog, loaded on first use
    pub async fn global_catalog(&self) -> Option<Arc<ScriptCatalog>> {
        let loader = self.global_loader.as_ref()?;
        let catalog = self
            .global_catalog
            .get_or_init(|| async {
                let catalog = loader.load().await;
                if !catalog.success() {
                    warn!("Global script catalog has errors: {:?}", catalog.errors);
                }
                for warning in &catalog.warnings {
                    debug!("Global script catalog: {}", warning);
                }
                Arc::new(catalog)
            })
            .await;
        Some(catalog.clone())
    }

    /// Skill catalog first, then the global catalog
    pub async fn resolve_config(&self, skill_id: &str, script_id: &str) -> Option<ScriptConfig> {
        if let Some(registry) = &self.registry {
            if let Some(catalog) = registry.script_catalog(skill_id).await {
                if let Some(config) = catalog.get(script_id) {
                    return Some(config.clone());
                }
            }
        }
        self.global_catalog()
            .await
            .and_then(|catalog| catalog.get(script_id).cloned())
    }

    /// Whether any known script lists `capability`
    pub async fn has_script(&self, skill_id: &str, capability: &str) -> bool {
        if let Some(registry) = &self.registry {
            if let Some(catalog) = registry.script_catalog(skill_id).await {
                if !catalog.find_by_capability(capability).is_empty() {
                    return true;
                }
            }
        }
        match self.global_catalog().await {
            Some(catalog) => !catalog.find_by_capability(capability).is_empty(),
            None => false,
        }
    }

    pub async fn handle(
        &self,
        skill_id: &str,
        capability: &str,
        slots: &Slots,
        extension: &ScriptCapabilityExtension,
    ) -> SkillResult {
        let Some(config) = self.resolve_config(skill_id, &extension.script_id).await else {
            return SkillResult::error(
                capability,
                slots.clone(),
                ErrorCode::ScriptError,
                format!("Script config not found: {}", extension.script_id),
            );
        };

        if !config.serves(capability) {
            return SkillResult::error(
                capability,
                slots.clone(),
                ErrorCode::ScriptError,
                format!("Script {} is not bound to capability {}", config.id, capability),
            );
        }

        let sanitized = match screen_slots(slots) {
            Ok(s) => s,
            Err(errors) => {
                return SkillResult::error(
                    capability,
                    slots.clone(),
                    ErrorCode::ValidationError,
                    format!("Input validation failed: {}", errors.join(", ")),
                )
            }
        };

        let args = build_args(&sanitized, extension);
        debug!("Running script {} for {}.{}", config.id, skill_id, capability);
        let result = self.runner.run(&config, ExecuteOptions::with_args(args)).await;

        self.process_result(result, capability, slots, extension)
    }

    fn process_result(
        &self,
        result: ScriptResult,
        capability: &str,
        slots: &Slots,
        extension: &ScriptCapabilityExtension,
    ) -> SkillResult {
        if result.timed_out {
            return SkillResult::error(
                capability,
                slots.clone(),
                ErrorCode::ScriptTimeout,
                result
                    .error
                    .unwrap_or_else(|| "Script timed out".to_string()),
            );
        }

        if !result.success {
            let message = result
                .error
                .clone()
                .or_else(|| Some(result.stderr.clone()).filter(|s| !s.is_empty()))
                .unwrap_or_else(|| match result.exit_code {
                    Some(code) => format!("Script exited with code {}", code),
                    None => "Script failed".to_string(),
                });
            return SkillResult::error(capability, slots.clone(), ErrorCode::ScriptError, message);
        }

        let data = parse_output(&result.stdout);
        let tts_text = match &extension.output_template {
            Some(template) => apply_template(template, &data),
            None => self.formatter.format(&result, &FormatOptions::default()).tts_text,
        };

        SkillResult::success(capability, slots.clone())
            .with_tts(tts_text)
            .with_data(Value::Object(data))
    }
}

/// Reject unsafe string slots, sanitize the rest
fn screen_slots(slots: &Slots) -> Result<Slots, Vec<String>> {
    let mut errors = Vec::new();
    let mut sanitized = Slots::new();

    for (key, value) in slots {
        match value {
            Value::String(s) if !InputValidator::is_safe_string(s) => {
                errors.push(format!("slot {} contains unsafe characters", key));
            }
            Value::String(s) => {
                sanitized.insert(key.clone(), Value::String(InputValidator::sanitize_string(s)));
            }
            other => {
                sanitized.insert(key.clone(), other.clone());
            }
        }
    }

    if errors.is_empty() {
        Ok(sanitized)
    } else {
        Err(errors)
    }
}

/// Slots to argv: mapped name (or `--slot`), then the value.
/// `true` becomes a bare flag; `false` and null are left out.
pub fn build_args(slots: &Slots, extension: &ScriptCapabilityExtension) -> Vec<String> {
    let mut args = Vec::new();

    for (name, value) in slots {
        let arg_name = extension
            .input_mapping
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("--{}", name));

        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => args.push(arg_name),
            Value::String(s) => {
                args.push(arg_name);
                args.push(s.clone());
            }
            other => {
                args.push(arg_name);
                args.push(other.to_string());
            }
        }
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slots(value: Value) -> Slots {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_build_args() {
        let ext = ScriptCapabilityExtension::new("weather").map_input("city", "-c");
        let args = build_args(
            &slots(json!({"city": "Paris", "days": 3, "verbose": true, "quiet": false, "x": null})),
            &ext,
        );
        assert_eq!(args, vec!["-c", "Paris", "--days", "3", "--verbose"]);
    }

    #[test]
    fn test_screen_slots() {
        let ok = screen_slots(&slots(json!({"city": "  Paris ", "n": 1}))).unwrap();
        assert_eq!(ok["city"], json!("Paris"));
        assert_eq!(ok["n"], json!(1));

        let err = screen_slots(&slots(json!({"city": "Paris; rm -rf /"}))).unwrap_err();
        assert_eq!(err.len(), 1);
    }
}
