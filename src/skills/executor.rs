//! Capability Executor
//!
//! Dispatches capability calls to native handlers or to the script handler:
//! - Handler registration per (skill, capability)
//! - Slot validation against declared slot definitions
//! - Bounded concurrent batch execution, results in input order
//!
//! Nothing crosses the boundary as an error or a panic; every call ends in a
//! [`SkillResult`].

use super::registry::SkillRegistry;
use super::result::{ErrorCode, ExecutionRequest, HandlerOutput, SkillContext, SkillResult, Slots};
use super::script_handler::ScriptCapabilityHandler;
use super::types::{CapabilityDescriptor, ScriptCapabilityExtension, SlotDescriptor, SlotType};
use futures_util::{stream, FutureExt, StreamExt};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Native capability handler
pub type CapabilityHandler = Arc<
    dyn Fn(Slots, Arc<SkillContext>) -> Pin<Box<dyn Future<Output = anyhow::Result<HandlerOutput>> + Send>>
        + Send
        + Sync,
>;

/// skill id -> capability -> value
type SkillMap<T> = HashMap<String, HashMap<String, T>>;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Validate slots in batch execution
    pub validate_slots: bool,
    /// Batch calls in flight at once
    pub max_concurrency: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            validate_slots: true,
            max_concurrency: 4,
        }
    }
}

/// Executes capability calls
pub struct CapabilityExecutor {
    handlers: RwLock<SkillMap<CapabilityHandler>>,
    definitions: RwLock<SkillMap<CapabilityDescriptor>>,
    script_extensions: RwLock<SkillMap<ScriptCapabilityExtension>>,
    script_handler: Option<Arc<ScriptCapabilityHandler>>,
    options: ExecutorOptions,
}

impl Default for CapabilityExecutor {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

impl CapabilityExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            definitions: RwLock::new(HashMap::new()),
            script_extensions: RwLock::new(HashMap::new()),
            script_handler: None,
            options,
        }
    }

    pub fn with_script_handler(mut self, handler: Arc<ScriptCapabilityHandler>) -> Self {
        self.script_handler = Some(handler);
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Register a native handler; replaces any earlier one
    pub fn register_capability_handler<F, Fut>(&self, skill_id: &str, capability: &str, handler: F)
    where
        F: Fn(Slots, Arc<SkillContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send + 'static,
    {
        let handler: CapabilityHandler = Arc::new(move |slots, ctx| Box::pin(handler(slots, ctx)));
        self.handlers
            .write()
            .entry(skill_id.to_string())
            .or_default()
            .insert(capability.to_string(), handler);
        debug!("Registered handler {}.{}", skill_id, capability);
    }

    pub fn register_capability_definition(&self, skill_id: &str, definition: CapabilityDescriptor) {
        self.definitions
            .write()
            .entry(skill_id.to_string())
            .or_default()
            .insert(definition.name.clone(), definition);
    }

    pub fn register_script_extension(
        &self,
        skill_id: &str,
        capability: &str,
        extension: ScriptCapabilityExtension,
    ) {
        self.script_extensions
            .write()
            .entry(skill_id.to_string())
            .or_default()
            .insert(capability.to_string(), extension);
    }

    /// Pull slot definitions and script bindings from every registered skill.
    /// Returns the number of capabilities registered.
    pub fn register_skill_capabilities(&self, registry: &SkillRegistry) -> usize {
        let mut count = 0;
        for skill in registry.get_all_metadata() {
            for capability in &skill.capabilities {
                if let Some(extension) = &capability.script_extension {
                    self.register_script_extension(&skill.id, &capability.name, extension.clone());
                }
                self.register_capability_definition(&skill.id, capability.clone());
                count += 1;
            }
        }
        info!("Registered {} capabilities from skill metadata", count);
        count
    }

    pub fn remove_capability_handler(&self, skill_id: &str, capability: &str) -> bool {
        let mut handlers = self.handlers.write();
        let Some(caps) = handlers.get_mut(skill_id) else {
            return false;
        };
        let removed = caps.remove(capability).is_some();
        if caps.is_empty() {
            handlers.remove(skill_id);
        }
        removed
    }

    pub fn has_handler(&self, skill_id: &str, capability: &str) -> bool {
        self.handlers
            .read()
            .get(skill_id)
            .is_some_and(|caps| caps.contains_key(capability))
    }

    pub fn has_script_extension(&self, skill_id: &str, capability: &str) -> bool {
        self.script_extension(skill_id, capability).is_some()
    }

    /// Whether a call to this capability would reach a handler or a script
    pub fn has_capability(&self, skill_id: &str, capability: &str) -> bool {
        self.has_handler(skill_id, capability) || self.has_script_extension(skill_id, capability)
    }

    pub fn definition(&self, skill_id: &str, capability: &str) -> Option<CapabilityDescriptor> {
        self.definitions
            .read()
            .get(skill_id)
            .and_then(|caps| caps.get(capability))
            .cloned()
    }

    fn script_extension(&self, skill_id: &str, capability: &str) -> Option<ScriptCapabilityExtension> {
        self.script_extensions
            .read()
            .get(skill_id)
            .and_then(|caps| caps.get(capability))
            .cloned()
    }

    fn handler(&self, skill_id: &str, capability: &str) -> Option<CapabilityHandler> {
        self.handlers
            .read()
            .get(skill_id)
            .and_then(|caps| caps.get(capability))
            .cloned()
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
        self.definitions.write().clear();
        self.script_extensions.write().clear();
    }

    /// Run one capability without slot validation
    pub async fn execute_capability(
        &self,
        skill_id: &str,
        capability: &str,
        slots: Slots,
        ctx: Arc<SkillContext>,
    ) -> SkillResult {
        self.execute(ExecutionRequest::new(skill_id, capability, slots), ctx)
            .await
    }

    /// Run one request without slot validation
    pub async fn execute(&self, request: ExecutionRequest, ctx: Arc<SkillContext>) -> SkillResult {
        let ExecutionRequest {
            skill_id,
            capability,
            slots,
            script_extension,
        } = request;

        let extension = script_extension.or_else(|| self.script_extension(&skill_id, &capability));
        if let Some(extension) = extension {
            return match &self.script_handler {
                Some(handler) => handler.handle(&skill_id, &capability, &slots, &extension).await,
                None => SkillResult::error(
                    &capability,
                    slots,
                    ErrorCode::ScriptError,
                    "Script handler not configured",
                ),
            };
        }

        let Some(handler) = self.handler(&skill_id, &capability) else {
            return SkillResult::error(
                &capability,
                slots,
                ErrorCode::UnknownCapability,
                format!("Unknown capability: {}.{}", skill_id, capability),
            );
        };

        run_handler(handler, &skill_id, &capability, slots, ctx).await
    }

    /// Validate slots against the registered definition, then run
    pub async fn execute_capability_with_validation(
        &self,
        skill_id: &str,
        capability: &str,
        slots: Slots,
        ctx: Arc<SkillContext>,
    ) -> SkillResult {
        self.execute_validated(ExecutionRequest::new(skill_id, capability, slots), ctx)
            .await
    }

    pub async fn execute_validated(&self, request: ExecutionRequest, ctx: Arc<SkillContext>) -> SkillResult {
        if let Some(definition) = self.definition(&request.skill_id, &request.capability) {
            if let Err(message) = validate_slots(&definition.slots, &request.slots) {
                debug!(
                    "Slot validation failed for {}.{}: {}",
                    request.skill_id, request.capability, message
                );
                return SkillResult::error(
                    &request.capability,
                    request.slots,
                    ErrorCode::ValidationError,
                    message,
                );
            }
        }
        self.execute(request, ctx).await
    }

    /// Run a batch; at most `max_concurrency` in flight, results in input order
    pub async fn execute_multiple_capabilities(
        &self,
        requests: Vec<ExecutionRequest>,
        ctx: Arc<SkillContext>,
    ) -> Vec<SkillResult> {
        let limit = self.options.max_concurrency.max(1);
        let validate = self.options.validate_slots;

        stream::iter(requests.into_iter().map(|request| {
            let ctx = ctx.clone();
            async move {
                if validate {
                    self.execute_validated(request, ctx).await
                } else {
                    self.execute(request, ctx).await
                }
            }
        }))
        .buffered(limit)
        .collect()
        .await
    }
}

async fn run_handler(
    handler: CapabilityHandler,
    skill_id: &str,
    capability: &str,
    slots: Slots,
    ctx: Arc<SkillContext>,
) -> SkillResult {
    let args = slots.clone();
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(args, ctx))) {
        Ok(f) => f,
        Err(_) => return handler_panicked(skill_id, capability, slots),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(output)) => from_output(capability, slots, output),
        Ok(Err(e)) => {
            warn!("Handler {}.{} failed: {:#}", skill_id, capability, e);
            SkillResult::error(capability, slots, ErrorCode::ExecutionError, e.to_string())
        }
        Err(_) => handler_panicked(skill_id, capability, slots),
    }
}

fn handler_panicked(skill_id: &str, capability: &str, slots: Slots) -> SkillResult {
    warn!("Handler {}.{} panicked", skill_id, capability);
    SkillResult::error(
        capability,
        slots,
        ErrorCode::ExecutionError,
        format!("Handler {}.{} panicked", skill_id, capability),
    )
}

fn from_output(capability: &str, slots: Slots, output: HandlerOutput) -> SkillResult {
    if !output.success {
        let message = output
            .error
            .unwrap_or_else(|| "Handler reported failure".to_string());
        let mut result = SkillResult::error(capability, slots, ErrorCode::ExecutionError, message);
        result.commands = output.commands;
        result.tts_text = output.tts_text;
        return result;
    }

    let mut result = SkillResult::success(capability, slots);
    result.commands = output.commands;
    result.tts_text = output.tts_text;
    result
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// First violation of the declared slots, if any
pub fn validate_slots(definitions: &[SlotDescriptor], slots: &Slots) -> Result<(), String> {
    for def in definitions {
        let value = slots.get(&def.name);

        if value.map(is_blank).unwrap_or(true) {
            if def.required {
                return Err(format!("Missing required slot: {}", def.name));
            }
            continue;
        }
        let Some(value) = value else { continue };

        match def.slot_type {
            SlotType::Number => {
                let Some(n) = value.as_f64() else {
                    return Err(format!("Slot {} must be a number", def.name));
                };
                if def.min.is_some_and(|min| n < min) || def.max.is_some_and(|max| n > max) {
                    return Err(format!(
                        "Slot {} must be between {} and {}",
                        def.name,
                        def.min.map(|m| m.to_string()).unwrap_or_else(|| "-inf".to_string()),
                        def.max.map(|m| m.to_string()).unwrap_or_else(|| "inf".to_string()),
                    ));
                }
            }
            SlotType::String => {
                let Some(s) = value.as_str() else {
                    return Err(format!("Slot {} must be a string", def.name));
                };
                if let Some(max_length) = def.max_length {
                    if s.chars().count() > max_length {
                        return Err(format!("Slot {} exceeds {} characters", def.name, max_length));
                    }
                }
                if let Some(pattern) = &def.pattern {
                    let re = Regex::new(pattern)
                        .map_err(|e| format!("Slot {} has an invalid pattern: {}", def.name, e))?;
                    if !re.is_match(s) {
                        return Err(format!("Slot {} does not match {}", def.name, pattern));
                    }
                }
            }
            SlotType::Boolean => {
                if !value.is_boolean() {
                    return Err(format!("Slot {} must be a boolean", def.name));
                }
            }
            SlotType::Enum => {
                let Some(s) = value.as_str() else {
                    return Err(format!("Slot {} must be a string", def.name));
                };
                // without enumValues any string is accepted
                let allowed = def.enum_values.as_deref().unwrap_or(&[]);
                if !allowed.is_empty() && !allowed.iter().any(|v| v == s) {
                    return Err(format!(
                        "Slot {} must be one of: {}",
                        def.name,
                        allowed.join(", ")
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::result::{Command, RecognizedIntent};
    use crate::skills::types::Domain;
    use serde_json::json;

    fn slots(value: Value) -> Slots {
        value.as_object().cloned().unwrap()
    }

    fn ac_definition() -> CapabilityDescriptor {
        CapabilityDescriptor::new("ac_control", "Climate control")
            .with_slot(SlotDescriptor::enumeration("action", &["on", "off"], true))
            .with_slot(SlotDescriptor::number("temperature", false).with_range(Some(16.0), Some(32.0)))
    }

    #[tokio::test]
    async fn test_native_handler() {
        let executor = CapabilityExecutor::default();
        executor.register_capability_handler("vehicle", "ac_control", |slots, _ctx| async move {
            let action = slots["action"].as_str().unwrap_or_default().to_string();
            Ok(HandlerOutput::ok()
                .with_command(Command::new("ac", Domain::VehicleControl).with_param("action", action))
                .with_tts("AC updated"))
        });

        let result = executor
            .execute_capability("vehicle", "ac_control", slots(json!({"action": "on"})), Arc::default())
            .await;
        assert!(result.success);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.commands.len(), 1);
        assert_eq!(result.tts_text.as_deref(), Some("AC updated"));
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let executor = CapabilityExecutor::default();
        let result = executor
            .execute_capability("nope", "nope", Slots::new(), Arc::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::UnknownCapability));
    }

    #[tokio::test]
    async fn test_handler_error_and_failure() {
        let executor = CapabilityExecutor::default();
        executor.register_capability_handler("music", "play", |_, _| async {
            Err::<HandlerOutput, _>(anyhow::anyhow!("device offline"))
        });
        executor.register_capability_handler("music", "pause", |_, _| async {
            Ok(HandlerOutput::failed("nothing playing"))
        });

        let err = executor
            .execute_capability("music", "play", Slots::new(), Arc::default())
            .await;
        assert_eq!(err.error_code, Some(ErrorCode::ExecutionError));
        assert_eq!(err.error.as_deref(), Some("device offline"));

        let failed = executor
            .execute_capability("music", "pause", Slots::new(), Arc::default())
            .await;
        assert_eq!(failed.error_code, Some(ErrorCode::ExecutionError));
        assert_eq!(failed.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_script_extension_without_handler() {
        let executor = CapabilityExecutor::default();
        executor.register_capability_handler("info", "weather", |_, _| async { Ok(HandlerOutput::ok()) });
        executor.register_script_extension("info", "weather", ScriptCapabilityExtension::new("weather"));

        let result = executor
            .execute_capability("info", "weather", Slots::new(), Arc::default())
            .await;
        assert_eq!(result.error_code, Some(ErrorCode::ScriptError));
    }

    #[tokio::test]
    async fn test_validation() {
        let executor = CapabilityExecutor::default();
        executor.register_capability_definition("vehicle", ac_definition());
        executor.register_capability_handler("vehicle", "ac_control", |_, _| async { Ok(HandlerOutput::ok()) });

        let cases = [
            json!({}),
            json!({"action": "  "}),
            json!({"action": "warm"}),
            json!({"action": "on", "temperature": 40}),
            json!({"action": "on", "temperature": "22"}),
        ];
        for case in cases {
            let result = executor
                .execute_capability_with_validation("vehicle", "ac_control", slots(case.clone()), Arc::default())
                .await;
            assert_eq!(result.error_code, Some(ErrorCode::ValidationError), "case {}", case);
        }

        let ok = executor
            .execute_capability_with_validation(
                "vehicle",
                "ac_control",
                slots(json!({"action": "on", "temperature": 22})),
                Arc::default(),
            )
            .await;
        assert!(ok.success);
    }

    #[test]
    fn test_validate_string_rules() {
        let defs = vec![SlotDescriptor::string("plate", true)
            .with_max_length(8)
            .with_pattern("^[A-Z0-9]+$")];
        assert!(validate_slots(&defs, &slots(json!({"plate": "AB123"}))).is_ok());
        assert!(validate_slots(&defs, &slots(json!({"plate": "ab123"}))).is_err());
        assert!(validate_slots(&defs, &slots(json!({"plate": "ABCDEFGHIJ"}))).is_err());
        assert!(validate_slots(&defs, &slots(json!({"plate": 5}))).is_err());

        let flag = vec![SlotDescriptor::boolean("on", false)];
        assert!(validate_slots(&flag, &slots(json!({}))).is_ok());
        assert!(validate_slots(&flag, &slots(json!({"on": "yes"}))).is_err());
    }

    #[test]
    fn test_enum_without_values_accepts_any_string() {
        let open = vec![SlotDescriptor {
            slot_type: SlotType::Enum,
            ..SlotDescriptor::string("mode", true)
        }];
        assert!(validate_slots(&open, &slots(json!({"mode": "auto"}))).is_ok());
        assert!(validate_slots(&open, &slots(json!({"mode": 3}))).is_err());

        let empty = vec![SlotDescriptor::enumeration("mode", &[], true)];
        assert!(validate_slots(&empty, &slots(json!({"mode": "eco"}))).is_ok());

        let closed = vec![SlotDescriptor::enumeration("mode", &["eco"], true)];
        let err = validate_slots(&closed, &slots(json!({"mode": "sport"}))).unwrap_err();
        assert_eq!(err, "Slot mode must be one of: eco");
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let executor = CapabilityExecutor::new(ExecutorOptions {
            validate_slots: true,
            max_concurrency: 2,
        });
        executor.register_capability_handler("s", "slow", |_, _| async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(HandlerOutput::ok().with_tts("slow"))
        });
        executor.register_capability_handler("s", "fast", |_, _| async { Ok(HandlerOutput::ok().with_tts("fast")) });

        let intents: Vec<ExecutionRequest> = vec![
            RecognizedIntent {
                skill_id: "s".into(),
                capability: "slow".into(),
                slots: Slots::new(),
                confidence: 0.9,
            }
            .into(),
            ExecutionRequest::new("s", "missing", Slots::new()),
            ExecutionRequest::new("s", "fast", Slots::new()),
        ];
        let results = executor.execute_multiple_capabilities(intents, Arc::default()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].tts_text.as_deref(), Some("slow"));
        assert_eq!(results[1].error_code, Some(ErrorCode::UnknownCapability));
        assert_eq!(results[2].tts_text.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let executor = CapabilityExecutor::default();
        executor.register_capability_handler("a", "b", |_, _| async { Ok(HandlerOutput::ok()) });
        assert!(executor.has_capability("a", "b"));
        assert!(executor.remove_capability_handler("a", "b"));
        assert!(!executor.remove_capability_handler("a", "b"));
        assert!(!executor.has_handler("a", "b"));

        executor.register_script_extension("a", "c", ScriptCapabilityExtension::new("c"));
        assert!(executor.has_capability("a", "c"));
        executor.clear();
        assert!(!executor.has_capability("a", "c"));
    }
}
