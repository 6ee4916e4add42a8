//! Intent Dispatcher
//!
//! Takes the intents recognized by the language model, runs them through the
//! [`CapabilityExecutor`] as one batch and summarizes the outcome for speech.

use super::error::{SkillError, SkillLoadResult};
use super::executor::CapabilityExecutor;
use super::registry::SkillRegistry;
use super::result::{Command, ExecutionRequest, HandlerOutput, RecognizedIntent, SkillContext, SkillResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Intents executed per utterance
pub const DEFAULT_MAX_INTENTS: usize = 5;

static JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static pattern compiles"));

/// Parsed intent recognition response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecognition {
    pub intents: Vec<RecognizedIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Outcome of one dispatched utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub success: bool,
    pub response: String,
    pub skill_results: Vec<SkillResult>,
    pub commands: Vec<Command>,
}

/// Parse the model's reply: a fenced JSON block, or the whole text
pub fn parse_intent_response(text: &str) -> SkillLoadResult<IntentRecognition> {
    let json = JSON_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| SkillError::InvalidIntentResponse(e.to_string()))?;

    if !value.get("intents").is_some_and(|i| i.is_array()) {
        return Err(SkillError::InvalidIntentResponse(
            "missing 'intents' array".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| SkillError::InvalidIntentResponse(e.to_string()))
}

/// Runs recognized intents against the executor
pub struct IntentDispatcher {
    registry: Arc<SkillRegistry>,
    executor: Arc<CapabilityExecutor>,
    max_intents: usize,
}

impl IntentDispatcher {
    pub fn new(registry: Arc<SkillRegistry>, executor: Arc<CapabilityExecutor>) -> Self {
        Self {
            registry,
            executor,
            max_intents: DEFAULT_MAX_INTENTS,
        }
    }

    pub fn with_max_intents(mut self, max_intents: usize) -> Self {
        self.max_intents = max_intents.max(1);
        self
    }

    pub fn executor(&self) -> &Arc<CapabilityExecutor> {
        &self.executor
    }

    /// Register an acknowledging handler for every declared capability that
    /// has neither a script binding nor a native handler. The handler loads
    /// the skill instructions on first use. Returns the number installed.
    pub fn install_instruction_handlers(&self) -> usize {
        let mut installed = 0;

        for skill in self.registry.get_all_metadata() {
            for capability in &skill.capabilities {
                if capability.script_extension.is_some()
                    || self.executor.has_capability(&skill.id, &capability.name)
                {
                    continue;
                }

                let registry = self.registry.clone();
                let skill_id = skill.id.clone();
                let skill_name = skill.name.clone();
                self.executor
                    .register_capability_handler(&skill.id, &capability.name, move |_slots, _ctx| {
                        let registry = registry.clone();
                        let skill_id = skill_id.clone();
                        let skill_name = skill_name.clone();
                        async move {
                            if registry.load_instructions(&skill_id).await.is_none() {
                                debug!("Skill {} has no instructions", skill_id);
                            }
                            Ok(HandlerOutput::ok().with_tts(format!("Skill {} executed", skill_name)))
                        }
                    });
                installed += 1;
            }
        }

        info!("Installed {} instruction handlers", installed);
        installed
    }

    pub async fn dispatch(&self, intents: Vec<RecognizedIntent>, ctx: Arc<SkillContext>) -> DispatchOutcome {
        if intents.is_empty() {
            return DispatchOutcome {
                success: false,
                response: "Sorry, I didn't understand that.".to_string(),
                skill_results: Vec::new(),
                commands: Vec::new(),
            };
        }

        let mut intents = intents;
        if intents.len() > self.max_intents {
            warn!(
                "Received {} intents, executing the first {}",
                intents.len(),
                self.max_intents
            );
            intents.truncate(self.max_intents);
        }

        let confidences: Vec<f64> = intents.iter().map(|i| i.confidence).collect();
        let requests: Vec<ExecutionRequest> = intents.into_iter().map(ExecutionRequest::from).collect();

        let mut results = self.executor.execute_multiple_capabilities(requests, ctx).await;
        for (result, confidence) in results.iter_mut().zip(confidences) {
            result.confidence = confidence.clamp(0.0, 1.0);
        }

        let commands = results.iter().flat_map(|r| r.commands.iter().cloned()).collect();
        let succeeded = results.iter().filter(|r| r.success).count();

        DispatchOutcome {
            success: succeeded > 0,
            response: summarize(&results),
            skill_results: results,
            commands,
        }
    }

    /// Parse a raw model reply and dispatch it
    pub async fn dispatch_response(&self, text: &str, ctx: Arc<SkillContext>) -> SkillLoadResult<DispatchOutcome> {
        let recognition = parse_intent_response(text)?;
        if let Some(reasoning) = &recognition.reasoning {
            debug!("Intent reasoning: {}", reasoning);
        }
        Ok(self.dispatch(recognition.intents, ctx).await)
    }
}

fn summarize(results: &[SkillResult]) -> String {
    let total = results.len();
    let succeeded = results.iter().filter(|r| r.success).count();

    if succeeded == total {
        let texts: Vec<&str> = results
            .iter()
            .filter_map(|r| r.tts_text.as_deref())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            format!("Done, handled {} requests.", total)
        } else {
            texts.join(", ")
        }
    } else if succeeded == 0 {
        "Sorry, something went wrong while handling your request.".to_string()
    } else {
        format!("Handled {}/{} requests; some actions did not succeed.", succeeded, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::result::{ErrorCode, Slots};

    #[test]
    fn test_parse_fenced_response() {
        let text = "Sure.\n```json\n{\"intents\":[{\"skillId\":\"music\",\"capability\":\"play\",\"slots\":{\"song\":\"x\"}}],\"reasoning\":\"asked for music\"}\n```";
        let parsed = parse_intent_response(text).unwrap();
        assert_eq!(parsed.intents.len(), 1);
        assert_eq!(parsed.intents[0].confidence, 0.5);
        assert_eq!(parsed.reasoning.as_deref(), Some("asked for music"));
    }

    #[test]
    fn test_parse_rejects_missing_intents() {
        assert!(matches!(
            parse_intent_response(r#"{"reasoning":"none"}"#),
            Err(SkillError::InvalidIntentResponse(_))
        ));
        assert!(parse_intent_response("not json").is_err());
        assert!(parse_intent_response(r#"{"intents":[]}"#).unwrap().intents.is_empty());
    }

    fn result(success: bool, tts: Option<&str>) -> SkillResult {
        let r = if success {
            SkillResult::success("c", Slots::new())
        } else {
            SkillResult::error("c", Slots::new(), ErrorCode::ExecutionError, "x")
        };
        match tts {
            Some(t) => r.with_tts(t),
            None => r,
        }
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&[result(true, Some("AC on")), result(true, Some("Playing"))]), "AC on, Playing");
        assert_eq!(summarize(&[result(true, None), result(true, None)]), "Done, handled 2 requests.");
        assert_eq!(
            summarize(&[result(true, None), result(false, None)]),
            "Handled 1/2 requests; some actions did not succeed."
        );
        assert!(summarize(&[result(false, None)]).starts_with("Sorry"));
    }

    #[tokio::test]
    async fn test_dispatch_caps_and_stamps_confidence() {
        let executor = Arc::new(CapabilityExecutor::default());
        executor.register_capability_handler("s", "c", |_, _| async { Ok(HandlerOutput::ok()) });
        let dispatcher = IntentDispatcher::new(Arc::new(SkillRegistry::new()), executor).with_max_intents(2);

        let intents = (0..4)
            .map(|i| RecognizedIntent {
                skill_id: "s".into(),
                capability: "c".into(),
                slots: Slots::new(),
                confidence: 0.1 * (i + 1) as f64,
            })
            .collect();
        let outcome = dispatcher.dispatch(intents, Arc::default()).await;

        assert!(outcome.success);
        assert_eq!(outcome.skill_results.len(), 2);
        assert_eq!(outcome.skill_results[1].confidence, 0.2);
        assert_eq!(outcome.response, "Done, handled 2 requests.");
    }

    #[tokio::test]
    async fn test_dispatch_clamps_confidence() {
        let executor = Arc::new(CapabilityExecutor::default());
        executor.register_capability_handler("s", "c", |_, _| async { Ok(HandlerOutput::ok()) });
        let dispatcher = IntentDispatcher::new(Arc::new(SkillRegistry::new()), executor);

        let intents = [1.7, -0.3]
            .into_iter()
            .map(|confidence| RecognizedIntent {
                skill_id: "s".into(),
                capability: "c".into(),
                slots: Slots::new(),
                confidence,
            })
            .collect();
        let outcome = dispatcher.dispatch(intents, Arc::default()).await;

        let confidences: Vec<f64> = outcome.skill_results.iter().map(|r| r.confidence).collect();
        assert_eq!(confidences, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_dispatch_empty() {
        let dispatcher = IntentDispatcher::new(
            Arc::new(SkillRegistry::new()),
            Arc::new(CapabilityExecutor::default()),
        );
        let outcome = dispatcher.dispatch(Vec::new(), Arc::default()).await;
        assert!(!outcome.success);
        assert!(outcome.skill_results.is_empty());
    }
}
