//! Skills
//!
//! Progressive-disclosure skill system for the in-vehicle assistant.
//!
//! # Architecture
//!
//! ```text
//! skills/ ──► SkillLoader ──► SkillRegistry ──► metadata (prompt listing)
//!                                  │   ├── SKILL.md      (lazy, cached)
//!                                  │   └── scripts.yaml  (lazy, cached)
//!                                  ▼
//! intents ──► IntentDispatcher ──► CapabilityExecutor
//!                                  ├── native handlers
//!                                  └── ScriptCapabilityHandler ──► ScriptSandbox
//! ```
//!
//! # Security
//!
//! Scripts run without a shell, with a cleared environment, a wall-clock
//! timeout, capped output and a SHA-256 digest checked against the one pinned
//! at catalog load. String slots carrying shell metacharacters are rejected
//! before any process is spawned.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod loader;
pub mod registry;
pub mod result;
pub mod sandbox;
pub mod script_config;
pub mod script_handler;
pub mod types;
pub mod validator;

pub use dispatcher::{parse_intent_response, DispatchOutcome, IntentDispatcher, IntentRecognition};
pub use error::{SkillError, SkillLoadResult};
pub use executor::{CapabilityExecutor, CapabilityHandler, ExecutorOptions};
pub use formatter::{FormatOptions, FormattedResult, OutputFormat, ResultFormatter};
pub use loader::{DiscoveredSkill, DiscoveryReport, SkillLoader};
pub use registry::{ScanReport, SkillRegistry};
pub use result::{
    Command, DialogMessage, ErrorCode, ExecutionRequest, HandlerOutput, RecognizedIntent, SkillContext,
    SkillResult, Slots,
};
pub use sandbox::{
    ExecuteOptions, SandboxConfig, SandboxStatsSnapshot, ScriptOutcome, ScriptResult, ScriptRunner, ScriptSandbox,
};
pub use script_config::{Interpreter, ScriptCatalog, ScriptConfig, ScriptConfigLoader};
pub use script_handler::ScriptCapabilityHandler;
pub use types::{
    CapabilityDescriptor, Domain, ScriptCapabilityExtension, SkillDescriptor, SkillInstructions, SlotDescriptor,
    SlotType,
};
pub use validator::{InputValidator, ValidationResult, ValidationRule, ValidatorOptions};
