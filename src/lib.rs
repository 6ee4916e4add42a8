//! NLC Skills
//!
//! Skill runtime for a natural-language vehicle assistant.
//!
//! # Features
//!
//! - **Progressive disclosure**: skill metadata eagerly, `SKILL.md` and script
//!   catalogs on first use
//! - **Capability execution**: native handlers or external scripts, slot
//!   validation, bounded concurrent batches
//! - **Script sandbox**: no shell, cleared environment, timeouts, output caps,
//!   digest pinning
//!
//! # Architecture
//!
//! ```text
//! LLM intents ──► IntentDispatcher ──► CapabilityExecutor ──► handlers
//!                        │                     │
//!                        ▼                     └──► ScriptSandbox ──► bash/node/python3
//!                  SkillRegistry (skills/)
//! ```

pub mod config;
pub mod skills;

pub use config::{Config, SandboxProfile};
pub use skills::{
    CapabilityExecutor, IntentDispatcher, ScriptCapabilityHandler, ScriptSandbox, SkillContext, SkillRegistry,
    SkillResult,
};
