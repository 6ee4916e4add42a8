//! NLC Skills - Entry Point
//!
//! Modes:
//! - Default / --list: list discovered skills
//! - --describe [ids]: capability listing as given to the intent model
//! - --run <skill> <capability> [slots-json]: execute one capability
//! - --intents <file>: dispatch a saved intent recognition response

use anyhow::{bail, Context};
use nlc_skills::skills::Slots;
use nlc_skills::{
    CapabilityExecutor, Config, IntentDispatcher, ScriptCapabilityHandler, ScriptSandbox, SkillContext,
    SkillRegistry,
};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

struct Runtime {
    registry: Arc<SkillRegistry>,
    dispatcher: IntentDispatcher,
}

async fn build_runtime(config: &Config) -> Runtime {
    let registry = Arc::new(SkillRegistry::new());
    let report = registry.scan(&config.skills_dir).await;
    info!(
        "Loaded {} skills from {} ({} skipped, {} disabled)",
        report.loaded,
        config.skills_dir.display(),
        report.skipped.len(),
        report.disabled.len()
    );
    for (dir, reason) in &report.skipped {
        warn!("Skipped {}: {}", dir.display(), reason);
    }

    let sandbox = Arc::new(ScriptSandbox::new(config.sandbox_config()));
    let script_handler = ScriptCapabilityHandler::new(sandbox)
        .with_registry(registry.clone())
        .with_global_catalog(config.skills_dir.clone());

    let executor =
        CapabilityExecutor::new(config.executor_options()).with_script_handler(Arc::new(script_handler));
    let executor = Arc::new(executor);
    executor.register_skill_capabilities(&registry);

    let dispatcher = IntentDispatcher::new(registry.clone(), executor).with_max_intents(config.max_intents);
    dispatcher.install_instruction_handlers();

    Runtime { registry, dispatcher }
}

fn print_help() {
    println!("NLC Skills v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: nlc-skills [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list, -l                              List discovered skills (default)");
    println!("  --describe, -d [IDS...]                 Print capability descriptions");
    println!("  --run, -r <SKILL> <CAPABILITY> [SLOTS]  Execute one capability (SLOTS is a JSON object)");
    println!("  --intents, -i <FILE>                    Dispatch an intent recognition response");
    println!("  --help, -h                              Show this help");
    println!();
    println!("Environment variables:");
    println!("  NLC_SKILLS_DIR             Skills root (default: skills)");
    println!("  NLC_SCRIPT_TIMEOUT_MS      Default script timeout (default: 5000)");
    println!("  NLC_MAX_OUTPUT_BYTES       Output cap per stream (default: 1048576)");
    println!("  NLC_SANDBOX_PROFILE        default | strict");
    println!("  NLC_ALLOWED_PATHS          Colon-separated script roots");
    println!("  NLC_DENIED_PATHS           Colon-separated denied paths (default: /etc:~/.ssh)");
    println!("  NLC_MAX_CONCURRENCY        Batch concurrency (default: 4)");
    println!("  NLC_MAX_INTENTS            Intents per utterance (default: 5)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = args.first().map(String::as_str).unwrap_or("--list");

    if matches!(mode, "--help" | "-h") {
        print_help();
        return Ok(());
    }
    let batch_mode = matches!(mode, "--intents" | "-i");

    // Setup logging based on mode
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        })
        .unwrap_or(Level::WARN);

    // stdout carries command output, logs always go to stderr
    if batch_mode {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;
    let runtime = build_runtime(&config).await;

    match mode {
        "--list" | "-l" => {
            for skill in runtime.registry.get_all_metadata() {
                println!(
                    "{:<24} {:<16} priority {:<4} {} capabilities  {}",
                    skill.id,
                    skill.domain.as_str(),
                    skill.priority,
                    skill.capabilities.len(),
                    skill.name
                );
            }
        }
        "--describe" | "-d" => {
            let ids: Vec<&str> = args[1..].iter().map(String::as_str).collect();
            let selected = if ids.is_empty() { None } else { Some(ids.as_slice()) };
            println!("{}", runtime.registry.get_capability_descriptions(selected));
        }
        "--run" | "-r" => {
            let (Some(skill_id), Some(capability)) = (args.get(1), args.get(2)) else {
                bail!("Usage: nlc-skills --run <SKILL> <CAPABILITY> [SLOTS]");
            };
            let slots: Slots = match args.get(3) {
                Some(json) => serde_json::from_str(json).context("SLOTS must be a JSON object")?,
                None => Slots::new(),
            };

            let result = runtime
                .dispatcher
                .executor()
                .execute_capability_with_validation(skill_id, capability, slots, Arc::new(SkillContext::default()))
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "--intents" | "-i" => {
            let Some(path) = args.get(1) else {
                bail!("Usage: nlc-skills --intents <FILE>");
            };
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path))?;

            let outcome = runtime
                .dispatcher
                .dispatch_response(&text, Arc::new(SkillContext::default()))
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        other => bail!("Unknown option: {} (see --help)", other),
    }

    Ok(())
}
