//! Configuration management

use crate::skills::{ExecutorOptions, SandboxConfig};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Sandbox regime selected by `NLC_SANDBOX_PROFILE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxProfile {
    Default,
    Strict,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory scanned for skills
    pub skills_dir: PathBuf,

    /// Script timeout when a script config sets none
    pub script_timeout_ms: u64,

    /// Output cap per stream
    pub max_output_bytes: usize,

    /// Run every script in a fresh temp directory
    pub sandbox_temp_workdir: bool,

    /// Scripts must live under one of these (defaults to the skills dir)
    pub allowed_paths: Vec<PathBuf>,

    /// Never executed, even when under an allowed path
    pub denied_paths: Vec<PathBuf>,

    /// Tell every script it has no network
    pub network_disabled: bool,

    /// Refuse scripts modified since their catalog was loaded
    pub verify_script_digests: bool,

    /// Batch calls in flight at once
    pub max_concurrency: usize,

    /// Intents executed per utterance
    pub max_intents: usize,

    pub sandbox_profile: SandboxProfile,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let skills_dir = lookup("NLC_SKILLS_DIR")
            .or_else(|| lookup("SKILLS_DIR"))
            .map(|dir| expand(&dir))
            .unwrap_or_else(|| PathBuf::from("skills"));

        let script_timeout_ms = parse_or(&lookup, "NLC_SCRIPT_TIMEOUT_MS", 5000)?;
        let max_output_bytes = parse_or(&lookup, "NLC_MAX_OUTPUT_BYTES", 1024 * 1024)?;
        let sandbox_temp_workdir = flag_or(&lookup, "NLC_SANDBOX_TEMP_WORKDIR", false);
        let network_disabled = flag_or(&lookup, "NLC_NETWORK_DISABLED", false);
        let verify_script_digests = flag_or(&lookup, "NLC_VERIFY_SCRIPT_DIGESTS", true);
        let max_concurrency = parse_or(&lookup, "NLC_MAX_CONCURRENCY", 4)?;
        let max_intents = parse_or(&lookup, "NLC_MAX_INTENTS", 5)?;

        let allowed_paths = lookup("NLC_ALLOWED_PATHS")
            .map(|v| path_list(&v))
            .unwrap_or_else(|| vec![skills_dir.clone()]);

        let denied_paths = path_list(&lookup("NLC_DENIED_PATHS").unwrap_or_else(|| "/etc:~/.ssh".to_string()));

        let sandbox_profile = match lookup("NLC_SANDBOX_PROFILE").as_deref() {
            None | Some("") | Some("default") => SandboxProfile::Default,
            Some("strict") => SandboxProfile::Strict,
            Some(other) => bail!("Unknown NLC_SANDBOX_PROFILE: {}", other),
        };

        if max_concurrency == 0 {
            bail!("NLC_MAX_CONCURRENCY must be at least 1");
        }

        Ok(Self {
            skills_dir,
            script_timeout_ms,
            max_output_bytes,
            sandbox_temp_workdir,
            allowed_paths,
            denied_paths,
            network_disabled,
            verify_script_digests,
            max_concurrency,
            max_intents,
            sandbox_profile,
        })
    }

    /// Sandbox settings for this configuration.
    ///
    /// The strict profile keeps its own limits; path lists and digest
    /// verification always come from the environment.
    pub fn sandbox_config(&self) -> SandboxConfig {
        let base = match self.sandbox_profile {
            SandboxProfile::Default => SandboxConfig {
                network_disabled: self.network_disabled,
                max_output_bytes: self.max_output_bytes,
                use_temp_work_dir: self.sandbox_temp_workdir,
                default_timeout_ms: self.script_timeout_ms,
                ..SandboxConfig::default()
            },
            SandboxProfile::Strict => SandboxConfig::strict(self.skills_dir.clone()),
        };

        SandboxConfig {
            allowed_paths: self.allowed_paths.clone(),
            denied_paths: self.denied_paths.clone(),
            verify_digests: self.verify_script_digests,
            ..base
        }
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            validate_slots: true,
            max_concurrency: self.max_concurrency,
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn path_list(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(expand)
        .collect()
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => v.trim().parse().with_context(|| format!("Invalid {}", key)),
        _ => Ok(default),
    }
}

fn flag_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.skills_dir, PathBuf::from("skills"));
        assert_eq!(config.script_timeout_ms, 5000);
        assert_eq!(config.max_output_bytes, 1024 * 1024);
        assert_eq!(config.allowed_paths, vec![PathBuf::from("skills")]);
        assert_eq!(config.denied_paths[0], PathBuf::from("/etc"));
        assert!(config.verify_script_digests);
        assert_eq!(config.max_intents, 5);
        assert_eq!(config.sandbox_profile, SandboxProfile::Default);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SKILLS_DIR", "/opt/fallback"),
            ("NLC_SKILLS_DIR", "/opt/skills"),
            ("NLC_ALLOWED_PATHS", "/opt/skills:/opt/shared"),
            ("NLC_NETWORK_DISABLED", "1"),
            ("NLC_MAX_CONCURRENCY", "8"),
        ])
        .unwrap();
        assert_eq!(config.skills_dir, PathBuf::from("/opt/skills"));
        assert_eq!(config.allowed_paths.len(), 2);

        let sandbox = config.sandbox_config();
        assert!(sandbox.network_disabled);
        assert_eq!(config.executor_options().max_concurrency, 8);
    }

    #[test]
    fn test_strict_profile() {
        let config = config(&[("NLC_SANDBOX_PROFILE", "strict"), ("NLC_VERIFY_SCRIPT_DIGESTS", "false")]).unwrap();
        let sandbox = config.sandbox_config();
        assert!(sandbox.network_disabled);
        assert!(sandbox.use_temp_work_dir);
        assert!(!sandbox.verify_digests);
        assert_eq!(sandbox.allowed_paths, vec![PathBuf::from("skills")]);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("NLC_SCRIPT_TIMEOUT_MS", "soon")]).is_err());
        assert!(config(&[("NLC_SANDBOX_PROFILE", "loose")]).is_err());
        assert!(config(&[("NLC_MAX_CONCURRENCY", "0")]).is_err());
    }
}
