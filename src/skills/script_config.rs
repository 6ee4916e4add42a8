//! Script Catalogs
//!
//! Loads `scripts.yaml` from a scripts directory into a [`ScriptCatalog`].
//! Every entry is checked at load time (id charset, path confinement,
//! interpreter) so the sandbox only ever sees configs that stay inside their
//! base directory. A bad entry is rejected on its own; the rest still load.

use super::error::{SkillError, SkillLoadResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Default catalog file name inside a scripts directory
pub const SCRIPTS_FILE: &str = "scripts.yaml";

/// Default per-script timeout
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 5000;

static SCRIPT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static pattern compiles"));

/// Substrings never allowed in a script or write-directory path
const UNSAFE_PATH_FRAGMENTS: &[(&str, &str)] = &[
    ("..", "parent directory reference"),
    ("\0", "NUL byte"),
    ("$(", "command substitution"),
    ("`", "backtick substitution"),
    ("|", "pipe"),
    (";", "command separator"),
    ("&&", "command chaining"),
];

/// Script interpreters the sandbox knows how to launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpreter {
    Bash,
    Sh,
    Node,
    #[serde(alias = "python")]
    Python3,
    Auto,
}

impl Interpreter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Sh => "sh",
            Self::Node => "node",
            Self::Python3 => "python3",
            Self::Auto => "auto",
        }
    }

    /// Resolve `Auto` from the script's extension
    pub fn resolve_for(&self, script: &Path) -> Interpreter {
        if *self != Self::Auto {
            return *self;
        }
        match script.extension().and_then(|e| e.to_str()) {
            Some("sh") | Some("bash") => Self::Bash,
            Some("js") | Some("mjs") | Some("cjs") => Self::Node,
            Some("py") => Self::Python3,
            _ => Self::Bash,
        }
    }

    /// Program name passed to the process spawner
    pub fn program(&self) -> &'static str {
        match self {
            Self::Bash | Self::Auto => "bash",
            Self::Sh => "sh",
            Self::Node => "node",
            Self::Python3 => "python3",
        }
    }
}

impl fmt::Display for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpreter {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bash" => Ok(Self::Bash),
            "sh" => Ok(Self::Sh),
            "node" => Ok(Self::Node),
            "python" | "python3" => Ok(Self::Python3),
            "auto" => Ok(Self::Auto),
            other => Err(SkillError::UnsupportedInterpreter(other.to_string())),
        }
    }
}

/// A validated script entry
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptConfig {
    pub id: String,
    pub name: String,
    /// Relative to `base_dir`
    pub path: String,
    pub base_dir: PathBuf,
    pub interpreter: Interpreter,
    pub timeout_ms: u64,
    pub env: BTreeMap<String, String>,
    pub allowed_files: Vec<String>,
    pub allow_network: bool,
    pub allow_write: bool,
    /// Relative to `base_dir`
    pub write_directories: Vec<String>,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    /// SHA-256 of the script at load time, when the file existed
    pub digest: Option<String>,
}

impl ScriptConfig {
    pub fn new(id: &str, name: &str, path: &str, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            base_dir: base_dir.into(),
            interpreter: Interpreter::Auto,
            timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            env: BTreeMap::new(),
            allowed_files: Vec::new(),
            allow_network: true,
            allow_write: false,
            write_directories: Vec::new(),
            description: None,
            capabilities: Vec::new(),
            digest: None,
        }
    }

    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    pub fn with_write_directories(mut self, dirs: &[&str]) -> Self {
        self.allow_write = true;
        self.write_directories = dirs.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, caps: &[&str]) -> Self {
        self.capabilities = caps.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_digest(mut self, digest: &str) -> Self {
        self.digest = Some(digest.to_string());
        self
    }

    /// Absolute script location
    pub fn resolved_path(&self) -> PathBuf {
        self.base_dir.join(&self.path)
    }

    /// Absolute write directories
    pub fn resolved_write_directories(&self) -> Vec<PathBuf> {
        self.write_directories
            .iter()
            .map(|d| self.base_dir.join(d))
            .collect()
    }

    /// Whether this script may back `capability`; an empty list allows any
    pub fn serves(&self, capability: &str) -> bool {
        self.capabilities.is_empty() || self.capabilities.iter().any(|c| c == capability)
    }
}

/// Result of loading one catalog file
#[derive(Debug, Clone, Default)]
pub struct ScriptCatalog {
    pub base_dir: PathBuf,
    configs: Vec<ScriptConfig>,
    index: HashMap<String, usize>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ScriptCatalog {
    pub fn empty(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// True when no entry was rejected
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ScriptConfig> {
        self.index.get(id).map(|&i| &self.configs[i])
    }

    pub fn all_configs(&self) -> &[ScriptConfig] {
        &self.configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Scripts that explicitly list `capability`
    pub fn find_by_capability(&self, capability: &str) -> Vec<&ScriptConfig> {
        self.configs
            .iter()
            .filter(|c| c.capabilities.iter().any(|cap| cap == capability))
            .collect()
    }

    fn insert(&mut self, config: ScriptConfig) -> Result<(), String> {
        if self.index.contains_key(&config.id) {
            return Err(format!("duplicate script id: {}", config.id));
        }
        self.index.insert(config.id.clone(), self.configs.len());
        self.configs.push(config);
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogSettings {
    default_timeout: Option<u64>,
    default_interpreter: Option<String>,
    allow_network: Option<bool>,
    allow_write: Option<bool>,
    write_directories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptEntry {
    id: Option<String>,
    name: Option<String>,
    path: Option<String>,
    interpreter: Option<String>,
    timeout: Option<u64>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    allowed_files: Vec<String>,
    allow_network: Option<bool>,
    allow_write: Option<bool>,
    write_directories: Option<Vec<String>>,
    description: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

/// Loader for one scripts directory
#[derive(Debug, Clone)]
pub struct ScriptConfigLoader {
    base_dir: PathBuf,
    file_name: String,
}

impl ScriptConfigLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            file_name: SCRIPTS_FILE.to_string(),
        }
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = file_name.to_string();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(&self.file_name)
    }

    /// Load and validate the catalog. Never fails: problems end up in
    /// `errors` / `warnings` of the returned catalog.
    pub async fn load(&self) -> ScriptCatalog {
        let mut catalog = ScriptCatalog::empty(&self.base_dir);
        let path = self.config_path();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                catalog
                    .warnings
                    .push(format!("Script catalog not found: {}", path.display()));
                return catalog;
            }
            Err(e) => {
                catalog.errors.push(SkillError::io(&path, e).to_string());
                return catalog;
            }
        };

        let document: serde_yaml::Value = match serde_yaml::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                catalog.errors.push(SkillError::parse(&path, e).to_string());
                return catalog;
            }
        };

        let settings: CatalogSettings = match document.get("settings") {
            Some(v) if !v.is_null() => match serde_yaml::from_value(v.clone()) {
                Ok(s) => s,
                Err(e) => {
                    catalog
                        .errors
                        .push(SkillError::parse(&path, format!("settings: {}", e)).to_string());
                    return catalog;
                }
            },
            _ => CatalogSettings::default(),
        };

        let Some(entries) = document.get("scripts").and_then(|v| v.as_sequence()) else {
            catalog.errors.push(SkillError::MissingScriptsList.to_string());
            return catalog;
        };

        for (i, raw) in entries.iter().enumerate() {
            let label = raw
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("<unnamed>")
                .to_string();

            let entry: ScriptEntry = match serde_yaml::from_value(raw.clone()) {
                Ok(e) => e,
                Err(e) => {
                    catalog.errors.push(format!("Script #{}: {}", i + 1, e));
                    continue;
                }
            };

            let mut warnings = Vec::new();
            match self.validate_entry(entry, &settings, &mut warnings).await {
                Ok(config) => {
                    debug!("Loaded script config '{}' ({})", config.id, config.path);
                    if let Err(e) = catalog.insert(config) {
                        catalog.errors.push(format!("Script #{}: {}", i + 1, e));
                    }
                }
                Err(e) => {
                    warn!("Rejected script #{} in {}: {}", i + 1, path.display(), e);
                    catalog.errors.push(format!("Script #{}: {}", i + 1, e));
                }
            }
            catalog
                .warnings
                .extend(warnings.into_iter().map(|w| format!("Script {}: {}", label, w)));
        }

        catalog
    }

    async fn validate_entry(
        &self,
        entry: ScriptEntry,
        settings: &CatalogSettings,
        warnings: &mut Vec<String>,
    ) -> SkillLoadResult<ScriptConfig> {
        let id = non_empty(entry.id, "id")?;
        let name = non_empty(entry.name, "name")?;
        let path = non_empty(entry.path, "path")?;

        if !SCRIPT_ID.is_match(&id) {
            return Err(SkillError::InvalidScriptId(id));
        }

        check_relative_path(&path)?;

        let interpreter: Interpreter = entry
            .interpreter
            .as_deref()
            .or(settings.default_interpreter.as_deref())
            .unwrap_or("auto")
            .parse()?;

        let write_directories = entry
            .write_directories
            .or_else(|| settings.write_directories.clone())
            .unwrap_or_default();
        for dir in &write_directories {
            check_relative_path(dir)?;
        }

        let full_path = self.base_dir.join(&path);
        let digest = match tokio::fs::metadata(&full_path).await {
            Ok(meta) if !meta.is_file() => return Err(SkillError::NotAFile(path)),
            Ok(_) => {
                self.ensure_canonical_inside(&full_path, &path)?;
                let bytes = tokio::fs::read(&full_path)
                    .await
                    .map_err(|e| SkillError::io(&full_path, e))?;
                Some(hex::encode(Sha256::digest(&bytes)))
            }
            Err(_) => {
                warnings.push(format!("script file does not exist: {}", path));
                None
            }
        };

        Ok(ScriptConfig {
            id,
            name,
            path,
            base_dir: self.base_dir.clone(),
            interpreter,
            timeout_ms: entry
                .timeout
                .or(settings.default_timeout)
                .unwrap_or(DEFAULT_SCRIPT_TIMEOUT_MS),
            env: entry.env,
            allowed_files: entry.allowed_files,
            allow_network: entry.allow_network.or(settings.allow_network).unwrap_or(true),
            allow_write: entry.allow_write.or(settings.allow_write).unwrap_or(false),
            write_directories,
            description: entry.description,
            capabilities: entry.capabilities,
            digest,
        })
    }

    /// Symlinks must not lead outside the base either
    fn ensure_canonical_inside(&self, full_path: &Path, raw: &str) -> SkillLoadResult<()> {
        let base = std::fs::canonicalize(&self.base_dir).map_err(|e| SkillError::io(&self.base_dir, e))?;
        let target = std::fs::canonicalize(full_path).map_err(|e| SkillError::io(full_path, e))?;
        if target.starts_with(&base) {
            Ok(())
        } else {
            Err(SkillError::PathEscapesBase(raw.to_string()))
        }
    }
}

fn non_empty(value: Option<String>, field: &str) -> SkillLoadResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(SkillError::MissingField(field.to_string())),
    }
}

/// Reject anything that is not a plain relative path below its base
pub fn check_relative_path(path: &str) -> SkillLoadResult<()> {
    let unsafe_path = |reason: &str| SkillError::UnsafePath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.starts_with('/') {
        return Err(unsafe_path("absolute path"));
    }
    if path.starts_with('~') {
        return Err(unsafe_path("home directory reference"));
    }
    for (fragment, reason) in UNSAFE_PATH_FRAGMENTS {
        if path.contains(fragment) {
            return Err(unsafe_path(reason));
        }
    }

    let mut depth: i32 = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(SkillError::PathEscapesBase(path.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SkillError::PathEscapesBase(path.to_string()))
            }
        }
    }
    Ok(())
}
