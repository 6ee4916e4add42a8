//! Skill Loader
//!
//! Reads skill directories from disk. Each immediate subdirectory of the skills
//! root that holds a metadata file is one skill:
//!
//! ```text
//! skills/
//! ├── vehicle/
//! │   ├── skill.yaml        # metadata (or skill.yml / skill.toml / skill.json)
//! │   ├── SKILL.md          # instructions, loaded lazily
//! │   ├── examples/*.md     # extra utterance examples
//! │   └── scripts/scripts.yaml
//! └── scripts.yaml          # global fallback catalog
//! ```

use super::error::{SkillError, SkillLoadResult};
use super::types::{SkillDescriptor, SkillInstructions, SkillManifest};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Metadata file names, first match wins
pub const METADATA_FILES: &[&str] = &["skill.yaml", "skill.yml", "skill.toml", "skill.json"];

/// Instructions file name
pub const INSTRUCTIONS_FILE: &str = "SKILL.md";

/// Examples directory name
pub const EXAMPLES_DIR: &str = "examples";

/// A skill found on disk
#[derive(Debug, Clone)]
pub struct DiscoveredSkill {
    pub descriptor: SkillDescriptor,
    pub dir: PathBuf,
}

/// Everything one directory walk produced
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Enabled skills in directory-name order
    pub skills: Vec<DiscoveredSkill>,
    /// (directory, reason) for invalid manifests
    pub skipped: Vec<(PathBuf, String)>,
    /// Ids of skills with `enabled: false`
    pub disabled: Vec<String>,
}

/// Reads skills from a directory tree
#[derive(Debug, Clone, Default)]
pub struct SkillLoader;

impl SkillLoader {
    pub fn new() -> Self {
        Self
    }

    /// Walk the immediate subdirectories of `root`. A missing root is empty.
    pub async fn discover(&self, root: &Path) -> SkillLoadResult<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Skills directory not found: {}", root.display());
                return Ok(report);
            }
            Err(e) => return Err(SkillError::io(root, e)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| SkillError::io(root, e))? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        for dir in dirs {
            match self.load_manifest(&dir).await {
                Ok(Some(descriptor)) if !descriptor.enabled => {
                    debug!("Skill '{}' is disabled", descriptor.id);
                    report.disabled.push(descriptor.id);
                }
                Ok(Some(descriptor)) => report.skills.push(DiscoveredSkill { descriptor, dir }),
                Ok(None) => debug!("No skill metadata in {}", dir.display()),
                Err(e) => {
                    warn!("Skipping skill in {}: {}", dir.display(), e);
                    report.skipped.push((dir, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Load the metadata file of one skill directory; `None` if there is none
    pub async fn load_manifest(&self, dir: &Path) -> SkillLoadResult<Option<SkillDescriptor>> {
        for file_name in METADATA_FILES {
            let path = dir.join(file_name);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| SkillError::io(&path, e))?;
            let manifest = parse_manifest(&path, &content)?;
            return manifest.into_descriptor().map(Some);
        }
        Ok(None)
    }

    /// Read `SKILL.md`; `None` when the file does not exist
    pub async fn read_instructions(&self, dir: &Path) -> SkillLoadResult<Option<SkillInstructions>> {
        let path = dir.join(INSTRUCTIONS_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let digest = hex::encode(Sha256::digest(content.as_bytes()));
                Ok(Some(SkillInstructions {
                    content,
                    digest,
                    path,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SkillError::io(path, e)),
        }
    }

    /// Collect example utterances from `examples/*.md`
    pub async fn load_examples(&self, dir: &Path) -> Vec<String> {
        let examples_dir = dir.join(EXAMPLES_DIR);
        let mut entries = match tokio::fs::read_dir(&examples_dir).await {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e == "md").unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();

        let mut examples = Vec::new();
        for file in files {
            match tokio::fs::read_to_string(&file).await {
                Ok(content) => examples.extend(parse_examples(&content)),
                Err(e) => warn!("Failed to read examples {}: {}", file.display(), e),
            }
        }
        examples
    }
}

fn parse_manifest(path: &Path, content: &str) -> SkillLoadResult<SkillManifest> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension {
        "toml" => toml::from_str(content).map_err(|e| SkillError::parse(path, e)),
        "json" => serde_json::from_str(content).map_err(|e| SkillError::parse(path, e)),
        _ => serde_yaml::from_str(content).map_err(|e| SkillError::parse(path, e)),
    }
}

/// One example per non-empty line; headings and HTML comments are skipped
fn parse_examples(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("<!--"))
        .map(|line| {
            line.strip_prefix(['-', '*'])
                .unwrap_or(line)
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::types::Domain;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_manifest_formats() {
        let temp_dir = TempDir::new().unwrap();
        let toml_dir = temp_dir.path().join("nav");
        tokio::fs::create_dir_all(&toml_dir).await.unwrap();
        tokio::fs::write(
            toml_dir.join("skill.toml"),
            r#"
id = "navigation"
name = "Navigation"
description = "Route guidance"
domain = "navigation"
priority = 10

[[capabilities]]
name = "navigate_to"
description = "Start navigation"
"#,
        )
        .await
        .unwrap();

        let json_dir = temp_dir.path().join("chat");
        tokio::fs::create_dir_all(&json_dir).await.unwrap();
        tokio::fs::write(
            json_dir.join("skill.json"),
            r#"{"id":"chat","name":"Chat","description":"Small talk","domain":"chat"}"#,
        )
        .await
        .unwrap();

        let loader = SkillLoader::new();
        let nav = loader.load_manifest(&toml_dir).await.unwrap().unwrap();
        assert_eq!(nav.domain, Domain::Navigation);
        assert_eq!(nav.priority, 10);
        assert_eq!(nav.capabilities[0].name, "navigate_to");

        let chat = loader.load_manifest(&json_dir).await.unwrap().unwrap();
        assert_eq!(chat.id, "chat");

        assert!(loader.load_manifest(temp_dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_instructions() {
        let temp_dir = TempDir::new().unwrap();
        let loader = SkillLoader::new();
        assert!(loader.read_instructions(temp_dir.path()).await.unwrap().is_none());

        tokio::fs::write(temp_dir.path().join(INSTRUCTIONS_FILE), "# Music\nPlay songs.")
            .await
            .unwrap();
        let instructions = loader.read_instructions(temp_dir.path()).await.unwrap().unwrap();
        assert!(instructions.content.contains("Play songs."));
        assert_eq!(instructions.digest.len(), 64);
    }

    #[tokio::test]
    async fn test_load_examples() {
        let temp_dir = TempDir::new().unwrap();
        let examples = temp_dir.path().join(EXAMPLES_DIR);
        tokio::fs::create_dir_all(&examples).await.unwrap();
        tokio::fs::write(
            examples.join("basic.md"),
            "# Examples\n<!-- comment -->\n- turn on the AC\n* set 22 degrees\n\nopen the window\n",
        )
        .await
        .unwrap();
        tokio::fs::write(examples.join("notes.txt"), "ignored").await.unwrap();

        let loaded = SkillLoader::new().load_examples(temp_dir.path()).await;
        assert_eq!(loaded, vec!["turn on the AC", "set 22 degrees", "open the window"]);
    }

    #[tokio::test]
    async fn test_discover_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let report = SkillLoader::new()
            .discover(&temp_dir.path().join("nope"))
            .await
            .unwrap();
        assert!(report.skills.is_empty());
    }
}
