//! Skill Registry
//!
//! Progressive disclosure over a skills directory:
//! 1. Metadata: loaded eagerly by [`SkillRegistry::scan`]
//! 2. Instructions (`SKILL.md`): loaded on first request, then cached
//! 3. Script catalogs (`<scriptsDir>/scripts.yaml`): loaded on first request, then cached
//!
//! Cached layers are handed out as `Arc`s, so repeated reads return the same
//! allocation until the caches are cleared or the directory is rescanned.

use super::loader::{DiscoveryReport, SkillLoader};
use super::script_config::{check_relative_path, ScriptCatalog, ScriptConfigLoader};
use super::types::{Domain, SkillDescriptor, SkillInstructions};
use moka::future::Cache;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of one scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub loaded: usize,
    pub skipped: Vec<(PathBuf, String)>,
    pub disabled: Vec<String>,
    /// Ids declared by more than one directory; the later one won
    pub overwritten: Vec<String>,
}

#[derive(Debug, Clone)]
struct RegisteredSkill {
    descriptor: SkillDescriptor,
    dir: PathBuf,
}

#[derive(Debug, Default)]
struct RegistryState {
    root: Option<PathBuf>,
    /// Ids sorted by priority
    order: Vec<String>,
    skills: HashMap<String, RegisteredSkill>,
    domains: BTreeMap<Domain, Vec<String>>,
}

impl RegistryState {
    fn insert(&mut self, skill: RegisteredSkill) -> bool {
        let id = skill.descriptor.id.clone();
        let replaced = self.skills.insert(id.clone(), skill).is_some();
        if replaced {
            warn!("Overwriting existing skill: {}", id);
            self.order.retain(|existing| existing != &id);
        }
        self.order.push(id);
        replaced
    }

    /// Stable sort by priority, then rebuild the domain index
    fn reindex(&mut self) {
        let skills = &self.skills;
        self.order
            .sort_by_key(|id| skills.get(id).map(|s| s.descriptor.priority).unwrap_or(i32::MAX));

        self.domains.clear();
        for id in &self.order {
            if let Some(skill) = self.skills.get(id) {
                self.domains
                    .entry(skill.descriptor.domain)
                    .or_default()
                    .push(id.clone());
            }
        }
    }
}

/// File-backed skill registry
pub struct SkillRegistry {
    loader: SkillLoader,
    state: RwLock<RegistryState>,
    instructions: Cache<String, Option<Arc<SkillInstructions>>>,
    catalogs: Cache<String, Option<Arc<ScriptCatalog>>>,
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            loader: SkillLoader::new(),
            state: RwLock::new(RegistryState::default()),
            instructions: Cache::builder().build(),
            catalogs: Cache::builder().build(),
        }
    }

    /// Scan a skills directory and replace the current snapshot.
    ///
    /// Never fails: invalid skills are skipped and listed in the report.
    pub async fn scan(&self, directory: impl AsRef<Path>) -> ScanReport {
        let directory = directory.as_ref();
        let discovered = match self.loader.discover(directory).await {
            Ok(d) => d,
            Err(e) => {
                warn!("Failed to scan skills directory {}: {}", directory.display(), e);
                DiscoveryReport::default()
            }
        };

        let mut state = RegistryState {
            root: Some(directory.to_path_buf()),
            ..Default::default()
        };
        let mut report = ScanReport {
            skipped: discovered.skipped,
            disabled: discovered.disabled,
            ..Default::default()
        };
        for skill in discovered.skills {
            let id = skill.descriptor.id.clone();
            if state.insert(RegisteredSkill {
                descriptor: skill.descriptor,
                dir: skill.dir,
            }) {
                report.overwritten.push(id);
            }
        }
        state.reindex();
        report.loaded = state.skills.len();

        for id in &state.order {
            if let Some(skill) = state.skills.get(id) {
                debug!(
                    "Registered skill: {} (domain: {}, priority: {})",
                    id, skill.descriptor.domain, skill.descriptor.priority
                );
            }
        }

        *self.state.write() = state;
        self.clear_caches();

        info!("Loaded {} skills from {}", report.loaded, directory.display());
        report
    }

    /// Register one skill by hand; an existing id is overwritten
    pub async fn register(&self, descriptor: SkillDescriptor, dir: impl Into<PathBuf>) {
        let id = descriptor.id.clone();
        {
            let mut state = self.state.write();
            state.insert(RegisteredSkill {
                descriptor,
                dir: dir.into(),
            });
            state.reindex();
        }
        self.instructions.invalidate(&id).await;
        self.catalogs.invalidate(&id).await;
        info!("Registered skill: {}", id);
    }

    /// All skill metadata in priority order
    pub fn get_all_metadata(&self) -> Vec<SkillDescriptor> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.skills.get(id))
            .map(|s| s.descriptor.clone())
            .collect()
    }

    pub fn get_metadata(&self, skill_id: &str) -> Option<SkillDescriptor> {
        self.state
            .read()
            .skills
            .get(skill_id)
            .map(|s| s.descriptor.clone())
    }

    pub fn skill_dir(&self, skill_id: &str) -> Option<PathBuf> {
        self.state.read().skills.get(skill_id).map(|s| s.dir.clone())
    }

    /// Root of the last scan
    pub fn skills_root(&self) -> Option<PathBuf> {
        self.state.read().root.clone()
    }

    /// Second layer: `SKILL.md`, read at most once per skill
    pub async fn load_instructions(&self, skill_id: &str) -> Option<Arc<SkillInstructions>> {
        let dir = self.skill_dir(skill_id)?;
        let loader = self.loader.clone();
        let id = skill_id.to_string();

        self.instructions
            .get_with(skill_id.to_string(), async move {
                match loader.read_instructions(&dir).await {
                    Ok(Some(instructions)) => {
                        debug!("Loaded instructions for {}", id);
                        Some(Arc::new(instructions))
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!("Failed to load instructions for {}: {}", id, e);
                        None
                    }
                }
            })
            .await
    }

    /// Example utterances from `examples/*.md`
    pub async fn load_examples(&self, skill_id: &str) -> Vec<String> {
        match self.skill_dir(skill_id) {
            Some(dir) => self.loader.load_examples(&dir).await,
            None => Vec::new(),
        }
    }

    /// Third layer: the skill's script catalog, read at most once per skill
    pub async fn script_catalog(&self, skill_id: &str) -> Option<Arc<ScriptCatalog>> {
        let (dir, scripts_dir) = {
            let state = self.state.read();
            let skill = state.skills.get(skill_id)?;
            (skill.dir.clone(), skill.descriptor.scripts_dir.clone()?)
        };
        let id = skill_id.to_string();

        self.catalogs
            .get_with(skill_id.to_string(), async move {
                if let Err(e) = check_relative_path(&scripts_dir) {
                    warn!("Ignoring scriptsDir of {}: {}", id, e);
                    return None;
                }
                let catalog = ScriptConfigLoader::new(dir.join(&scripts_dir)).load().await;
                for error in &catalog.errors {
                    warn!("Script catalog of {}: {}", id, error);
                }
                for warning in &catalog.warnings {
                    debug!("Script catalog of {}: {}", id, warning);
                }
                info!("Loaded {} scripts for {}", catalog.len(), id);
                Some(Arc::new(catalog))
            })
            .await
    }

    /// Capability listing for the intent recognition prompt
    pub fn get_capability_descriptions(&self, skill_ids: Option<&[&str]>) -> String {
        let state = self.state.read();
        let selected: Vec<&RegisteredSkill> = match skill_ids {
            Some(ids) => ids.iter().filter_map(|id| state.skills.get(*id)).collect(),
            None => state
                .order
                .iter()
                .filter_map(|id| state.skills.get(id))
                .collect(),
        };

        selected
            .into_iter()
            .map(|s| describe(&s.descriptor))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    pub fn get_skills_by_domain(&self, domain: Domain) -> Vec<SkillDescriptor> {
        let state = self.state.read();
        state
            .domains
            .get(&domain)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.skills.get(id))
                    .map(|s| s.descriptor.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn registered_domains(&self) -> Vec<Domain> {
        self.state.read().domains.keys().copied().collect()
    }

    pub fn has(&self, skill_id: &str) -> bool {
        self.state.read().skills.contains_key(skill_id)
    }

    pub fn size(&self) -> usize {
        self.state.read().skills.len()
    }

    /// Drop every skill and cached layer
    pub fn clear(&self) {
        *self.state.write() = RegistryState::default();
        self.clear_caches();
    }

    /// Forget cached instructions and script catalogs
    pub fn clear_caches(&self) {
        self.instructions.invalidate_all();
        self.catalogs.invalidate_all();
    }
}

fn describe(skill: &SkillDescriptor) -> String {
    let mut lines = vec![
        format!("### {} ({})", skill.id, skill.name),
        skill.description.clone(),
        String::new(),
    ];

    for cap in &skill.capabilities {
        lines.push(format!("- {}: {}", cap.name, cap.description));
        for slot in &cap.slots {
            let text = slot
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| slot.slot_type.as_str().to_string());
            let required = if slot.required { " (required)" } else { "" };
            lines.push(format!("  - {}: {}{}", slot.name, text, required));
        }
        if let Some(example) = cap.examples.first() {
            lines.push(format!("  Example: \"{}\"", example));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::types::{CapabilityDescriptor, SlotDescriptor};

    fn descriptor(id: &str, domain: Domain, priority: i32) -> SkillDescriptor {
        SkillDescriptor {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: format!("{} skill", id),
            domain,
            version: None,
            author: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
            capabilities: Vec::new(),
            priority,
            enabled: true,
            scripts_dir: None,
        }
    }

    #[test]
    fn test_describe_format() {
        let mut skill = descriptor("vehicle", Domain::VehicleControl, 1);
        skill.name = "Vehicle".to_string();
        skill.description = "Controls the car".to_string();
        skill.capabilities.push(
            CapabilityDescriptor::new("ac_control", "Air conditioning")
                .with_slot(SlotDescriptor::string("action", true).with_description("on or off"))
                .with_slot(SlotDescriptor::number("temperature", false))
                .with_example("turn on the AC"),
        );

        assert_eq!(
            describe(&skill),
            "### vehicle (Vehicle)\nControls the car\n\n- ac_control: Air conditioning\n  - action: on or off (required)\n  - temperature: number\n  Example: \"turn on the AC\""
        );
    }

    #[tokio::test]
    async fn test_register_orders_and_indexes() {
        let registry = SkillRegistry::new();
        registry.register(descriptor("chat", Domain::Chat, 200), "/tmp/chat").await;
        registry.register(descriptor("music", Domain::Music, 50), "/tmp/music").await;
        registry.register(descriptor("radio", Domain::Music, 10), "/tmp/radio").await;

        let ids: Vec<String> = registry.get_all_metadata().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["radio", "music", "chat"]);
        assert_eq!(registry.get_skills_by_domain(Domain::Music).len(), 2);
        assert_eq!(registry.registered_domains(), vec![Domain::Music, Domain::Chat]);

        registry.register(descriptor("chat", Domain::Navigation, 1), "/tmp/nav").await;
        assert_eq!(registry.size(), 3);
        assert_eq!(registry.get_metadata("chat").unwrap().domain, Domain::Navigation);
        assert!(registry.get_skills_by_domain(Domain::Chat).is_empty());

        let text = registry.get_capability_descriptions(Some(&["music", "missing"]));
        assert!(text.starts_with("### music (MUSIC)"));
        assert!(!text.contains("---"));

        registry.clear();
        assert_eq!(registry.size(), 0);
        assert!(!registry.has("music"));
    }
}
