use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::entities::{ProgramId, TrackedProgram};

pub const REGISTRY_FILE: &str = "programs.json";

/// On-disk shape of the registry. `next_id` only ever grows, so removing a
/// program never frees its id for reuse.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    next_id: u32,
    programs: Vec<TrackedProgram>,
}

/// The list of programs the user asked to track, kept as one json document
/// in the application directory. The cli mutates it; the daemon only reads.
pub struct ProgramRegistry {
    path: PathBuf,
}

impl ProgramRegistry {
    pub fn new(app_dir: &Path) -> Self {
        Self {
            path: app_dir.join(REGISTRY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RegistryDocument> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RegistryDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn programs(&self) -> Result<Vec<TrackedProgram>> {
        Ok(self.load()?.programs)
    }

    pub fn add(
        &self,
        name: &str,
        process_name: &str,
        location: Option<PathBuf>,
        added_at: DateTime<Utc>,
    ) -> Result<TrackedProgram> {
        let mut doc = self.load()?;
        if doc.programs.iter().any(|p| p.name == name) {
            bail!("A program named {name:?} is already registered");
        }

        let program = TrackedProgram {
            id: ProgramId(doc.next_id),
            name: name.to_string(),
            process_name: process_name.to_string(),
            location,
            added_at,
        };
        doc.next_id += 1;
        doc.programs.push(program.clone());
        self.store(&doc)?;
        info!("Registered program {} as {}", program.name, program.id);
        Ok(program)
    }

    pub fn remove(&self, name: &str) -> Result<TrackedProgram> {
        let mut doc = self.load()?;
        let Some(position) = doc.programs.iter().position(|p| p.name == name) else {
            bail!("No program named {name:?} is registered");
        };
        let removed = doc.programs.remove(position);
        self.store(&doc)?;
        info!("Removed program {} ({})", removed.name, removed.id);
        Ok(removed)
    }

    fn store(&self, doc: &RegistryDocument) -> Result<()> {
        // Write-then-rename so the daemon never observes a half-written
        // document.
        let staged = self.path.with_extension("tmp");
        fs::write(&staged, serde_json::to_string_pretty(doc)?)?;
        fs::rename(&staged, &self.path)?;
        Ok(())
    }
}

/// Daemon-side view of the registry. Reloads the document when the file's
/// modification time changes, so `timekeep add` takes effect without a
/// daemon restart.
pub struct RegistryWatcher {
    registry: ProgramRegistry,
    seen_mtime: Option<SystemTime>,
    cached: Vec<TrackedProgram>,
}

impl RegistryWatcher {
    pub fn new(registry: ProgramRegistry) -> Self {
        let mut watcher = Self {
            registry,
            seen_mtime: None,
            cached: vec![],
        };
        watcher.reload();
        watcher
    }

    pub fn current(&mut self) -> &[TrackedProgram] {
        let mtime = fs::metadata(self.registry.path())
            .and_then(|m| m.modified())
            .ok();
        if mtime != self.seen_mtime {
            self.reload();
        }
        &self.cached
    }

    fn reload(&mut self) {
        let mtime = fs::metadata(self.registry.path())
            .and_then(|m| m.modified())
            .ok();
        match self.registry.programs() {
            Ok(programs) => {
                info!("Loaded {} tracked programs", programs.len());
                self.cached = programs;
                self.seen_mtime = mtime;
            }
            Err(e) => {
                // Keep the previous snapshot and retry next tick. Likely a
                // write races with us even with the rename dance off.
                warn!("Failed to reload program registry {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::entities::ProgramId;

    use super::{ProgramRegistry, RegistryWatcher};

    fn added_at() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000, 0).unwrap()
    }

    #[test]
    fn add_and_list_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let registry = ProgramRegistry::new(dir.path());

        assert!(registry.programs()?.is_empty());

        let firefox = registry.add("Firefox", "firefox", None, added_at())?;
        let code = registry.add("VS Code", "code", Some("/usr/bin/code".into()), added_at())?;
        assert_eq!(firefox.id, ProgramId(0));
        assert_eq!(code.id, ProgramId(1));

        let listed = registry.programs()?;
        assert_eq!(listed, vec![firefox, code]);
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let registry = ProgramRegistry::new(dir.path());

        registry.add("Firefox", "firefox", None, added_at())?;
        assert!(registry.add("Firefox", "firefox-esr", None, added_at()).is_err());
        assert_eq!(registry.programs()?.len(), 1);
        Ok(())
    }

    #[test]
    fn removed_ids_are_not_reused() -> Result<()> {
        let dir = tempdir()?;
        let registry = ProgramRegistry::new(dir.path());

        registry.add("Firefox", "firefox", None, added_at())?;
        registry.remove("Firefox")?;
        let readded = registry.add("Firefox", "firefox", None, added_at())?;
        assert_eq!(readded.id, ProgramId(1));
        Ok(())
    }

    #[test]
    fn remove_unknown_fails() -> Result<()> {
        let dir = tempdir()?;
        let registry = ProgramRegistry::new(dir.path());
        assert!(registry.remove("Firefox").is_err());
        Ok(())
    }

    #[test]
    fn watcher_picks_up_a_new_registry_file() -> Result<()> {
        let dir = tempdir()?;
        let mut watcher = RegistryWatcher::new(ProgramRegistry::new(dir.path()));
        assert!(watcher.current().is_empty());

        let registry = ProgramRegistry::new(dir.path());
        registry.add("Firefox", "firefox", None, added_at())?;

        assert_eq!(watcher.current().len(), 1);
        Ok(())
    }

    #[test]
    fn watcher_reloads_when_marked_stale() -> Result<()> {
        let dir = tempdir()?;
        let registry = ProgramRegistry::new(dir.path());
        registry.add("Firefox", "firefox", None, added_at())?;

        let mut watcher = RegistryWatcher::new(ProgramRegistry::new(dir.path()));
        assert_eq!(watcher.current().len(), 1);

        registry.add("VS Code", "code", None, added_at())?;
        watcher.seen_mtime = None;
        assert_eq!(watcher.current().len(), 2);
        Ok(())
    }
}
