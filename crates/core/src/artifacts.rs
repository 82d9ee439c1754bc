//! # Artifact Writer
//!
//! Materializes a finished run on disk: per-phase JSON snapshots while the
//! pipeline runs, then the final project tree from the integration output.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::project::{FinalProject, IntegrationOutput};

const DEFAULT_ENTRY_POINT: &str = "main.py";

pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Directory a run's files land in.
    pub fn project_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("project_{run_id}"))
    }

    /// Save one phase's payload as pretty JSON.
    pub fn write_phase_snapshot(
        &self,
        run_id: &str,
        seq: usize,
        phase: &str,
        data: &serde_json::Value,
    ) -> Result<PathBuf> {
        let dir = self.project_dir(run_id).join("phases");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(format!("{seq:02}_{phase}.json"));
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write the final project tree and return its manifest.
    pub fn write_final(
        &self,
        run_id: &str,
        integration: &IntegrationOutput,
    ) -> Result<FinalProject> {
        let dir = self.project_dir(run_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut files_created = Vec::new();

        if let Some(main_file) = &integration.main_file {
            let entry = integration
                .entry_point
                .as_deref()
                .filter(|name| is_safe_relative(name))
                .unwrap_or(DEFAULT_ENTRY_POINT);
            write_file(&dir, entry, main_file)?;
            files_created.push(entry.to_string());
        }

        if let Some(documentation) = &integration.documentation {
            write_file(&dir, "README.md", documentation)?;
            files_created.push("README.md".to_string());
        }

        if !integration.dependencies.is_empty() {
            let manifest = integration.dependencies.join("\n");
            write_file(&dir, "requirements.txt", &manifest)?;
            files_created.push("requirements.txt".to_string());
        }

        for (name, contents) in &integration.project_structure {
            if !is_safe_relative(name) {
                tracing::warn!(file = %name, "skipping unsafe path in project structure");
                continue;
            }
            if contents.trim().is_empty() {
                continue;
            }
            write_file(&dir, name, contents)?;
            files_created.push(name.clone());
        }

        let instructions = if integration.build_commands.is_empty() {
            vec![format!(
                "python {}",
                integration
                    .entry_point
                    .as_deref()
                    .unwrap_or(DEFAULT_ENTRY_POINT)
            )]
        } else {
            integration.build_commands.clone()
        };

        Ok(FinalProject {
            total_files: files_created.len(),
            files_created,
            project_dir: dir.display().to_string(),
            instructions,
        })
    }
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory for {name}"))?;
    }
    std::fs::write(&path, contents).with_context(|| format!("Failed to write {name}"))
}

/// Relative, no parent-dir escapes, no drive prefixes.
fn is_safe_relative(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
