//! External collaborators: workspace manifests, change sets, and task
//! declaration files.
//!
//! The core consumes these as opaque data providers; the implementations
//! here are thin glue over YAML files and the subprocess layer.

pub mod git;

pub use git::GitChangeProvider;

use crate::task::{TaskConfig, TaskDeclaration};
use crate::workspace::Workspace;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Supplies the workspace descriptor list for the current run.
#[async_trait]
pub trait ManifestProvider: Send + Sync {
    async fn load(&self) -> Result<Vec<Workspace>>;
}

/// Supplies the changed file paths for the current run.
#[async_trait]
pub trait ChangeProvider: Send + Sync {
    async fn changed_files(&self) -> Result<Vec<String>>;
}

/// Reads workspaces from a YAML file with a top-level `workspaces:` list.
pub struct YamlManifestProvider {
    path: PathBuf,
}

impl YamlManifestProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
struct ManifestFile {
    workspaces: Vec<Workspace>,
}

#[async_trait]
impl ManifestProvider for YamlManifestProvider {
    async fn load(&self) -> Result<Vec<Workspace>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read manifest file {:?}", self.path))?;
        let manifest: ManifestFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse manifest file {:?}", self.path))?;
        Ok(manifest.workspaces)
    }
}

/// Fixed change list, for tests and for `--changed-file` CLI overrides.
pub struct StaticChangeProvider {
    files: Vec<String>,
}

impl StaticChangeProvider {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ChangeProvider for StaticChangeProvider {
    async fn changed_files(&self) -> Result<Vec<String>> {
        Ok(self.files.clone())
    }
}

/// Load the task declaration file: a YAML map from lifecycle event name to
/// that event's configuration.
pub fn load_task_file(path: &Path) -> Result<BTreeMap<String, TaskDeclaration>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read task file {:?}", path))?;
    parse_task_file(&content)
}

pub fn parse_task_file(content: &str) -> Result<BTreeMap<String, TaskDeclaration>> {
    let configs: BTreeMap<String, TaskConfig> =
        serde_yaml::from_str(content).context("failed to parse task declarations")?;
    Ok(configs
        .into_iter()
        .map(|(event, config)| {
            let declaration = config.into_declaration(event.clone());
            (event, declaration)
        })
        .collect())
}
