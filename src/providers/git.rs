//! Change provider backed by `git diff` against a base ref.

use super::ChangeProvider;
use crate::subprocess::{ProcessCommandBuilder, SubprocessManager};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct GitChangeProvider {
    subprocess: SubprocessManager,
    repo_root: PathBuf,
    base_ref: String,
}

impl GitChangeProvider {
    pub fn new(
        subprocess: SubprocessManager,
        repo_root: impl Into<PathBuf>,
        base_ref: impl Into<String>,
    ) -> Self {
        Self {
            subprocess,
            repo_root: repo_root.into(),
            base_ref: base_ref.into(),
        }
    }
}

#[async_trait]
impl ChangeProvider for GitChangeProvider {
    async fn changed_files(&self) -> Result<Vec<String>> {
        let command = ProcessCommandBuilder::new("git")
            .arg("diff")
            .arg("--name-only")
            .arg(format!("{}...HEAD", self.base_ref).as_str())
            .current_dir(&self.repo_root)
            .build();

        let output = self.subprocess.runner().run(command).await?;

        if !output.status.success() {
            return Err(anyhow!(
                "git diff against '{}' failed: {}",
                self.base_ref,
                output.stderr.trim()
            ));
        }

        let files: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        tracing::debug!(
            "git diff {}...HEAD reported {} changed files",
            self.base_ref,
            files.len()
        );

        Ok(files)
    }
}
