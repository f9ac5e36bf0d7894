//! Sandboxed execution surface
//!
//! Filesystem and process access for tools runs through [`SandboxService`];
//! the coordinator never touches `std::fs` or spawns processes directly.
//! [`LocalSandbox`] confines all paths to a working directory. Path escapes
//! are a [`SwarmError::SandboxDenied`], not an IO error, so the gate log can
//! distinguish policy violations from genuine failures.

use crate::error::{Result, SwarmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Outcome of a sandboxed command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

/// One directory listing row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
}

/// Sandbox health as reported to session updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "detail")]
pub enum SandboxStatus {
    Ready,
    Degraded(String),
}

#[async_trait]
pub trait SandboxService: Send + Sync {
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput>;

    async fn read_file(&self, path: &str) -> Result<String>;
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>>;
    async fn move_path(&self, from: &str, to: &str) -> Result<()>;
    async fn delete_path(&self, path: &str) -> Result<()>;

    /// Fetch a URL and return its body text, truncated to the output cap.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String>;

    async fn status(&self) -> SandboxStatus;
}

/// Sandbox running processes on the host, confined to `workdir`
pub struct LocalSandbox {
    workdir: PathBuf,
    http_client: reqwest::Client,
}

impl LocalSandbox {
    pub fn new(workdir: impl Into<PathBuf>) -> Result<Self> {
        let workdir = workdir.into();
        let http_client = reqwest::Client::builder()
            .user_agent("swarmgate/0.3")
            .build()
            .map_err(|e| SwarmError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(LocalSandbox {
            workdir,
            http_client,
        })
    }

    /// Resolve a tool-supplied path inside the workdir. Rejects absolute
    /// paths and any `..` that would climb above the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(SwarmError::SandboxDenied {
                reason: format!("absolute path not permitted: {}", path),
            });
        }

        let mut resolved = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(SwarmError::SandboxDenied {
                            reason: format!("path escapes the working directory: {}", path),
                        });
                    }
                }
                _ => {
                    return Err(SwarmError::SandboxDenied {
                        reason: format!("unsupported path component in: {}", path),
                    })
                }
            }
        }
        Ok(self.workdir.join(resolved))
    }
}

fn truncate_output(mut text: String) -> (String, bool) {
    if text.len() <= MAX_OUTPUT_BYTES {
        return (text, false);
    }
    let mut cut = MAX_OUTPUT_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    (text, true)
}

#[async_trait]
impl SandboxService for LocalSandbox {
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .current_dir(&self.workdir)
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| SwarmError::ToolExecutionFailed {
                tool_name: program.to_string(),
                error: format!("timed out after {:?}", timeout),
            })??;

        let (stdout, out_trunc) = truncate_output(String::from_utf8_lossy(&output.stdout).into_owned());
        let (stderr, err_trunc) = truncate_output(String::from_utf8_lossy(&output.stderr).into_owned());

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
            truncated: out_trunc || err_trunc,
        })
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        let content = tokio::fs::read_to_string(&resolved).await?;
        Ok(content)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content).await?;
        Ok(())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let resolved = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&resolved).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size_bytes: metadata.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn move_path(&self, from: &str, to: &str) -> Result<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&resolved).await?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&resolved).await?;
        } else {
            tokio::fs::remove_file(&resolved).await?;
        }
        Ok(())
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SwarmError::Http(e.to_string()))?;
        let body = response.text().await?;
        let (body, _) = truncate_output(body);
        Ok(body)
    }

    async fn status(&self) -> SandboxStatus {
        match tokio::fs::metadata(&self.workdir).await {
            Ok(m) if m.is_dir() => SandboxStatus::Ready,
            Ok(_) => SandboxStatus::Degraded("workdir is not a directory".to_string()),
            Err(e) => SandboxStatus::Degraded(format!("workdir unavailable: {}", e)),
        }
    }
}
