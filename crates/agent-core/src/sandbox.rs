//! Sandbox Accessor
//!
//! Resolves tool-supplied relative paths against a single root directory and
//! refuses anything that lands outside it. `..` segments, absolute overrides
//! and symlinks pointing out of the root are all reported as
//! [`SandboxError::OutsideRoot`].
//!
//! The read and execute helpers are built on top of [`Sandbox::resolve`] and
//! never raise on a failing subprocess: exit code and output come back as an
//! [`ExecReport`].

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Sandbox error types
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Cannot access \"{path}\" as it is outside the permitted working directory")]
    OutsideRoot { path: String },

    #[error("\"{0}\" does not exist")]
    NotFound(String),

    #[error("\"{0}\" is not a regular file")]
    NotAFile(String),

    #[error("\"{0}\" is not a directory")]
    NotADirectory(String),

    #[error("\"{path}\" is not an allowed executable (expected .{expected})")]
    UnsupportedType { path: String, expected: String },

    #[error("Execution timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

/// Dangling links followed before a path is refused
const MAX_LINK_HOPS: usize = 40;

/// Limits applied by the read and execute helpers
#[derive(Clone, Debug)]
pub struct SandboxLimits {
    /// Maximum characters returned by [`Sandbox::read_text`]
    pub max_chars: usize,

    /// Wall-clock limit for [`Sandbox::run`]
    pub exec_timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_chars: 10_000,
            exec_timeout: Duration::from_secs(30),
        }
    }
}

/// Captured result of a sandboxed subprocess
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecReport {
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Render as the single text block handed back to the backend
    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        match self.exit_code {
            Some(0) => {}
            Some(code) => lines.push(format!("Process exited with code {code}")),
            None => lines.push("Process terminated by signal".to_string()),
        }

        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            lines.push(format!("STDOUT: {stdout}"));
        }

        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            lines.push(format!("STDERR: {stderr}"));
        }

        if lines.is_empty() {
            lines.push("No output produced".to_string());
        }

        lines.join("\n")
    }
}

/// Filesystem/process accessor confined to one root directory
#[derive(Clone, Debug)]
pub struct Sandbox {
    root: PathBuf,
    limits: SandboxLimits,
}

impl Sandbox {
    /// Open a sandbox rooted at `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> SandboxResult<Self> {
        Self::with_limits(root, SandboxLimits::default())
    }

    pub fn with_limits(root: impl AsRef<Path>, limits: SandboxLimits) -> SandboxResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SandboxError::NotFound(root.display().to_string()),
            _ => SandboxError::Io(e),
        })?;
        Ok(Self { root, limits })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Resolve `relative` against the root.
    ///
    /// The target does not need to exist. Its deepest existing ancestor is
    /// canonicalized (following symlinks) and the remaining components are
    /// appended, then the result must have the canonical root as a prefix.
    /// A dangling symlink among the missing components is followed to its
    /// target, so writing to the returned path never goes through a link.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> SandboxResult<PathBuf> {
        let relative = relative.as_ref();
        let denied = || SandboxError::OutsideRoot {
            path: relative.display().to_string(),
        };

        let mut pending = normalize(&self.root.join(relative)).ok_or_else(denied)?;
        let mut hops = 0;

        let resolved = 'resolve: loop {
            let mut existing = pending.as_path();
            let mut tail = Vec::new();
            loop {
                match existing.canonicalize() {
                    Ok(mut path) => {
                        path.extend(tail.iter().rev());
                        break 'resolve path;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        if let Ok(target) = std::fs::read_link(existing) {
                            hops += 1;
                            if hops > MAX_LINK_HOPS {
                                return Err(denied());
                            }
                            let parent = existing.parent().ok_or_else(denied)?;
                            let mut next = parent.join(target);
                            next.extend(tail.iter().rev());
                            pending = normalize(&next).ok_or_else(denied)?;
                            continue 'resolve;
                        }
                        let Some(name) = existing.file_name() else {
                            return Err(denied());
                        };
                        tail.push(name.to_os_string());
                        existing = existing.parent().ok_or_else(denied)?;
                    }
                    Err(e) => return Err(SandboxError::Io(e)),
                }
            }
        };

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(denied())
        }
    }

    /// Read a text file, capped at `max_chars` characters.
    ///
    /// Invalid UTF-8 is replaced. When the file holds more than the cap a
    /// truncation marker naming the file is appended.
    pub fn read_text(&self, relative: &str) -> SandboxResult<String> {
        let path = self.resolve(relative)?;
        if !path.exists() {
            return Err(SandboxError::NotFound(relative.to_string()));
        }
        if !path.is_file() {
            return Err(SandboxError::NotAFile(relative.to_string()));
        }

        let max = self.limits.max_chars;
        let mut bytes = Vec::new();
        // Four bytes per char is the UTF-8 worst case; one extra tells us more exists.
        std::fs::File::open(&path)?
            .take((max as u64 + 1) * 4)
            .read_to_end(&mut bytes)?;

        let text = String::from_utf8_lossy(&bytes);
        let mut chars = text.chars();
        let mut content: String = chars.by_ref().take(max).collect();
        let more = chars.next().is_some()
            || std::fs::metadata(&path)?.len() > bytes.len() as u64;

        if more {
            content.push_str(&format!(
                "\n[...File \"{relative}\" truncated at {max} characters]"
            ));
        }
        Ok(content)
    }

    /// Run `program` with the script at `relative` as its first argument.
    ///
    /// Only scripts whose extension is `extension` are allowed. The working
    /// directory is the sandbox root; the child is killed when the timeout
    /// expires.
    pub async fn run(
        &self,
        program: &str,
        relative: &str,
        extension: &str,
        args: &[String],
    ) -> SandboxResult<ExecReport> {
        let path = self.resolve(relative)?;
        if !path.is_file() {
            return Err(SandboxError::NotFound(relative.to_string()));
        }
        if path.extension() != Some(OsStr::new(extension)) {
            return Err(SandboxError::UnsupportedType {
                path: relative.to_string(),
                expected: extension.to_string(),
            });
        }

        let mut command = Command::new(program);
        command.arg(&path).args(args);
        self.exec(command).await
    }

    /// Run an arbitrary command with the sandbox root as working directory
    /// under the same timeout and capture rules as [`Sandbox::run`].
    pub async fn exec(&self, mut command: Command) -> SandboxResult<ExecReport> {
        command
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = self.limits.exec_timeout;
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| SandboxError::Timeout(timeout.as_secs()))??;

        Ok(ExecReport {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Lexically fold `.` and `..`; `None` if `..` climbs above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    Some(out)
}
