//! In-memory editor buffer. Never written back to disk.
//!
//! Two things change the buffer: the user, via `/edit` (an external editor on a
//! temporary copy) or `/reload` (re-reading the source file), and the assistant,
//! whose replies may carry a replacement.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const DEFAULT_CONTENT: &str = "# Write your code here\nprint(\"Hello, World!\")\n";
pub const DEFAULT_PATH: &str = "main.py";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorBuffer {
    pub content: String,
    pub path: String,
    /// File the buffer was seeded from, if any.
    pub source: Option<PathBuf>,
    /// Bumped on every change, by the user or the assistant.
    pub revision: u64,
}

impl Default for EditorBuffer {
    fn default() -> Self {
        Self {
            content: DEFAULT_CONTENT.to_string(),
            path: DEFAULT_PATH.to_string(),
            source: None,
            revision: 0,
        }
    }
}

impl EditorBuffer {
    /// Seed the buffer from a file on disk. `path_override` replaces the path
    /// reported to the assistant.
    pub fn load(file: &Path, path_override: Option<String>) -> Result<Self> {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        Ok(Self {
            content,
            path: path_override.unwrap_or_else(|| file.display().to_string()),
            source: Some(file.to_path_buf()),
            revision: 0,
        })
    }

    pub fn replace(&mut self, content: &str) {
        self.content = content.to_string();
        self.revision += 1;
    }

    /// Re-read the source file, discarding in-memory changes.
    pub fn reload(&mut self) -> Result<()> {
        let Some(source) = &self.source else {
            bail!("buffer was not loaded from a file");
        };
        let content = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        self.replace(&content);
        Ok(())
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    /// Extension of the reported path, for naming temporary copies.
    fn suffix(&self) -> String {
        Path::new(&self.path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }
}

/// `$VISUAL`, then `$EDITOR`, then `vi`.
pub fn editor_command() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "vi".to_string())
}

/// Open `buffer` in an external editor and return the edited text, or `None`
/// when the user left it unchanged. The editor command may carry arguments
/// (`code --wait`); the temporary file path is appended.
pub async fn edit_externally(editor: &str, buffer: &EditorBuffer) -> Result<Option<String>> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("no editor configured");
    };

    let mut file = tempfile::Builder::new()
        .prefix("pairpad-")
        .suffix(&buffer.suffix())
        .tempfile()
        .context("Failed to create temporary file")?;
    file.write_all(buffer.content.as_bytes())
        .context("Failed to write temporary file")?;
    file.flush()?;

    let status = tokio::process::Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()
        .await
        .with_context(|| format!("Failed to start editor `{program}`"))?;
    if !status.success() {
        bail!("editor exited with {status}");
    }

    let edited = std::fs::read_to_string(file.path()).context("Failed to read edited file")?;
    Ok((edited != buffer.content).then_some(edited))
}
