use std::path::PathBuf;
use tokio::fs;

use crate::contract::{InstructionsStore, ProviderError};
use crate::patch::PatchInstructions;
use crate::subdir::Subdir;

pub const INSTRUCTIONS_FILE_NAME: &str = "patch_instructions.json";

/// Writes `<base_dir>/<subdir>/patch_instructions.json`.
pub struct FileInstructionsStore {
    base_dir: PathBuf,
}

impl FileInstructionsStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn instructions_path(&self, subdir: Subdir) -> PathBuf {
        self.base_dir.join(subdir.as_str()).join(INSTRUCTIONS_FILE_NAME)
    }
}

/// Stable rendering: sorted keys, two-space indent, trailing newline.
pub fn render_instructions(instructions: &PatchInstructions) -> Result<String, serde_json::Error> {
    let mut body = serde_json::to_string_pretty(instructions)?;
    body.push('\n');
    Ok(body)
}

#[async_trait::async_trait]
impl InstructionsStore for FileInstructionsStore {
    async fn store(
        &self,
        subdir: Subdir,
        instructions: &PatchInstructions,
    ) -> Result<PathBuf, ProviderError> {
        let path = self.instructions_path(subdir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                tracing::error!(%subdir, path = %parent.display(), error = ?e, "Failed to create subdir output directory");
                e
            })?;
        }
        let body = render_instructions(instructions)?;
        fs::write(&path, body).await.map_err(|e| {
            tracing::error!(%subdir, path = %path.display(), error = ?e, "Failed to write patch instructions");
            e
        })?;
        tracing::info!(%subdir, path = %path.display(), "Wrote patch instructions");
        Ok(path)
    }
}
