//! Writing generated textures to disk.
//! - Builds `brush_texture_<slug>.<format>` names from free-form texture text
//! - Creates the output directory on demand and overwrites existing files

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").expect("valid WHITESPACE_RE");
    static ref UNSAFE_CHARS_RE: Regex =
        Regex::new(r"[^A-Za-z0-9_-]").expect("valid UNSAFE_CHARS_RE");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTexture {
    pub path: PathBuf,
    pub source_url: String,
    pub bytes: usize,
}

fn slugify(texture: &str) -> String {
    let underscored = WHITESPACE_RE.replace_all(texture.trim(), "_");
    let slug = UNSAFE_CHARS_RE.replace_all(&underscored, "");
    if slug.is_empty() {
        "texture".to_string()
    } else {
        slug.into_owned()
    }
}

/// File name for output number `index` of a texture. Only the first output keeps the bare name.
pub fn texture_file_name(texture: &str, index: usize, format: &str) -> String {
    let slug = slugify(texture);
    let format = format.trim_start_matches('.');
    if index == 0 {
        format!("brush_texture_{}.{}", slug, format)
    } else {
        format!("brush_texture_{}_{}.{}", slug, index, format)
    }
}

pub async fn save_texture(
    dir: &Path,
    file_name: &str,
    source_url: &str,
    bytes: &[u8],
) -> Result<SavedTexture> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let path = dir.join(file_name);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        debug!("Replacing existing texture: {}", path.display());
    }
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write texture: {}", path.display()))?;
    info!("Texture saved to: {}", path.display());

    Ok(SavedTexture {
        path,
        source_url: source_url.to_string(),
        bytes: bytes.len(),
    })
}
