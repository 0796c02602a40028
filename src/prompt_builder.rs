//! Texture prompt rendering.
//! - Built-in template: fixed text with the material name inserted verbatim
//! - Custom templates: Tera sources where the material is `{{ texture }}`

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use tera::{Context as TeraContext, Tera};
use tracing::{debug, info, warn};

/// Fixed text of the built-in template, split at each placeholder.
const TEXTURE_TEMPLATE: [&str; 3] = [
    "Studio overhead shot of a ",
    " surface in perfect 8K monochrome, captured with a professional ring light creating a smooth and gradual circular gradient falloff. The central 70% displays crystal-clear ",
    " details with a 10x10 visible pattern of elements. The texture transitions seamlessly to pure black at the edges with no white artifacts, no sharp falloff, and no visible edge lighting. The fade is soft and gradual, maintaining a natural and uninterrupted look for museum-grade material photography with extreme detail preservation.",
];

/// Number of positions where the value is inserted.
pub const PLACEHOLDER_COUNT: usize = TEXTURE_TEMPLATE.len() - 1;

const CUSTOM_TEMPLATE_NAME: &str = "texture_prompt";

lazy_static! {
    static ref TEXTURE_REFERENCE_RE: Regex =
        Regex::new(r"\{\{-?\s*texture\b").expect("valid TEXTURE_REFERENCE_RE");
}

/// Renders the built-in texture prompt for `value`.
///
/// Total over all strings: the value is copied into every placeholder as-is,
/// so `render(v).len() == fixed_text_len() + PLACEHOLDER_COUNT * v.len()`.
pub fn render(value: &str) -> String {
    TEXTURE_TEMPLATE.join(value)
}

/// Length of the built-in template with every placeholder left empty.
pub fn fixed_text_len() -> usize {
    TEXTURE_TEMPLATE.iter().map(|part| part.len()).sum()
}

/// Prompt source used by the generator.
pub enum PromptTemplate {
    Builtin,
    Custom(Box<Tera>),
}

impl PromptTemplate {
    pub fn builtin() -> Self {
        PromptTemplate::Builtin
    }

    pub fn from_source(source: &str) -> Result<Self> {
        if !TEXTURE_REFERENCE_RE.is_match(source) {
            warn!("Custom prompt template never references {{{{ texture }}}}; output will not vary");
        }

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]); // plain text prompt, not HTML
        tera.add_raw_template(CUSTOM_TEMPLATE_NAME, source)
            .context("Failed to compile custom prompt template")?;
        debug!("Compiled custom prompt template ({} bytes)", source.len());
        Ok(PromptTemplate::Custom(Box::new(tera)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
        let template = Self::from_source(&source)
            .with_context(|| format!("Invalid prompt template: {}", path.display()))?;
        info!("Loaded prompt template from {}", path.display());
        Ok(template)
    }

    pub fn render(&self, texture: &str) -> Result<String> {
        match self {
            PromptTemplate::Builtin => Ok(render(texture)),
            PromptTemplate::Custom(tera) => {
                let mut context = TeraContext::new();
                context.insert("texture", texture);
                tera.render(CUSTOM_TEMPLATE_NAME, &context)
                    .context("Failed to render custom prompt template")
            }
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}
