//! Texture generation pipeline: prompt -> prediction -> download -> save.

use crate::{
    config::GeneratorConfig,
    prompt_builder::PromptTemplate,
    replicate_client::ReplicateClient,
    texture_store::{self, SavedTexture},
};
use anyhow::{bail, Context, Result};
use futures::future::try_join_all;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub struct TextureGenerator {
    config: GeneratorConfig,
    template: PromptTemplate,
    client: ReplicateClient,
}

impl TextureGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let template = match &config.template {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::builtin(),
        };
        let token = config.require_token()?;
        let client = ReplicateClient::new(
            &config.base_url,
            token,
            Duration::from_secs(config.timeout_s),
        );
        Ok(Self {
            config,
            template,
            client,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub async fn generate(&self, texture: &str) -> Result<Vec<SavedTexture>> {
        let texture = texture.trim();
        if texture.is_empty() {
            bail!("Please enter a texture description");
        }
        info!("Generating texture for '{}'", texture);

        // 1) Prompt
        let prompt = self.template.render(texture).map_err(|e| {
            error!("Failed to render prompt: {:#}", e);
            e
        })?;

        // 2) Prediction
        let prediction = self
            .client
            .create_prediction(&self.config.model, &prompt, &self.config.input)
            .await
            .context("Failed to generate texture")?;
        let prediction = self
            .client
            .wait_for(
                prediction,
                Duration::from_millis(self.config.poll_interval_ms),
                self.config.max_polls,
            )
            .await
            .context("Failed to generate texture")?;

        // 3) Download every output at once
        let urls = prediction.output_urls()?;
        info!("Prediction {} produced {} image(s)", prediction.id, urls.len());
        let images = try_join_all(urls.iter().map(|url| self.client.download(url))).await?;

        // 4) Save
        let mut saved = Vec::with_capacity(images.len());
        for (index, (url, bytes)) in urls.iter().zip(images).enumerate() {
            let name =
                texture_store::texture_file_name(texture, index, &self.config.input.output_format);
            saved.push(
                texture_store::save_texture(&self.config.output_dir, &name, url, &bytes).await?,
            );
        }
        Ok(saved)
    }
}
