//! Client for the Replicate predictions API.

use crate::config::ModelInput;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Starting | Self::Processing)
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub urls: PredictionUrls,
}

impl Prediction {
    /// Image URLs of a finished prediction. `output` is either a list or a single URL.
    pub fn output_urls(&self) -> Result<Vec<String>> {
        let urls: Vec<String> = match &self.output {
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Value::String(url) => vec![url.clone()],
            _ => Vec::new(),
        };
        if urls.is_empty() {
            bail!("No output received from API");
        }
        Ok(urls)
    }
}

pub struct ReplicateClient {
    base_url: String,
    token: String,
    timeout: Duration,
    client: Client,
}

impl ReplicateClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
            client: Client::new(),
        }
    }

    pub async fn create_prediction(
        &self,
        model: &str,
        prompt: &str,
        input: &ModelInput,
    ) -> Result<Prediction> {
        let url = format!("{}/models/{}/predictions", self.base_url, model);
        let mut input = serde_json::to_value(input)?;
        input["prompt"] = json!(prompt);
        let payload = json!({ "input": input });

        info!("Sending prediction request to model {}", model);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .context("Replicate rejected the prediction request")?;

        let prediction: Prediction = response
            .json()
            .await
            .context("Failed to parse prediction response")?;
        debug!("Prediction {} is {}", prediction.id, prediction.status);
        Ok(prediction)
    }

    pub async fn get_prediction(&self, url: &str) -> Result<Prediction> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .context("Replicate rejected the prediction poll")?;
        response
            .json()
            .await
            .context("Failed to parse prediction response")
    }

    /// Polls until the prediction reaches a terminal status; failures become errors.
    pub async fn wait_for(
        &self,
        prediction: Prediction,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<Prediction> {
        let mut current = prediction;
        let mut polls = 0u32;
        while !current.status.is_terminal() {
            if polls >= max_polls {
                bail!(
                    "Prediction {} still {} after {} polls",
                    current.id,
                    current.status,
                    polls
                );
            }
            let url = current
                .urls
                .get
                .clone()
                .with_context(|| format!("Prediction {} has no polling URL", current.id))?;
            tokio::time::sleep(poll_interval).await;
            current = self.get_prediction(&url).await?;
            polls += 1;
            debug!("Prediction {} is {} (poll {})", current.id, current.status, polls);
        }

        match current.status {
            PredictionStatus::Succeeded => Ok(current),
            status => {
                let reason = current.error.as_deref().unwrap_or("no error message");
                warn!("Prediction {} ended as {}: {}", current.id, status, reason);
                bail!("Prediction {} {}: {}", current.id, status, reason)
            }
        }
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!("Downloading {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to download image: {}", url))?
            .error_for_status()
            .with_context(|| format!("Failed to download image: {}", url))?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    fn client(server: &mockito::ServerGuard) -> ReplicateClient {
        ReplicateClient::new(&server.url(), "r8_test", Duration::from_secs(5))
    }

    fn prediction(body: Value) -> Prediction {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn create_prediction_sends_prompt_and_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/black-forest-labs/flux-schnell/predictions")
            .match_header("authorization", "Bearer r8_test")
            .match_header("prefer", "wait")
            .match_body(Matcher::PartialJson(json!({
                "input": {
                    "prompt": "a wood prompt",
                    "go_fast": true,
                    "output_format": "webp",
                    "num_inference_steps": 4
                }
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "p1", "status": "succeeded", "output": ["https://img/1.webp"]}"#)
            .create_async()
            .await;

        let result = client(&server)
            .create_prediction(
                "black-forest-labs/flux-schnell",
                "a wood prompt",
                &ModelInput::default(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, PredictionStatus::Succeeded);
        assert_eq!(result.output_urls().unwrap(), vec!["https://img/1.webp"]);
    }

    #[tokio::test]
    async fn create_prediction_fails_on_401() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server)
            .create_prediction("owner/model", "p", &ModelInput::default())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(format!("{err:#}").contains("401"));
    }

    #[tokio::test]
    async fn wait_for_polls_until_succeeded() {
        let mut server = mockito::Server::new_async().await;
        let get_url = format!("{}/predictions/p2", server.url());
        let mock = server
            .mock("GET", "/predictions/p2")
            .with_status(200)
            .with_body(r#"{"id": "p2", "status": "succeeded", "output": "https://img/2.webp"}"#)
            .expect(1)
            .create_async()
            .await;

        let pending = prediction(json!({
            "id": "p2",
            "status": "processing",
            "urls": { "get": get_url }
        }));
        let done = client(&server)
            .wait_for(pending, Duration::from_millis(1), 5)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(done.output_urls().unwrap(), vec!["https://img/2.webp"]);
    }

    #[tokio::test]
    async fn wait_for_reports_failed_prediction() {
        let server = mockito::Server::new_async().await;
        let failed = prediction(json!({
            "id": "p3",
            "status": "failed",
            "error": "NSFW content detected"
        }));

        let err = client(&server)
            .wait_for(failed, Duration::from_millis(1), 5)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NSFW content detected"));
    }

    #[tokio::test]
    async fn wait_for_gives_up_after_max_polls() {
        let mut server = mockito::Server::new_async().await;
        let get_url = format!("{}/predictions/p4", server.url());
        let body = json!({
            "id": "p4",
            "status": "starting",
            "urls": { "get": get_url }
        });
        let mock = server
            .mock("GET", "/predictions/p4")
            .with_status(200)
            .with_body(body.to_string())
            .expect(2)
            .create_async()
            .await;

        let err = client(&server)
            .wait_for(prediction(body), Duration::from_millis(1), 2)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("after 2 polls"));
    }

    #[tokio::test]
    async fn unrecognised_status_ends_waiting_with_error() {
        let server = mockito::Server::new_async().await;
        let odd = prediction(json!({"id": "p5", "status": "archived"}));
        assert_eq!(odd.status, PredictionStatus::Unknown);

        let err = client(&server)
            .wait_for(odd, Duration::from_millis(1), 5)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("p5 unknown"));
    }

    #[test]
    fn empty_output_is_an_error() {
        for output in [json!(null), json!([])] {
            let p = prediction(json!({"id": "p", "status": "succeeded", "output": output}));
            assert_eq!(
                p.output_urls().unwrap_err().to_string(),
                "No output received from API"
            );
        }
    }

    #[tokio::test]
    async fn download_returns_body_bytes() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/img.webp")
            .with_status(200)
            .with_body(b"RIFF....WEBP")
            .create_async()
            .await;

        let bytes = client(&server)
            .download(&format!("{}/img.webp", server.url()))
            .await
            .unwrap();
        assert_eq!(bytes, b"RIFF....WEBP".to_vec());
    }

    #[tokio::test]
    async fn download_fails_on_404() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing.webp")
            .with_status(404)
            .create_async()
            .await;

        let result = client(&server)
            .download(&format!("{}/missing.webp", server.url()))
            .await;
        assert!(result.is_err());
    }
}
