//! reqwest-backed collaborators

use super::{
    Collaborators, ContentRemover, ImageHost, PatchGenerator, PublishResponse, ResultFetcher,
    UpscaleRequest, UpscaleStatus, UpscaleSubmission, Upscaler,
};
use crate::config::{Credentials, PipelineConfig};
use crate::error::{Result, RetouchError};
use crate::types::{FocusPoint, ImageBuffer, MimeType};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const EDIT_SERVICE: &str = "generative edit";
const HOST_SERVICE: &str = "image host";
const UPSCALE_SERVICE: &str = "upscale";
const DOWNLOAD_SERVICE: &str = "result download";

/// Build the shared HTTP client
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("retouch-pipeline/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RetouchError::network_error("http", "Failed to create HTTP client", &e))
}

/// Wire every collaborator to its HTTP endpoint
pub fn collaborators(config: &PipelineConfig, credentials: &Credentials) -> Result<Collaborators> {
    let client = build_client(config.request_timeout())?;
    let endpoints = &config.endpoints;
    Ok(Collaborators::new(
        Arc::new(GenerativeEditClient::new(
            client.clone(),
            &endpoints.edit_url,
            &credentials.edit_api_key,
        )),
        Arc::new(ImageHostClient::new(
            client.clone(),
            &endpoints.host_url,
            &credentials.host_api_key,
        )),
        Arc::new(UpscaleApiClient::new(
            client.clone(),
            &endpoints.upscale_queue_url,
            &endpoints.upscale_status_url,
            &credentials.upscale_api_key,
        )),
        Arc::new(HttpResultFetcher::new(client)),
    ))
}

/// Turn a non-2xx response into `RemoteCall` carrying status and body text
async fn ensure_success(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(RetouchError::remote_call(service, format!("{} - {}", status, body)))
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(alias = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(alias = "mimeType")]
    mime_type: Option<String>,
    data: String,
}

/// Finish reasons that mean the service refused the content
const POLICY_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "IMAGE_SAFETY",
];

fn is_policy_stop(reason: &str) -> bool {
    POLICY_FINISH_REASONS.contains(&reason.trim().to_ascii_uppercase().as_str())
}

/// Pull the edited image out of a generate-content response
fn interpret_edit_response(response: GenerateResponse, fallback: MimeType) -> Result<ImageBuffer> {
    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        RetouchError::remote_call(EDIT_SERVICE, "No candidates received from the editing service")
    })?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    if let Some(inline) = parts.iter().find_map(|part| part.inline_data.as_ref()) {
        let mime = inline
            .mime_type
            .as_deref()
            .and_then(MimeType::from_mime_str)
            .unwrap_or(fallback);
        return ImageBuffer::from_base64(&inline.data, mime);
    }

    let refused = parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .any(|text| text.to_ascii_lowercase().contains("cannot directly manipulate"));
    if refused {
        return Err(RetouchError::content_policy(
            "The editing service cannot directly manipulate images.",
        ));
    }
    if let Some(reason) = candidate.finish_reason.filter(|r| r != "STOP") {
        let message = format!("AI generation stopped for reason: {}", reason);
        return Err(if is_policy_stop(&reason) {
            RetouchError::content_policy(message)
        } else {
            RetouchError::remote_call(EDIT_SERVICE, message)
        });
    }
    if parts.is_empty() {
        return Err(RetouchError::remote_call(
            EDIT_SERVICE,
            "No content parts received from the editing service",
        ));
    }
    Err(RetouchError::remote_call(
        EDIT_SERVICE,
        "No image data received from the editing service",
    ))
}

/// Instruction for the Stage-1 localized edit
#[must_use]
pub fn removal_instruction(request: &str, focus: FocusPoint) -> String {
    format!(
        "You are an expert photo editor AI. Your task is to perform a natural, localized edit on the provided image based on the user's request.\n\
         User Request: \"{}\"\n\
         Edit Location: Focus on the area around pixel coordinates (x: {}, y: {}).\n\n\
         Guidelines:\n\
         - The edit must be realistic and blend seamlessly with the surrounding area.\n\
         - The rest of the image outside the edit area must remain identical.\n\
         - Output ONLY the final edited image. Do not return text.",
        request, focus.x, focus.y
    )
}

/// Instruction for regenerating a crop
#[must_use]
pub fn patch_instruction(prompt: &str, size: (u32, u32)) -> String {
    format!(
        "You are an expert, creative photo editor AI. Your task is to perform an edit on the provided image based on the user's request.\n\
         User Request: \"{}\"\n\
         Guidelines:\n\
         The edit must be creative and high-quality.\n\
         The output image MUST be the same dimensions as the input image ({}x{}).\n\
         Blend the edit realistically unless a specific artistic style is requested.\n\
         Output ONLY the final edited image. Do not return text.",
        prompt, size.0, size.1
    )
}

/// Generative image edit API client
#[derive(Debug, Clone)]
pub struct GenerativeEditClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GenerativeEditClient {
    #[must_use]
    pub fn new(client: Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn generate(&self, instruction: String, image: &ImageBuffer) -> Result<ImageBuffer> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": instruction },
                    { "inline_data": { "mime_type": image.mime().as_str(), "data": image.to_base64() } }
                ]
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| RetouchError::network_error(EDIT_SERVICE, "Request failed", &e))?;
        let response = ensure_success(EDIT_SERVICE, response).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RetouchError::network_error(EDIT_SERVICE, "Malformed response", &e))?;

        let result = interpret_edit_response(parsed, image.mime());
        if let Err(e) = &result {
            log::warn!("Editing service returned no image: {}", e);
        }
        result
    }
}

#[async_trait]
impl ContentRemover for GenerativeEditClient {
    async fn remove_content(
        &self,
        source: &ImageBuffer,
        focus: FocusPoint,
        instruction: &str,
    ) -> Result<ImageBuffer> {
        self.generate(removal_instruction(instruction, focus), source).await
    }
}

#[async_trait]
impl PatchGenerator for GenerativeEditClient {
    async fn generate_patch(&self, crop: &ImageBuffer, prompt: &str) -> Result<ImageBuffer> {
        let size = crop.decode().map(|image| image.dimensions())?;
        self.generate(patch_instruction(prompt, size), crop).await
    }
}

#[derive(Debug, Deserialize)]
struct HostReply {
    #[serde(default)]
    success: bool,
    data: Option<HostReplyData>,
}

#[derive(Debug, Deserialize)]
struct HostReplyData {
    url: Option<String>,
}

/// Public image hosting client (multipart upload of the base64 payload)
#[derive(Debug, Clone)]
pub struct ImageHostClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ImageHostClient {
    #[must_use]
    pub fn new(client: Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ImageHost for ImageHostClient {
    async fn publish(&self, image: &ImageBuffer) -> Result<PublishResponse> {
        let form = reqwest::multipart::Form::new().text("image", image.to_base64());
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| RetouchError::network_error(HOST_SERVICE, "Upload failed", &e))?;
        let response = ensure_success(HOST_SERVICE, response).await?;
        let reply: HostReply = response
            .json()
            .await
            .map_err(|e| RetouchError::network_error(HOST_SERVICE, "Malformed response", &e))?;

        Ok(PublishResponse {
            success: reply.success,
            url: reply.data.and_then(|d| d.url),
        })
    }
}

/// Asynchronous upscale API client
#[derive(Debug, Clone)]
pub struct UpscaleApiClient {
    client: Client,
    queue_url: String,
    status_url: String,
    api_key: String,
}

impl UpscaleApiClient {
    #[must_use]
    pub fn new(client: Client, queue_url: &str, status_url: &str, api_key: &str) -> Self {
        Self {
            client,
            queue_url: queue_url.to_string(),
            status_url: status_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .header("x-api-key", self.api_key.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| RetouchError::network_error(UPSCALE_SERVICE, "Request failed", &e))?;
        ensure_success(UPSCALE_SERVICE, response).await
    }
}

#[async_trait]
impl Upscaler for UpscaleApiClient {
    async fn submit(&self, request: &UpscaleRequest) -> Result<UpscaleSubmission> {
        let body = json!({
            "img_url": request.source_url,
            "mode": request.mode,
            "webhookUrl": request.callback_url,
        });
        self.post(&self.queue_url, &body)
            .await?
            .json()
            .await
            .map_err(|e| RetouchError::network_error(UPSCALE_SERVICE, "Malformed submission", &e))
    }

    async fn status(&self, request_id: &str) -> Result<UpscaleStatus> {
        let body = json!({ "request_id": request_id });
        let raw: serde_json::Value = self
            .post(&self.status_url, &body)
            .await?
            .json()
            .await
            .map_err(|e| RetouchError::network_error(UPSCALE_SERVICE, "Malformed status", &e))?;
        Ok(UpscaleStatus::from_json(raw))
    }
}

/// Downloads finished results over plain GET
#[derive(Debug, Clone)]
pub struct HttpResultFetcher {
    client: Client,
}

impl HttpResultFetcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResultFetcher for HttpResultFetcher {
    async fn fetch(&self, url: &str) -> Result<ImageBuffer> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetouchError::network_error(DOWNLOAD_SERVICE, "Download failed", &e))?;
        let response = ensure_success(DOWNLOAD_SERVICE, response).await?;
        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(MimeType::from_mime_str);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RetouchError::network_error(DOWNLOAD_SERVICE, "Failed to read body", &e))?;

        match MimeType::sniff(&bytes).or(declared) {
            Some(mime) => Ok(ImageBuffer::new(bytes.to_vec(), mime)),
            None => Err(RetouchError::remote_call(
                DOWNLOAD_SERVICE,
                format!("{} did not return a JPEG, PNG or WebP image", url),
            )),
        }
    }
}
