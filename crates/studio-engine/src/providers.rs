use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use studio_contracts::studio::ImageFile;

use crate::codec::data_url_to_base64;
use crate::config::GeminiConfig;
use crate::error::StudioError;

/// One entry of a multimodal request: an inline image or a text instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    InlineImage { mime_type: String, data: String },
    Text(String),
}

impl ContentPart {
    pub fn from_image(image: &ImageFile) -> Result<Self, StudioError> {
        let data = data_url_to_base64(&image.data_url).ok_or_else(|| {
            StudioError::Codec(format!("Image '{}' is not a base64 data URL", image.name))
        })?;
        Ok(Self::InlineImage {
            mime_type: image.mime_type.clone(),
            data: data.to_string(),
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::InlineImage { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data,
                }
            }),
            Self::Text(text) => json!({ "text": text }),
        }
    }
}

fn digest_parts(parts: &[ContentPart], model: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    for part in parts {
        match part {
            ContentPart::InlineImage { mime_type, data } => {
                hasher.update(b"image:");
                hasher.update(mime_type.as_bytes());
                hasher.update(data.as_bytes());
            }
            ContentPart::Text(text) => {
                hasher.update(b"text:");
                hasher.update(text.as_bytes());
            }
        }
    }
    hasher.finalize().to_vec()
}

/// A backend that turns content parts into one generated image.
///
/// Implementations make a single attempt and return the raw base64 payload of
/// the first image in the response.
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, parts: &[ContentPart], model: &str) -> Result<String, StudioError>;
}

#[derive(Default)]
pub struct ImageGeneratorRegistry {
    generators: BTreeMap<String, Arc<dyn ImageGenerator>>,
}

impl ImageGeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<G: ImageGenerator + 'static>(&mut self, generator: G) {
        self.generators
            .insert(generator.name().to_string(), Arc::new(generator));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageGenerator>> {
        self.generators.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }
}

pub fn default_generator_registry(config: GeminiConfig) -> Result<ImageGeneratorRegistry> {
    let mut generators = ImageGeneratorRegistry::new();
    generators.register(DryrunProvider);
    generators.register(GeminiProvider::new(config)?);
    Ok(generators)
}

/// Offline stand-in: a solid JPEG whose color is derived from the request.
pub struct DryrunProvider;

impl DryrunProvider {
    const SIZE: u32 = 64;

    fn render(parts: &[ContentPart], model: &str) -> Result<Vec<u8>> {
        let digest = digest_parts(parts, model);
        let mut image = RgbImage::new(Self::SIZE, Self::SIZE);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([digest[0], digest[1], digest[2]]);
        }
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(Cursor::new(&mut buffer), 90)
            .write_image(image.as_raw(), Self::SIZE, Self::SIZE, ExtendedColorType::Rgb8)
            .context("dryrun JPEG encode failed")?;
        Ok(buffer)
    }
}

impl ImageGenerator for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn invoke(&self, parts: &[ContentPart], model: &str) -> Result<String, StudioError> {
        let bytes = Self::render(parts, model).map_err(|err| StudioError::Transport {
            provider: "Dryrun".to_string(),
            detail: error_chain_text(&err, 512),
        })?;
        Ok(BASE64.encode(bytes))
    }
}

pub struct GeminiProvider {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiProvider {
    const LABEL: &'static str = "Gemini";

    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self::with_http_client(config, http))
    }

    pub fn with_http_client(config: GeminiConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn build_payload(&self, parts: &[ContentPart]) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": parts.iter().map(ContentPart::to_json).collect::<Vec<_>>(),
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": self.config.aspect_ratio,
                },
            },
        })
    }

    fn transport_error(detail: String) -> StudioError {
        StudioError::Transport {
            provider: Self::LABEL.to_string(),
            detail,
        }
    }

    /// First non-empty inline image payload across every candidate.
    fn extract_first_image(response_payload: &Value) -> Option<String> {
        response_payload
            .get("candidates")
            .and_then(Value::as_array)?
            .iter()
            .filter_map(|candidate| {
                candidate
                    .get("content")
                    .and_then(|content| content.get("parts"))
                    .and_then(Value::as_array)
            })
            .flatten()
            .filter_map(|part| part.get("inlineData").or_else(|| part.get("inline_data")))
            .filter_map(|inline| inline.get("data").and_then(Value::as_str))
            .find(|data| !data.is_empty())
            .map(str::to_string)
    }
}

impl ImageGenerator for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn invoke(&self, parts: &[ContentPart], model: &str) -> Result<String, StudioError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(StudioError::Configuration(
                "GEMINI_API_KEY (or GOOGLE_API_KEY / API_KEY) is not set. Please ensure it is configured."
                    .to_string(),
            ));
        };
        let endpoint = self.endpoint_for_model(model);
        let payload = self.build_payload(parts);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .map_err(|err| {
                let err = anyhow::Error::new(err.without_url())
                    .context(format!("request failed ({endpoint})"));
                Self::transport_error(error_chain_text(&err, 512))
            })?;
        let response_payload =
            response_json_or_error(response).map_err(|err| Self::transport_error(error_chain_text(&err, 512)))?;

        Self::extract_first_image(&response_payload).ok_or_else(|| StudioError::EmptyResult {
            provider: Self::LABEL.to_string(),
        })
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().context("response body read failed")?;
    if !status.is_success() {
        anyhow::bail!("request failed ({code}): {}", truncate_text(&body, 512));
    }
    let parsed: Value =
        serde_json::from_str(&body).context("response was not a valid JSON payload")?;
    Ok(parsed)
}

/// Joins an error chain into one line, skipping repeated causes.
pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use serde_json::{json, Value};

    use super::*;

    fn image_part(data: &str) -> ContentPart {
        ContentPart::InlineImage {
            mime_type: "image/png".to_string(),
            data: data.to_string(),
        }
    }

    fn provider_for(api_base: &str, api_key: Option<&str>) -> GeminiProvider {
        let config = GeminiConfig {
            api_key: api_key.map(str::to_string),
            api_base: api_base.to_string(),
            ..GeminiConfig::default()
        };
        let http = HttpClient::builder()
            .no_proxy()
            .build()
            .expect("http client");
        GeminiProvider::with_http_client(config, http)
    }

    /// Serves one canned HTTP response and hands back the raw request body.
    fn serve_once(status_line: &'static str, body: String) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            let _ = reader.read_line(&mut request_line);
            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap_or(0) == 0 || header == "\r\n" {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut request_body);
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let mut stream = reader.into_inner();
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
            let _ = tx.send((
                request_line.trim().to_string(),
                String::from_utf8_lossy(&request_body).to_string(),
            ));
        });
        (format!("http://{addr}/v1beta"), rx)
    }

    #[test]
    fn content_parts_serialize_to_gemini_shape() -> anyhow::Result<()> {
        let image = ImageFile::new("a.png", "data:image/png;base64,QUJD", "image/png");
        let part = ContentPart::from_image(&image)?;
        assert_eq!(
            part.to_json(),
            json!({"inlineData": {"mimeType": "image/png", "data": "QUJD"}})
        );
        assert_eq!(ContentPart::text("hi").to_json(), json!({"text": "hi"}));

        let broken = ImageFile::new("b.png", "QUJD", "image/png");
        assert_eq!(ContentPart::from_image(&broken).unwrap_err().kind(), "codec");
        Ok(())
    }

    #[test]
    fn gemini_payload_fixes_square_aspect_ratio() {
        let provider = provider_for("https://example.test/v1beta", Some("k"));
        let payload = provider.build_payload(&[image_part("AAA"), ContentPart::text("go")]);
        assert_eq!(payload["generationConfig"]["imageConfig"]["aspectRatio"], json!("1:1"));
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        let parts = payload["contents"][0]["parts"].as_array().cloned().unwrap_or_default();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["text"], json!("go"));

        assert_eq!(
            provider.endpoint_for_model("gemini-2.5-flash-image"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            provider.endpoint_for_model("models/custom"),
            "https://example.test/v1beta/models/custom:generateContent"
        );
    }

    #[test]
    fn extract_scans_every_candidate_for_inline_data() {
        let response = json!({
            "candidates": [
                {"content": {"parts": [{"text": "no image here"}]}},
                {"content": {"parts": [
                    {"inline_data": {"mime_type": "image/jpeg", "data": ""}},
                    {"inline_data": {"mime_type": "image/jpeg", "data": "SECOND"}}
                ]}},
                {"content": {"parts": [{"inlineData": {"data": "THIRD"}}]}}
            ]
        });
        assert_eq!(
            GeminiProvider::extract_first_image(&response).as_deref(),
            Some("SECOND")
        );
        assert_eq!(GeminiProvider::extract_first_image(&json!({})), None);
        assert_eq!(
            GeminiProvider::extract_first_image(&json!({"candidates": []})),
            None
        );
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let provider = provider_for("http://127.0.0.1:9/v1beta", None);
        let err = provider
            .invoke(&[ContentPart::text("hi")], "gemini-2.5-flash-image")
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn gemini_invoke_returns_first_inline_image() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/jpeg", "data": "SU1BR0U="}}
            ]}}]
        })
        .to_string();
        let (api_base, rx) = serve_once("HTTP/1.1 200 OK", body);
        let provider = provider_for(&api_base, Some("secret"));

        let data = provider.invoke(
            &[image_part("QUJD"), ContentPart::text("recolor")],
            "gemini-2.5-flash-image",
        )?;
        assert_eq!(data, "SU1BR0U=");

        let (request_line, request_body) = rx.recv()?;
        assert!(request_line
            .starts_with("POST /v1beta/models/gemini-2.5-flash-image:generateContent?key=secret"));
        let sent: Value = serde_json::from_str(&request_body)?;
        assert_eq!(sent["contents"][0]["parts"][0]["inlineData"]["data"], json!("QUJD"));
        assert_eq!(sent["contents"][0]["parts"][1]["text"], json!("recolor"));
        Ok(())
    }

    #[test]
    fn gemini_invoke_wraps_vendor_errors_and_empty_results() {
        let (api_base, _rx) = serve_once(
            "HTTP/1.1 500 Internal Server Error",
            json!({"error": {"message": "overloaded"}}).to_string(),
        );
        let err = provider_for(&api_base, Some("secret"))
            .invoke(&[ContentPart::text("x")], "m")
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
        let text = err.to_string();
        assert!(text.starts_with("Gemini API error: request failed (500)"));
        assert!(text.contains("overloaded"));
        assert!(!text.contains("secret"));

        let (api_base, _rx) = serve_once(
            "HTTP/1.1 200 OK",
            json!({"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]}).to_string(),
        );
        let err = provider_for(&api_base, Some("secret"))
            .invoke(&[ContentPart::text("x")], "m")
            .unwrap_err();
        assert_eq!(err.kind(), "empty_result");
    }

    #[test]
    fn dryrun_is_deterministic_and_decodable() -> anyhow::Result<()> {
        let parts = [image_part("QUJD"), ContentPart::text("white background")];
        let first = DryrunProvider.invoke(&parts, "dryrun-image-1")?;
        let second = DryrunProvider.invoke(&parts, "dryrun-image-1")?;
        assert_eq!(first, second);

        let other = DryrunProvider.invoke(&[ContentPart::text("black")], "dryrun-image-1")?;
        assert_ne!(first, other);

        let bytes = BASE64.decode(first.as_bytes())?;
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg)?;
        assert_eq!(decoded.width(), 64);
        Ok(())
    }

    #[test]
    fn default_registry_has_gemini_and_dryrun() -> anyhow::Result<()> {
        let registry = default_generator_registry(GeminiConfig::default())?;
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("openai").is_none());
        Ok(())
    }

    #[test]
    fn digest_changes_with_instruction() {
        let a = digest_parts(&[ContentPart::text("a")], "m");
        let b = digest_parts(&[ContentPart::text("b")], "m");
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn error_chain_text_skips_duplicates() {
        let err = anyhow::anyhow!("socket closed")
            .context("socket closed")
            .context("request failed (https://example.test)");
        assert_eq!(
            error_chain_text(&err, 512),
            "request failed (https://example.test) | caused by: socket closed"
        );
    }
}
