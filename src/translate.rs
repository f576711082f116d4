use crate::config::{ImageDetail, TranslationMode};
use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose, Engine as _};
use futures_util::StreamExt;
use image::RgbaImage;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Every error result starts with this, so callers can tell it apart.
pub const FAILURE_PREFIX: &str = "Translation failed";

const MAX_PREAMBLE: usize = 64 * 1024;

const PROMPT_TO_ENGLISH: &str = "This screenshot contains text. Extract all of the text and translate it into English. \
Return only the translation, without any explanation or commentary.";

const PROMPT_TO_CHINESE: &str = "This screenshot contains text. Please extract all the text and translate it to Chinese. \
Only return the translation result without any explanation. The content should make sense. \
Colloquial: use natural Chinese expressions, consistent with the character's personality.";

const PROMPT_GENERIC: &str = "Please extract all the text from this image and translate it.";

// No request timeout: a long streamed answer may legitimately take minutes.
static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .build()
        .expect("failed to build client")
});

pub fn prompt_for(mode: &TranslationMode) -> &'static str {
    match mode {
        TranslationMode::ToEnglish => PROMPT_TO_ENGLISH,
        TranslationMode::ToChinese => PROMPT_TO_CHINESE,
        TranslationMode::Other(_) => PROMPT_GENERIC,
    }
}

/// One capture-to-text call against an OpenAI-compatible vision endpoint.
#[derive(Debug, Clone)]
pub struct TranslationRequest<'a> {
    pub image: &'a RgbaImage,
    pub mode: &'a TranslationMode,
    pub api_key: &'a str,
    pub base_url: &'a str,
    pub model: &'a str,
    pub detail: ImageDetail,
    pub streaming: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

pub fn encode_png_base64(image: &RgbaImage) -> Result<String> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(general_purpose::STANDARD.encode(&png))
}

fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

/// Runs the request and always yields displayable text: the translation, or
/// a `Translation failed: ...` line. Streamed deltas go to `on_fragment` as
/// they arrive; the return value is then their concatenation.
pub async fn translate_image<F>(req: &TranslationRequest<'_>, mut on_fragment: F) -> String
where
    F: FnMut(&str),
{
    if req.api_key.trim().is_empty() || req.base_url.trim().is_empty() {
        return format!("{}: API key or base URL is not configured.", FAILURE_PREFIX);
    }
    match request_translation(req, &mut on_fragment).await {
        Ok(text) => text,
        Err(e) => {
            log::error!("Translation error: {:#}", e);
            format!("{}: {:#}", FAILURE_PREFIX, e)
        }
    }
}

async fn request_translation<F>(req: &TranslationRequest<'_>, on_fragment: &mut F) -> Result<String>
where
    F: FnMut(&str),
{
    let image_b64 = encode_png_base64(req.image)?;
    let body = ChatRequest {
        model: req.model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", image_b64),
                        detail: req.detail.as_str(),
                    },
                },
                ContentPart::Text {
                    text: prompt_for(req.mode),
                },
            ],
        }],
        stream: req.streaming,
    };

    let resp = CLIENT
        .post(chat_url(req.base_url))
        .bearer_auth(req.api_key.trim())
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!("API error {}: {}", status, text);
    }

    if req.streaming {
        read_stream(resp, on_fragment).await
    } else {
        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("empty response"))
    }
}

async fn read_stream<F>(resp: reqwest::Response, on_fragment: &mut F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut full = String::new();
    let mut lines = SseLines::default();
    let mut bytes = resp.bytes_stream();
    // Body seen before the first `data:` line; a plain JSON error lands here.
    let mut preamble = Vec::new();
    let mut saw_data = false;

    'read: while let Some(chunk) = bytes.next().await {
        let chunk = chunk?;
        if !saw_data && preamble.len() < MAX_PREAMBLE {
            preamble.extend_from_slice(&chunk);
        }
        for data in lines.push(&chunk) {
            saw_data = true;
            if !handle_sse_data(&data, &mut full, on_fragment)? {
                break 'read;
            }
        }
    }
    if let Some(data) = lines.finish() {
        saw_data = true;
        handle_sse_data(&data, &mut full, on_fragment)?;
    }
    if !saw_data {
        if let Ok(StreamChunk { error: Some(err), .. }) = serde_json::from_slice(&preamble) {
            bail!("API error: {}", err.message);
        }
        log::debug!("Stream carried no data lines: {}", String::from_utf8_lossy(&preamble));
    }
    if full.trim().is_empty() {
        bail!("empty response");
    }
    Ok(full)
}

/// Returns `false` once the stream signalled completion.
fn handle_sse_data<F>(data: &str, full: &mut String, on_fragment: &mut F) -> Result<bool>
where
    F: FnMut(&str),
{
    if data.trim() == "[DONE]" {
        return Ok(false);
    }
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            log::debug!("Skipping unparsable stream line ({}): {}", e, data);
            return Ok(true);
        }
    };
    if let Some(err) = chunk.error {
        bail!("stream error: {}", err.message);
    }
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            full.push_str(&text);
            on_fragment(&text);
        }
    }
    Ok(true)
}

/// Splits a server-sent-event byte stream into `data:` payloads. Bytes are
/// buffered until a full line arrives so multi-byte characters split across
/// network chunks decode intact.
#[derive(Debug, Default)]
struct SseLines {
    pending: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                out.push(data);
            }
        }
        out
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}
