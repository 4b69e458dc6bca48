use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt as _, ResultExt, Snafu};
use tracing::{debug, warn};

const LOG_TARGET: &str = "trendpost_bot::generator";

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_POST_LANGUAGE: &str = "Russian";

#[derive(Debug, Snafu)]
pub enum GenerateError {
    #[snafu(display("HTTP request failed: {source}"))]
    Http { source: reqwest::Error },
    #[snafu(display("Generative service responded with HTTP {status}"))]
    Status { status: StatusCode },
    #[snafu(display("Malformed generative service response: {source}"))]
    Decode { source: serde_json::Error },
    #[snafu(display("Response contains no generated text"))]
    MissingText,
    #[snafu(display("Generated text is blank"))]
    EmptyText,
}

pub type GeneratorResult<T> = std::result::Result<T, GenerateError>;

#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single attempt at rewriting an item, surfacing any failure
    async fn try_generate(&self, title: &str, link: &str) -> GeneratorResult<String>;

    /// Rewrite an item, falling back to [`fallback_text`] on failure.
    async fn generate(&self, title: &str, link: &str) -> String {
        let result = self.try_generate(title, link).await;
        if let Err(err) = &result {
            warn!(target: LOG_TARGET, error = %err, title, "Text generation failed, using fallback");
        }
        text_or_fallback(result, title, link)
    }
}

pub fn fallback_text(title: &str, link: &str) -> String {
    format!("{title}\n{link}")
}

pub fn text_or_fallback(result: GeneratorResult<String>, title: &str, link: &str) -> String {
    result.unwrap_or_else(|_| fallback_text(title, link))
}

pub fn build_prompt(title: &str, link: &str, language: &str) -> String {
    format!(
        "Write a short, catchy, meme-style Telegram post in {language} about this news story: \
         '{title}'. Link: {link}. Reply with the post text only, on a single line."
    )
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Pull the first non-blank line of `candidates[0].content.parts[0].text`
/// out of a `generateContent` response body.
pub fn extract_text(body: &[u8]) -> GeneratorResult<String> {
    let response: GenerateContentResponse = serde_json::from_slice(body).context(DecodeSnafu)?;

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .context(MissingTextSnafu)?;

    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
        .context(EmptyTextSnafu)
}

pub struct GeminiGenerator {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
    language: String,
}

impl GeminiGenerator {
    pub fn new(
        client: Client,
        api_base: String,
        model: String,
        api_key: String,
        language: String,
    ) -> Self {
        Self {
            client,
            api_base,
            model,
            api_key,
            language,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiGenerator {
    async fn try_generate(&self, title: &str, link: &str) -> GeneratorResult<String> {
        let prompt = build_prompt(title, link, &self.language);
        let request = GenerateContentRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: &prompt }],
            }],
        };

        debug!(target: LOG_TARGET, model = %self.model, "Requesting generated text");

        // The api key travels in the query string, so it is stripped from errors
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu { status }.fail();
        }

        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .context(HttpSnafu)?;

        extract_text(&body)
    }
}
