use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};
use url::Url;

const LOG_TARGET: &str = "trendpost_bot::scraper";

pub const HN_FRONTPAGE_URL: &str = "https://news.ycombinator.com/";

// Each story row is a `tr.athing` whose `id` is the HN item id
const STORY_SELECTOR: &str = "tr.athing";
const TITLE_SELECTOR: &str = "span.titleline > a";

/// One entry of the source listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub id: String,
    pub title: String,
    pub link: String,
}

#[derive(Debug, Snafu)]
pub enum FetchError {
    #[snafu(display("HTTP request failed: {source}"))]
    Http { source: reqwest::Error },
    #[snafu(display("Source responded with HTTP {status}"))]
    Status { status: StatusCode },
    #[snafu(display("Failed to parse selector `{selector}`"))]
    Selector { selector: &'static str },
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Up to `limit` items, in the source's ranking order
    async fn fetch_top(&self, limit: usize) -> FetchResult<Vec<CandidateItem>>;
}

pub struct HnScraper {
    client: Client,
    url: Url,
}

impl HnScraper {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HnScraper {
    async fn fetch_top(&self, limit: usize) -> FetchResult<Vec<CandidateItem>> {
        info!(target: LOG_TARGET, url = %self.url, limit, "Scraping frontpage");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu { status }.fail();
        }

        let html_content = response.text().await.context(HttpSnafu)?;
        let items = parse_listing(&html_content, &self.url, limit)?;

        info!(target: LOG_TARGET, count = items.len(), "Scraped candidates from frontpage");
        Ok(items)
    }
}

fn selector(selector: &'static str) -> FetchResult<Selector> {
    Selector::parse(selector).map_err(|_| SelectorSnafu { selector }.build())
}

/// Extract up to `limit` stories from a listing page, in document order.
///
/// Rows without an id, a title link or an `href` are skipped. Relative links
/// (HN's own `item?id=` posts) are resolved against `base_url`.
pub fn parse_listing(html: &str, base_url: &Url, limit: usize) -> FetchResult<Vec<CandidateItem>> {
    let document = Html::parse_document(html);
    let story_selector = selector(STORY_SELECTOR)?;
    let title_selector = selector(TITLE_SELECTOR)?;

    let mut items = Vec::new();

    for story_element in document.select(&story_selector) {
        if limit <= items.len() {
            break;
        }

        let Some(id) = story_element.value().id().filter(|id| !id.is_empty()) else {
            warn!(target: LOG_TARGET, "No id found for story, skipping");
            continue;
        };

        let Some(title_link) = story_element.select(&title_selector).next() else {
            warn!(target: LOG_TARGET, id, "No title link found for story, skipping");
            continue;
        };

        let title = title_link.text().collect::<String>().trim().to_owned();

        let Some(href) = title_link.value().attr("href") else {
            warn!(target: LOG_TARGET, id, "Title link has no href, skipping");
            continue;
        };

        let link = if Url::parse(href).is_ok() {
            href.to_owned()
        } else {
            match base_url.join(href) {
                Ok(url) => url.to_string(),
                Err(err) => {
                    warn!(target: LOG_TARGET, id, href, error = %err, "Unusable story link, skipping");
                    continue;
                }
            }
        };

        debug!(target: LOG_TARGET, id, title = %title, "Scraped story");
        items.push(CandidateItem {
            id: id.to_owned(),
            title,
            link,
        });
    }

    Ok(items)
}
