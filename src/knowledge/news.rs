//! Financial news scraper
//!
//! Reads a fixed listing page, follows headline links and extracts article
//! paragraphs. The selectors match the current page structure of the
//! default source and will need updating when that markup changes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use tracing::{info, warn};

use super::SourceDocument;
use crate::error::AdvisorError;
use crate::Result;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const HEADLINE_SELECTOR: &str = r#"a[data-testid="Heading"]"#;
const PARAGRAPH_SELECTOR: &str = r#"p.text__text__1FZLe, [data-testid^="paragraph-"]"#;

/// Source of fresh articles for the knowledge base.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetch up to `limit` articles. Failures yield fewer (or zero) articles
    /// rather than an error.
    async fn fetch_articles(&self, limit: usize) -> Vec<SourceDocument>;
}

pub struct NewsScraper {
    client: Client,
    listing_url: String,
}

impl NewsScraper {
    pub fn new(listing_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            listing_url: listing_url.into(),
        })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AdvisorError::NetworkError(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisorError::NetworkError(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        Ok(response.text().await?)
    }

    async fn scrape_article(&self, url: &str) -> Result<Option<SourceDocument>> {
        let html = self.fetch_html(url).await?;
        let body = extract_article_text(&html)?;
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(SourceDocument::new(body, url, None)))
    }
}

#[async_trait]
impl NewsSource for NewsScraper {
    async fn fetch_articles(&self, limit: usize) -> Vec<SourceDocument> {
        info!("Scraping financial news from {}", self.listing_url);

        let listing = match self.fetch_html(&self.listing_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to scrape news listing page: {}", e);
                return Vec::new();
            }
        };

        let max_links = limit.saturating_mul(2);
        let links = match extract_headline_links(&listing, &self.listing_url, max_links) {
            Ok(links) => links,
            Err(e) => {
                warn!("Failed to parse news listing page: {}", e);
                return Vec::new();
            }
        };

        let mut articles = Vec::new();
        for link in links {
            if articles.len() >= limit {
                break;
            }
            match self.scrape_article(&link).await {
                Ok(Some(article)) => articles.push(article),
                Ok(None) => {}
                Err(e) => warn!("Could not scrape article {}: {}", link, e),
            }
        }

        info!("Scraped {} article(s)", articles.len());
        articles
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AdvisorError::ValidationError(format!("Invalid selector '{}': {}", css, e)))
}

/// Absolute URLs of headline links on a listing page, at most `max_links`.
pub fn extract_headline_links(html: &str, base_url: &str, max_links: usize) -> Result<Vec<String>> {
    let base = Url::parse(base_url)
        .map_err(|e| AdvisorError::ValidationError(format!("Invalid news URL '{}': {}", base_url, e)))?;
    let headline = selector(HEADLINE_SELECTOR)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&headline)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|url| url.to_string())
        .take(max_links)
        .collect())
}

/// Article paragraphs joined by newlines.
pub fn extract_article_text(html: &str) -> Result<String> {
    let paragraph = selector(PARAGRAPH_SELECTOR)?;
    let document = Html::parse_document(html);

    let paragraphs: Vec<String> = document
        .select(&paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <a data-testid="Heading" href="/business/finance/banks-rally-2024-05-01/">Banks rally</a>
          <a data-testid="Other" href="/sports/">Sports</a>
          <a data-testid="Heading" href="https://www.reuters.com/markets/us/fed-holds/">Fed holds</a>
          <a data-testid="Heading">No link</a>
          <a data-testid="Heading" href="/business/third/">Third</a>
        </body></html>
    "#;

    #[test]
    fn test_headline_links_are_absolute() {
        let links =
            extract_headline_links(LISTING, "https://www.reuters.com/business/finance/", 10).unwrap();
        assert_eq!(
            links,
            vec![
                "https://www.reuters.com/business/finance/banks-rally-2024-05-01/",
                "https://www.reuters.com/markets/us/fed-holds/",
                "https://www.reuters.com/business/third/",
            ]
        );
    }

    #[test]
    fn test_headline_links_respect_limit() {
        let links =
            extract_headline_links(LISTING, "https://www.reuters.com/business/finance/", 2).unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_article_text_extraction() {
        let html = r#"
            <article>
              <h1>Fed holds rates</h1>
              <p class="text__text__1FZLe">The Federal Reserve held rates steady.</p>
              <p class="caption">Photo caption</p>
              <div data-testid="paragraph-1">Markets <b>rose</b> after the decision.</div>
              <p class="text__text__1FZLe">   </p>
            </article>
        "#;
        let text = extract_article_text(html).unwrap();
        assert_eq!(
            text,
            "The Federal Reserve held rates steady.\nMarkets rose after the decision."
        );
    }

    #[test]
    fn test_article_without_paragraphs_is_empty() {
        let text = extract_article_text("<html><body><p>Subscribe</p></body></html>").unwrap();
        assert!(text.is_empty());
    }
}
