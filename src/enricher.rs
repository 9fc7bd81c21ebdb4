use crate::error::EnrichError;
use crate::models::{FeedItem, ReleaseDetails};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound the challenge solver may spend rendering a page.
pub const SOLVER_TIMEOUT: Duration = Duration::from_secs(60);

/// Best-effort source of the fields the feed does not carry.
///
/// Implementations never fail: anything that goes wrong degrades to
/// `ReleaseDetails::default()`.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, item: &FeedItem) -> ReleaseDetails;
}

/// How the detail page is retrieved.
#[derive(Debug, Clone)]
pub enum PageAccess {
    Direct,
    /// FlareSolverr-style endpoint that renders pages behind anti-bot checks.
    Solver { endpoint: String },
}

/// Scrapes the item's detail page (its guid) for a magnet link and release type.
pub struct PageEnricher {
    client: reqwest::Client,
    access: PageAccess,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolverRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    max_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
struct SolverSolution {
    response: String,
}

impl PageEnricher {
    pub fn new(client: reqwest::Client, access: PageAccess) -> Self {
        Self { client, access }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, EnrichError> {
        match &self.access {
            PageAccess::Direct => {
                let response = self.client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(EnrichError::Status(status.as_u16()));
                }
                Ok(response.text().await?)
            }
            PageAccess::Solver { endpoint } => {
                let request = SolverRequest {
                    cmd: "request.get",
                    url,
                    max_timeout: SOLVER_TIMEOUT.as_millis() as u64,
                };
                let response = self
                    .client
                    .post(endpoint)
                    .timeout(SOLVER_TIMEOUT)
                    .json(&request)
                    .send()
                    .await?;
                let status = response.status();
                let body: SolverResponse = response.json().await?;

                match body.solution {
                    Some(solution) if status.is_success() => Ok(solution.response),
                    _ => Err(EnrichError::Solver(format!(
                        "HTTP {} status={} message={}",
                        status,
                        body.status.as_deref().unwrap_or("-"),
                        body.message.as_deref().unwrap_or("-"),
                    ))),
                }
            }
        }
    }
}

#[async_trait]
impl Enricher for PageEnricher {
    async fn enrich(&self, item: &FeedItem) -> ReleaseDetails {
        let result = match self.fetch_page(&item.guid).await {
            Ok(html) => extract_details(&html),
            Err(e) => Err(e),
        };

        match result {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(guid = %item.guid, error = %e, "Enrichment failed, using defaults");
                ReleaseDetails::default()
            }
        }
    }
}

/// Pulls the magnet link and release type out of a rendered detail page.
///
/// The magnet link is the first anchor whose href uses the `magnet:` scheme.
/// The release type is the `span` text of the first list entry labelled "Type".
pub fn extract_details(html: &str) -> Result<ReleaseDetails, EnrichError> {
    let document = Html::parse_document(html);
    let magnet_selector =
        Selector::parse(r#"a[href^="magnet:"]"#).map_err(|e| EnrichError::Selector(e.to_string()))?;
    let li_selector = Selector::parse("li").map_err(|e| EnrichError::Selector(e.to_string()))?;
    let span_selector = Selector::parse("span").map_err(|e| EnrichError::Selector(e.to_string()))?;

    let magnet_link = document
        .select(&magnet_selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty());

    let release_type = document
        .select(&li_selector)
        .find(|li| li.text().collect::<String>().contains("Type"))
        .map(|li| {
            li.select(&span_selector)
                .flat_map(|span| span.text())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|t| !t.is_empty());

    Ok(ReleaseDetails {
        magnet_link,
        release_type,
    })
}

/// Reads the supplementary fields from the feed's own torznab attributes.
pub struct AttributeEnricher;

#[async_trait]
impl Enricher for AttributeEnricher {
    async fn enrich(&self, item: &FeedItem) -> ReleaseDetails {
        ReleaseDetails {
            magnet_link: item.attribute("magneturl").map(str::to_string),
            release_type: item
                .attribute("type")
                .or_else(|| item.attribute("category"))
                .map(str::to_string),
        }
    }
}
