use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use apify_client::ApifyClient;
use rentscout_common::{Config, ScoutError};

use crate::parser::{MarkdownListingParser, PlacesParser};
use crate::traits::{RawContent, RecordParser, SourceFetcher};

const PLACES_SEARCH_URL: &str = "https://places.googleapis.com/v1/places:searchText";

const PLACES_FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,\
places.primaryTypeDisplayName,places.googleMapsUri,places.photos,places.priceRange";

// ---------------------------------------------------------------------------
// Provider table
// ---------------------------------------------------------------------------

/// The closed set of listing sources. Resolved once at startup into a
/// fetcher/parser pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceProvider {
    /// Apify website-content-crawler over a listings search page.
    Apify,
    /// Google Places text search.
    GooglePlaces,
}

impl SourceProvider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "apify" | "scraper" => Some(Self::Apify),
            "places" | "google-places" | "google" => Some(Self::GooglePlaces),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Apify => "apify",
            Self::GooglePlaces => "google-places",
        }
    }

    /// Source query for an area, as understood by this provider's fetcher.
    pub fn query_token(&self, area_name: &str) -> String {
        match self {
            Self::Apify => {
                let locality = area_name.trim().replace(' ', "-");
                url::Url::parse_with_params(
                    "https://www.magicbricks.com/property-for-rent/residential-real-estate",
                    &[
                        ("bedroom", "1,2,3"),
                        ("proptype", "Multistorey-Apartment,Builder-Floor-Apartment,Residential-House"),
                        ("cityName", "Mumbai"),
                        ("Locality", locality.as_str()),
                    ],
                )
                .map(|u| u.to_string())
                .unwrap_or_else(|_| format!("https://www.magicbricks.com/property-for-rent-in-{locality}-Mumbai"))
            }
            Self::GooglePlaces => {
                format!("PG hostel rental accommodation in {}, Mumbai", area_name.trim())
            }
        }
    }

    /// Build the fetcher/parser pair, failing when the provider's key is missing.
    pub fn build(
        &self,
        config: &Config,
    ) -> Result<(Arc<dyn SourceFetcher>, Arc<dyn RecordParser>), ScoutError> {
        match self {
            Self::Apify => {
                let key = config.apify_api_key.as_deref().ok_or_else(|| {
                    ScoutError::Config("APIFY_API_KEY is required for the apify provider".into())
                })?;
                Ok((
                    Arc::new(ApifyFetcher::new(key)),
                    Arc::new(MarkdownListingParser),
                ))
            }
            Self::GooglePlaces => {
                let key = config.google_places_api_key.as_deref().ok_or_else(|| {
                    ScoutError::Config(
                        "GOOGLE_PLACES_API_KEY is required for the places provider".into(),
                    )
                })?;
                Ok((Arc::new(PlacesFetcher::new(key)), Arc::new(PlacesParser)))
            }
        }
    }
}

impl std::fmt::Display for SourceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Apify
// ---------------------------------------------------------------------------

pub struct ApifyFetcher {
    client: ApifyClient,
}

impl ApifyFetcher {
    pub fn new(token: &str) -> Self {
        info!("Using ApifyFetcher (website-content-crawler)");
        Self {
            client: ApifyClient::new(token.to_string()),
        }
    }
}

#[async_trait]
impl SourceFetcher for ApifyFetcher {
    async fn fetch(&self, query: &str) -> Result<RawContent, ScoutError> {
        let pages = self
            .client
            .crawl_page(query)
            .await
            .map_err(|e| ScoutError::Fetch(e.to_string()))?;

        let markdown = pages
            .iter()
            .filter_map(|p| p.content())
            .collect::<Vec<_>>()
            .join("\n\n");

        if markdown.trim().is_empty() {
            warn!(url = query, fetcher = "apify", "Crawl returned no content");
            return Err(ScoutError::Fetch(format!("no content returned for {query}")));
        }

        info!(url = query, fetcher = "apify", bytes = markdown.len(), "Fetched successfully");
        Ok(RawContent::Markdown(markdown))
    }

    fn name(&self) -> &str {
        "apify"
    }
}

// ---------------------------------------------------------------------------
// Google Places
// ---------------------------------------------------------------------------

pub struct PlacesFetcher {
    api_key: String,
    client: reqwest::Client,
}

impl PlacesFetcher {
    pub fn new(api_key: &str) -> Self {
        info!("Using PlacesFetcher (Places API text search)");
        Self {
            api_key: api_key.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SourceFetcher for PlacesFetcher {
    async fn fetch(&self, query: &str) -> Result<RawContent, ScoutError> {
        info!(query, fetcher = "places", "Places text search");

        let body = serde_json::json!({
            "textQuery": query,
            "pageSize": 20,
        });

        let resp = self
            .client
            .post(PLACES_SEARCH_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", PLACES_FIELD_MASK)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScoutError::Fetch(format!("Places request failed: {e}")))?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ScoutError::Fetch(format!("Failed to read Places response: {e}")))?;

        if let Some(err) = data.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(ScoutError::Fetch(format!(
                "Places API error (status {}): {message}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(ScoutError::Fetch(format!(
                "Places API returned status {}",
                status.as_u16()
            )));
        }

        let count = data
            .get("places")
            .and_then(|p| p.as_array())
            .map_or(0, |p| p.len());
        info!(query, count, "Places search complete");
        Ok(RawContent::Json(data))
    }

    fn name(&self) -> &str {
        "google-places"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse() {
        assert_eq!(SourceProvider::parse("apify"), Some(SourceProvider::Apify));
        assert_eq!(SourceProvider::parse("Places"), Some(SourceProvider::GooglePlaces));
        assert_eq!(SourceProvider::parse("zillow"), None);
    }

    #[test]
    fn apify_query_token_is_listing_url_for_locality() {
        let token = SourceProvider::Apify.query_token("Bandra West");
        assert!(token.starts_with("https://www.magicbricks.com/"));
        assert!(token.contains("Locality=Bandra-West"));
        assert!(token.contains("cityName=Mumbai"));
    }

    #[test]
    fn places_query_token_names_area_and_city() {
        let token = SourceProvider::GooglePlaces.query_token("Powai");
        assert_eq!(token, "PG hostel rental accommodation in Powai, Mumbai");
    }

    #[test]
    fn build_requires_provider_key() {
        let config = Config {
            apify_api_key: None,
            google_places_api_key: None,
            s3_bucket: None,
            s3_prefix: "p".into(),
            data_dir: "data".into(),
        };
        assert!(matches!(
            SourceProvider::Apify.build(&config),
            Err(ScoutError::Config(_))
        ));
        assert!(matches!(
            SourceProvider::GooglePlaces.build(&config),
            Err(ScoutError::Config(_))
        ));
    }
}
