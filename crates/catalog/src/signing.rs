//! Asset URL signing.
//!
//! Some catalogs return hrefs that need a provider-specific token before
//! they can be fetched. Signers are looked up by provider name in a
//! [`SignerRegistry`]; catalogs without signing use [`NoopSigner`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{CatalogError, CatalogResult};

/// Provider name for catalogs whose hrefs are fetched as-is.
pub const PROVIDER_NONE: &str = "none";
/// Provider name for the Microsoft Planetary Computer.
pub const PROVIDER_PLANETARY_COMPUTER: &str = "planetary-computer";

/// Default Planetary Computer signing endpoint.
pub const PC_SIGN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

/// Cached signatures are refreshed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Turns a raw asset href into one that can be dereferenced.
#[async_trait]
pub trait AssetSigner: Send + Sync {
    /// Provider name this signer is registered under.
    fn provider(&self) -> &str;

    async fn sign(&self, href: &str) -> CatalogResult<String>;
}

/// Returns hrefs unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

#[async_trait]
impl AssetSigner for NoopSigner {
    fn provider(&self) -> &str {
        PROVIDER_NONE
    }

    async fn sign(&self, href: &str) -> CatalogResult<String> {
        Ok(href.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    href: String,
    #[serde(rename = "msft:expiry")]
    expiry: Option<String>,
}

#[derive(Debug, Clone)]
struct SignedHref {
    href: String,
    expiry: Option<DateTime<Utc>>,
}

impl SignedHref {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .map_or(true, |exp| exp - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > now)
    }
}

/// Signs Azure Blob hrefs through the Planetary Computer SAS API.
///
/// Signed hrefs are cached until shortly before `msft:expiry`.
pub struct PlanetaryComputerSigner {
    client: Client,
    sign_url: String,
    cache: Mutex<HashMap<String, SignedHref>>,
}

impl PlanetaryComputerSigner {
    pub fn new(timeout: Duration) -> CatalogResult<Self> {
        Self::with_endpoint(PC_SIGN_URL, timeout)
    }

    /// Use a different signing endpoint (mirrors, tests).
    pub fn with_endpoint(sign_url: impl Into<String>, timeout: Duration) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Client(e.to_string()))?;
        Ok(Self {
            client,
            sign_url: sign_url.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn request_signature(&self, href: &str) -> CatalogResult<SignedHref> {
        let response = self
            .client
            .get(&self.sign_url)
            .query(&[("href", href)])
            .send()
            .await
            .map_err(|e| CatalogError::Signing {
                href: href.to_string(),
                message: format!("sign request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Signing {
                href: href.to_string(),
                message: format!(
                    "sign endpoint returned HTTP {}: {}",
                    status,
                    body.chars().take(300).collect::<String>()
                ),
            });
        }

        let parsed: SignResponse = response.json().await.map_err(|e| CatalogError::Signing {
            href: href.to_string(),
            message: format!("parsing sign response: {}", e),
        })?;

        let expiry = parsed
            .expiry
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(SignedHref {
            href: parsed.href,
            expiry,
        })
    }
}

#[async_trait]
impl AssetSigner for PlanetaryComputerSigner {
    fn provider(&self) -> &str {
        PROVIDER_PLANETARY_COMPUTER
    }

    #[instrument(skip(self))]
    async fn sign(&self, href: &str) -> CatalogResult<String> {
        let now = Utc::now();
        if let Some(cached) = self.cache.lock().await.get(href) {
            if cached.is_fresh(now) {
                debug!("Using cached signature");
                return Ok(cached.href.clone());
            }
        }

        let signed = self.request_signature(href).await?;
        debug!(expiry = ?signed.expiry, "Signed asset href");
        let result = signed.href.clone();
        self.cache.lock().await.insert(href.to_string(), signed);
        Ok(result)
    }
}

/// Signers keyed by provider name.
#[derive(Clone)]
pub struct SignerRegistry {
    signers: HashMap<String, Arc<dyn AssetSigner>>,
}

impl SignerRegistry {
    /// Registry holding only the no-op signer.
    pub fn new() -> Self {
        let mut registry = Self {
            signers: HashMap::new(),
        };
        registry.register(Arc::new(NoopSigner));
        registry
    }

    /// Registry with the no-op and Planetary Computer signers.
    pub fn with_defaults(timeout: Duration) -> CatalogResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(PlanetaryComputerSigner::new(timeout)?));
        Ok(registry)
    }

    /// Add or replace a signer under its provider name.
    pub fn register(&mut self, signer: Arc<dyn AssetSigner>) {
        self.signers.insert(signer.provider().to_string(), signer);
    }

    pub fn get(&self, provider: &str) -> CatalogResult<Arc<dyn AssetSigner>> {
        self.signers
            .get(provider)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownProvider(provider.to_string()))
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.signers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Guess the signing provider from a catalog root URL.
pub fn detect_provider(catalog_url: &str) -> &'static str {
    if catalog_url.contains("planetarycomputer.microsoft.com") {
        PROVIDER_PLANETARY_COMPUTER
    } else {
        PROVIDER_NONE
    }
}
