//! Credential bootstrap: obtaining the app key and the push endpoint from the metadata service.

use std::convert::TryFrom;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, AUTHORIZATION};
use hyper::{Method, Request, Uri};
use serde::Deserialize;
use tracing::debug;

use crate::error::{CredentialError, TransportError};
use crate::transport::{HttpTransport, HyperTransport};

/// Default host of the metadata service.
pub const DEFAULT_METADATA_HOST: &str = "http://169.254.169.254";

/// Default host of the auth service.
pub const DEFAULT_AUTH_HOST: &str = "https://sonar.digitalocean.com";

/// Default domain that regional ingestion hosts live under.
pub const DEFAULT_INGEST_DOMAIN: &str = "sonar.digitalocean.com";

const INVALID_TOKEN_MARKER: &str = r#"{"valid":false}"#;

/// Subset of the metadata document describing this host.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DropletMeta {
    /// Numeric ID of the host.
    pub droplet_id: u64,
    /// Hostname.
    pub hostname: String,
    /// Key published in the metadata document. The push client authenticates with the key
    /// obtained from [`Authenticator::app_key`] instead.
    pub auth_key: String,
    /// Region slug, such as `nyc3`.
    pub region: String,
    /// Tags attached to the host.
    pub tags: Vec<String>,
}

impl DropletMeta {
    /// Builds the push endpoint of this host under the given ingestion domain.
    pub fn push_endpoint(&self, ingest_domain: &str) -> String {
        format!(
            "https://{}.{}/v1/metrics/droplet_id/{}",
            self.region,
            ingest_domain.trim_end_matches('/'),
            self.droplet_id
        )
    }
}

/// Client for the metadata service.
#[derive(Clone, Debug)]
pub struct Metadata<T = HyperTransport> {
    transport: T,
    host: String,
}

impl<T: HttpTransport> Metadata<T> {
    /// Creates a new `Metadata` client for `host`.
    pub fn new<H: AsRef<str>>(transport: T, host: H) -> Self {
        Self { transport, host: host.as_ref().trim_end_matches('/').to_string() }
    }

    /// Fetches the token that can be exchanged for an app key.
    pub async fn auth_token(&self) -> Result<String, CredentialError> {
        let url = format!("{}/metadata/v1/auth-token", self.host);
        let body = get(&self.transport, &url).await?;
        Ok(trim_value(&String::from_utf8_lossy(&body)).to_string())
    }

    /// Fetches the metadata document of this host.
    pub async fn meta(&self) -> Result<DropletMeta, CredentialError> {
        let url = format!("{}/metadata/v1.json", self.host);
        let body = get(&self.transport, &url).await?;
        serde_json::from_slice(&body).map_err(|source| CredentialError::Decode { url, source })
    }
}

/// Client for the auth service, exchanging metadata tokens for app keys.
#[derive(Clone, Debug)]
pub struct Authenticator<T = HyperTransport> {
    transport: T,
    host: String,
}

impl<T: HttpTransport> Authenticator<T> {
    /// Creates a new `Authenticator` for `host`.
    pub fn new<H: AsRef<str>>(transport: T, host: H) -> Self {
        Self { transport, host: host.as_ref().trim_end_matches('/').to_string() }
    }

    /// Exchanges a metadata auth token for an app key.
    ///
    /// ## Errors
    ///
    /// Returns [`CredentialError::InvalidToken`] if the auth service reports the token as invalid,
    /// whatever the response status.
    pub async fn app_key(&self, token: &str) -> Result<String, CredentialError> {
        let url = format!("{}/v1/appkey/droplet-auth-token", self.host);
        let authorization = HeaderValue::from_str(&format!("DOMETADATA {token}"))
            .map(|mut value| {
                value.set_sensitive(true);
                value
            })
            .map_err(|_| CredentialError::InvalidToken)?;

        let uri = parse_url(&url)?;
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(AUTHORIZATION, authorization)
            .body(Full::new(Bytes::new()))
            .map_err(TransportError::from)?;

        let response = self.transport.request(request).await?;
        let body = String::from_utf8_lossy(response.body());
        if body.contains(INVALID_TOKEN_MARKER) {
            return Err(CredentialError::InvalidToken);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::UnexpectedStatus { url, status });
        }

        debug!(%url, "Obtained app key.");
        Ok(trim_value(&body).to_string())
    }
}

async fn get<T: HttpTransport>(transport: &T, url: &str) -> Result<Bytes, CredentialError> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(parse_url(url)?)
        .body(Full::new(Bytes::new()))
        .map_err(TransportError::from)?;

    let response = transport.request(request).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CredentialError::UnexpectedStatus { url: url.to_string(), status });
    }

    debug!(%url, bytes = response.body().len(), "Fetched metadata.");
    Ok(response.into_body())
}

/// Checks that `host` is an absolute `http` or `https` URL.
pub fn validate_host(host: &str) -> Result<(), CredentialError> {
    let uri = parse_url(host)?;
    match (uri.scheme_str(), uri.authority()) {
        (Some("http" | "https"), Some(_)) => Ok(()),
        _ => Err(CredentialError::InvalidUrl {
            url: host.to_string(),
            reason: "expected an absolute http or https URL".to_string(),
        }),
    }
}

fn parse_url(url: &str) -> Result<Uri, CredentialError> {
    Uri::try_from(url)
        .map_err(|e| CredentialError::InvalidUrl { url: url.to_string(), reason: e.to_string() })
}

fn trim_value(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}
