use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{header, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::RegistryConfig;
use crate::dto::image::{ImageReference, DOCKER_HUB_DOMAIN};

use super::{RegistryError, TagRegistry};

/// The host that serves the registry API for `docker.io` images.
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";
/// Upper bound on `Link` pages followed for one listing.
const MAX_TAG_PAGES: usize = 1000;

lazy_static! {
    static ref CHALLENGE_PARAM_REGEX: Regex = Regex::new(r#"(\w+)="([^"]*)""#).unwrap();
    static ref NEXT_LINK_REGEX: Regex = Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).unwrap();
}

/// Body of `/v2/<name>/tags/list`.
#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[allow(dead_code)]
    name: Option<String>,
    tags: Option<Vec<String>>,
}

/// Body of a token endpoint response, registries use either key.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// A parsed `WWW-Authenticate: Bearer ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    pub fn parse(header: &str) -> Result<Self, RegistryError> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ')
            .ok_or_else(|| RegistryError::Challenge(format!("malformed challenge '{}'", header)))?;

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(RegistryError::Challenge(format!("unsupported auth scheme '{}'", scheme)));
        }

        let params: HashMap<String, String> = CHALLENGE_PARAM_REGEX.captures_iter(params)
            .map(|c| (c[1].to_lowercase(), c[2].to_string()))
            .collect();

        let realm = params.get("realm")
            .cloned()
            .ok_or_else(|| RegistryError::Challenge("challenge has no realm".to_string()))?;

        Ok(Self {
            realm,
            service: params.get("service").cloned(),
            scope: params.get("scope").cloned(),
        })
    }
}

/// Find the `rel="next"` target in a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    NEXT_LINK_REGEX.captures(header).map(|c| c[1].to_string())
}

/// Client for the tag listing endpoint of the OCI distribution API.
///
/// Only anonymous access is supported. When a registry answers with a bearer challenge an
/// anonymous pull token is requested and the listing is retried once with it.
pub struct DistributionClient {
    http: reqwest::Client,
    timeout: Duration,
    insecure: HashSet<String>,
    page_size: Option<u32>,
}

impl DistributionClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("swarm-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            timeout,
            insecure: config.insecure.iter().cloned().collect(),
            page_size: config.page_size,
        })
    }

    /// The base url of the registry API that serves `domain`.
    pub fn base_url(&self, domain: &str) -> String {
        let host = if domain == DOCKER_HUB_DOMAIN { DOCKER_HUB_API_HOST } else { domain };
        let scheme = if self.insecure.contains(domain) { "http" } else { "https" };

        format!("{}://{}", scheme, host)
    }

    fn request_error(&self, e: reqwest::Error) -> RegistryError {
        if e.is_timeout() {
            RegistryError::Timeout(self.timeout)
        } else {
            RegistryError::Transport(e)
        }
    }

    async fn get(&self, url: &str, token: Option<&str>) -> Result<Response, RegistryError> {
        let mut request = self.http.get(url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        trace!("GET {}", url);
        request.send().await.map_err(|e| self.request_error(e))
    }

    /// Request an anonymous pull token for `path`.
    async fn fetch_token(&self, challenge: &BearerChallenge, path: &str) -> Result<String, RegistryError> {
        let scope = challenge.scope.clone()
            .unwrap_or_else(|| format!("repository:{}:pull", path));

        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }

        debug!("Requesting anonymous registry token from {}", challenge.realm);
        let response = self.http.get(&challenge.realm)
            .query(&query)
            .send().await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            return Err(RegistryError::Status {
                status: response.status().as_u16(),
                url: challenge.realm.clone(),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| self.request_error(e))?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RegistryError::InvalidResponse("token response has no token".to_string()))
    }
}

#[async_trait]
impl TagRegistry for DistributionClient {
    async fn list_tags(&self, image: &ImageReference) -> Result<Vec<String>, RegistryError> {
        let base = self.base_url(&image.domain);
        let mut url = format!("{}/v2/{}/tags/list", base, image.path);
        if let Some(n) = self.page_size {
            url += &format!("?n={}", n);
        }

        let mut token: Option<String> = None;
        let mut tags = Vec::new();
        let mut visited = HashSet::new();

        loop {
            if visited.len() >= MAX_TAG_PAGES {
                return Err(RegistryError::InvalidResponse(
                    format!("tag listing of {} exceeds {} pages", image.canonical_name(), MAX_TAG_PAGES)
                ));
            }
            visited.insert(url.clone());

            let mut response = self.get(&url, token.as_deref()).await?;

            if response.status() == StatusCode::UNAUTHORIZED && token.is_none() {
                let challenge = response.headers()
                    .get(header::WWW_AUTHENTICATE)
                    .and_then(|h| h.to_str().ok())
                    .ok_or_else(|| RegistryError::Challenge("missing WWW-Authenticate header".to_string()))?;
                let challenge = BearerChallenge::parse(challenge)?;

                token = Some(self.fetch_token(&challenge, &image.path).await?);
                response = self.get(&url, token.as_deref()).await?;
            }

            if !response.status().is_success() {
                return Err(RegistryError::Status {
                    status: response.status().as_u16(),
                    url,
                });
            }

            let next = response.headers()
                .get(header::LINK)
                .and_then(|h| h.to_str().ok())
                .and_then(next_link);

            let page: TagListResponse = response.json().await.map_err(|e| self.request_error(e))?;
            tags.extend(page.tags.unwrap_or_default());

            url = match next {
                Some(next) if next.starts_with("http://") || next.starts_with("https://") => next,
                Some(next) => format!("{}{}", base, next),
                None => break,
            };

            if visited.contains(&url) {
                return Err(RegistryError::InvalidResponse(
                    format!("tag listing of {} links back to {}", image.canonical_name(), url)
                ));
            }
        }

        debug!("Registry lists {} tags for {}", tags.len(), image.canonical_name());
        Ok(tags)
    }
}
