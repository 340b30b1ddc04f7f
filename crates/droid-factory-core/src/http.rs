//! HTTP fetch layer
//!
//! Blocking GET with manual redirect following, optional bearer auth and
//! rate-limit header capture. Non-2xx responses are returned as values so
//! callers can tell "404, directory absent" apart from real failures.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{DEFAULT_GITHUB_API, DEFAULT_GITHUB_RAW, DEFAULT_GITLAB};
use crate::error::{DroidFactoryError, Result};

/// Redirect hops followed before giving up
pub const MAX_REDIRECTS: usize = 5;

/// `remaining` at or below this triggers a warning
pub const LOW_RATE_LIMIT_THRESHOLD: u64 = 5;

const USER_AGENT: &str = concat!("droid-factory/", env!("CARGO_PKG_VERSION"));

/// Base URLs for the remote providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub github_api: String,
    pub github_raw: String,
    pub gitlab: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_api: DEFAULT_GITHUB_API.to_string(),
            github_raw: DEFAULT_GITHUB_RAW.to_string(),
            gitlab: DEFAULT_GITLAB.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every provider at one base URL (mock servers)
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            github_api: base.clone(),
            github_raw: base.clone(),
            gitlab: base,
        }
    }

    /// Raw-content URL for a file in a GitHub repository
    pub fn github_raw_url(&self, owner: &str, repo: &str, git_ref: &str, path: &str) -> Result<String> {
        let mut segments = vec![owner, repo];
        segments.extend(path_segments(git_ref));
        segments.extend(path_segments(path));
        build_url(&self.github_raw, &segments, &[])
    }

    /// Raw-content URL for a file in a GitLab project
    pub fn gitlab_raw_url(
        &self,
        namespace_path: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String> {
        let mut segments = path_segments(namespace_path);
        segments.push(repo);
        segments.extend(["-", "raw"]);
        segments.extend(path_segments(git_ref));
        segments.extend(path_segments(path));
        build_url(&self.gitlab, &segments, &[])
    }
}

/// Which token, if any, accompanies a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    None,
    GitHub,
    GitLab,
}

/// Last observed rate-limit state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    pub reset: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Parse GitHub (`x-ratelimit-*`) or GitLab (`ratelimit-*`) headers
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        for prefix in ["x-ratelimit-", "ratelimit-"] {
            let limit = header_u64(headers, &format!("{}limit", prefix));
            let remaining = header_u64(headers, &format!("{}remaining", prefix));
            if let (Some(limit), Some(remaining)) = (limit, remaining) {
                let reset = header_u64(headers, &format!("{}reset", prefix))
                    .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single());
                return Some(Self {
                    limit,
                    remaining,
                    reset,
                    fetched_at: Utc::now(),
                });
            }
        }
        None
    }

    pub fn is_low(&self) -> bool {
        self.remaining <= LOW_RATE_LIMIT_THRESHOLD
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Turn a non-2xx response into `HttpStatus`
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DroidFactoryError::HttpStatus {
                status: self.status,
                url: self.url,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Blocking HTTP client carrying tokens and the last rate-limit snapshot
pub struct HttpClient {
    client: Client,
    github_token: Option<String>,
    gitlab_token: Option<String>,
    rate_limit: Option<RateLimitInfo>,
    requests: usize,
}

impl HttpClient {
    pub fn new(
        timeout: Duration,
        github_token: Option<String>,
        gitlab_token: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            github_token,
            gitlab_token,
            rate_limit: None,
            requests: 0,
        })
    }

    /// Last rate-limit headers seen, if any
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        self.rate_limit.as_ref()
    }

    /// Number of requests sent, redirect hops included
    pub fn request_count(&self) -> usize {
        self.requests
    }

    pub fn has_token(&self, auth: Auth) -> bool {
        self.token_for(auth).is_some()
    }

    fn token_for(&self, auth: Auth) -> Option<&str> {
        match auth {
            Auth::None => None,
            Auth::GitHub => self.github_token.as_deref(),
            Auth::GitLab => self.gitlab_token.as_deref(),
        }
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] redirects.
    ///
    /// The token is only sent while the request stays on the original host and port.
    pub fn get(&mut self, url: &str, auth: Auth) -> Result<HttpResponse> {
        let mut current = Url::parse(url).map_err(|e| DroidFactoryError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let origin = origin_of(&current);
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(current.clone());
            if origin_of(&current) == origin {
                if let Some(token) = self.token_for(auth) {
                    request = request.bearer_auth(token);
                }
            }

            debug!(url = %current, redirects, "GET");
            self.requests += 1;
            let response = request.send()?;
            let status = response.status();
            let headers = response.headers().clone();

            if let Some(info) = RateLimitInfo::from_headers(&headers) {
                debug!(remaining = info.remaining, limit = info.limit, "rate limit");
                self.rate_limit = Some(info);
            }

            if status.is_redirection() {
                if let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) {
                    if redirects == MAX_REDIRECTS {
                        return Err(DroidFactoryError::TooManyRedirects {
                            url: url.to_string(),
                        });
                    }
                    let next = current
                        .join(location)
                        .map_err(|e| DroidFactoryError::InvalidUrl {
                            url: location.to_string(),
                            message: e.to_string(),
                        })?;
                    debug!(from = %current, to = %next, "redirect");
                    current = next;
                    redirects += 1;
                    continue;
                }
            }

            let body = response.bytes()?.to_vec();
            debug!(status = status.as_u16(), bytes = body.len(), "response");
            return Ok(HttpResponse {
                status: status.as_u16(),
                url: current.to_string(),
                headers,
                body,
            });
        }
    }
}

fn origin_of(url: &Url) -> (Option<String>, Option<u16>) {
    (url.host_str().map(str::to_string), url.port_or_known_default())
}

/// Split a slash path into non-empty segments, dropping `.`
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Append percent-encoded `segments` and `query` to `base`.
///
/// Each segment is encoded on its own, so a segment containing `/`
/// becomes `%2F` (GitLab project ids rely on this).
pub fn build_url(base: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(base).map_err(|e| DroidFactoryError::InvalidUrl {
        url: base.to_string(),
        message: e.to_string(),
    })?;

    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| DroidFactoryError::InvalidUrl {
                url: base.to_string(),
                message: "cannot be a base URL".to_string(),
            })?;
        path.pop_if_empty();
        path.extend(segments);
    }

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    Ok(url.to_string())
}

/// Whether `s` looks like an http(s) URL
pub fn is_url(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
