//! Per-invocation state shared by the loader, scanners and installer.

use std::collections::HashMap;

use crate::config::{Config, DEFAULT_MAX_SKILL_PROBES};
use crate::error::Result;
use crate::http::{Endpoints, HttpClient, RateLimitInfo};
use crate::marketplace::tree::TreeLookup;

pub struct Session {
    pub(crate) http: HttpClient,
    pub(crate) endpoints: Endpoints,
    pub(crate) trees: HashMap<String, TreeLookup>,
    pub(crate) max_skill_probes: usize,
}

impl Session {
    pub fn new(http: HttpClient, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            trees: HashMap::new(),
            max_skill_probes: DEFAULT_MAX_SKILL_PROBES,
        }
    }

    /// Build a session from user configuration (tokens read from env)
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = HttpClient::new(config.timeout(), config.github_token(), config.gitlab_token())?;
        Ok(Self::new(http, config.endpoints()).with_max_skill_probes(config.scan.max_skill_probes))
    }

    pub fn with_max_skill_probes(mut self, max: usize) -> Self {
        self.max_skill_probes = max;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn http(&mut self) -> &mut HttpClient {
        &mut self.http
    }

    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        self.http.rate_limit()
    }

    pub fn request_count(&self) -> usize {
        self.http.request_count()
    }

    pub fn has_github_token(&self) -> bool {
        self.http.has_token(crate::http::Auth::GitHub)
    }
}
