//! In-memory site for environment tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use wayfarer_core::error::EnvironmentError;

use crate::fetch::{FetchedPage, Fetcher, PageRequest};

/// Serves fixed HTML by URL and records every request made.
///
/// Lookups ignore the query string when there is no exact match.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct StaticSite {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<PageRequest>>,
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StaticSite {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage, EnvironmentError> {
        self.requests.lock().unwrap().push(request.clone());

        let url = request.url();
        let without_query = url.split('?').next().unwrap_or(url);
        let (status, body) = match self.pages.get(url).or_else(|| self.pages.get(without_query)) {
            Some(body) => (200, body.clone()),
            None => (404, "<title>Not Found</title><p>Not Found</p>".to_string()),
        };

        Ok(FetchedPage {
            url: url.to_string(),
            status,
            content_type: "text/html".into(),
            body,
        })
    }
}
