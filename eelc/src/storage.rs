//! [`ObjectStore`] backed by the Cloud Storage JSON API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use eelc_core::contract::ObjectStore;
use eelc_core::error::ServiceError;

use crate::auth::TokenProvider;
use crate::http::{authorised, send_json};

pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

pub struct GcsClient {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    tokens: Arc<TokenProvider>,
}

/// One page of `objects.list`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPage {
    #[serde(default)]
    pub items: Vec<ObjectResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectResource {
    pub name: String,
}

impl GcsClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenProvider>, bucket: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            bucket: bucket.into(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn list_url(&self) -> String {
        format!("{}/storage/v1/b/{}/o", self.base_url, self.bucket)
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<ObjectPage, ServiceError> {
        let mut request = self
            .http
            .get(self.list_url())
            .query(&[("fields", "items(name),nextPageToken")]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        let request = authorised(&self.tokens, request).await?;
        send_json("objects.list", request).await
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn list_object_names(&self) -> Result<Vec<String>, ServiceError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(page_token.as_deref()).await?;
            debug!(bucket = %self.bucket, items = page.items.len(), "Listed object page");
            names.extend(page.items.into_iter().map(|o| o.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        info!(bucket = %self.bucket, objects = names.len(), "Listed bucket");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing_page() {
        let page: ObjectPage = serde_json::from_str(
            r#"{
                "items": [
                    {"name": "lc_glob_2017_1970_13_1.tif"},
                    {"name": "lc_glob_2017_1970_13_2.tif"}
                ],
                "nextPageToken": "CgRmb28x"
            }"#,
        )
        .unwrap();
        let names: Vec<_> = page.items.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["lc_glob_2017_1970_13_1.tif", "lc_glob_2017_1970_13_2.tif"]);
        assert_eq!(page.next_page_token.as_deref(), Some("CgRmb28x"));
    }

    #[test]
    fn empty_bucket_has_no_items_field() {
        let page: ObjectPage = serde_json::from_str(r#"{"kind": "storage#objects"}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn list_url_uses_bucket_and_base() {
        let key = crate::auth::ServiceAccountKey::from_json(
            r#"{"client_email": "a@b", "private_key": "pem"}"#,
            std::path::Path::new("k.json"),
        )
        .unwrap();
        let tokens = Arc::new(TokenProvider::new(reqwest::Client::new(), key));
        let client = GcsClient::new(reqwest::Client::new(), tokens, "chips")
            .with_base_url("http://localhost:4443/");
        assert_eq!(client.list_url(), "http://localhost:4443/storage/v1/b/chips/o");
    }
}
