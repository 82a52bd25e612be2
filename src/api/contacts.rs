//! Contacts (GData v3) feed adapter.

use super::{Contact, ContactAdapter};
use crate::auth::ClientSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::sync::Arc;

const GDATA_VERSION: &str = "3.0";

#[derive(Debug, Default, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feed: Feed,
}

#[derive(Debug, Default, Deserialize)]
struct Feed {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    title: Text,
    #[serde(rename = "gd$email", default)]
    emails: Vec<Email>,
    #[serde(rename = "gd$phoneNumber", default)]
    phones: Vec<Text>,
}

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$t", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Email {
    #[serde(default)]
    address: String,
}

impl From<Entry> for Contact {
    fn from(entry: Entry) -> Self {
        Self {
            name: entry.title.value,
            emails: entry.emails.into_iter().map(|e| e.address).collect(),
            phones: entry.phones.into_iter().map(|p| p.value).collect(),
        }
    }
}

/// Reads `{base}/{account}/full` with the full projection.
pub struct ContactsAdapter {
    source: Arc<dyn ClientSource>,
    base_url: String,
}

impl ContactsAdapter {
    pub fn new(source: Arc<dyn ClientSource>, base_url: &str) -> Self {
        Self {
            source,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn feed_url(&self, account: &str) -> String {
        format!("{}/{}/full", self.base_url, urlencoding::encode(account))
    }
}

#[async_trait]
impl ContactAdapter for ContactsAdapter {
    async fn fetch(&self, account: &str, query: &str, max_contacts: u32) -> Result<Vec<Contact>> {
        let client = self.source.client(account)?;

        let mut params = vec![
            ("alt", "json".to_string()),
            ("v", GDATA_VERSION.to_string()),
            ("max-results", max_contacts.to_string()),
        ];
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("gdata-version"),
            HeaderValue::from_static(GDATA_VERSION),
        );

        let response: FeedResponse = client
            .get_json_with_headers(&self.feed_url(account), &params, headers)
            .await
            .map_err(|e| match e {
                Error::Upstream(msg) => {
                    Error::Upstream(format!("Unable to retrieve contacts for {account}: {msg}"))
                }
                other => other,
            })?;

        Ok(response.feed.entry.into_iter().map(Contact::from).collect())
    }
}
