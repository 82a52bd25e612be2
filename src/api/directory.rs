//! Admin SDK Directory `users.list`.

use crate::auth::ClientSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// A member account returned by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    #[serde(default)]
    pub primary_email: String,
}

#[derive(Debug, Default, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<DirectoryUser>,
}

/// Lists the accounts of an organization.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Users filtered by customer and/or domain, in the order the directory returns them.
    ///
    /// `delegate` is the account the request is made as (empty = default identity).
    async fn list_users(
        &self,
        customer: &str,
        domain: &str,
        delegate: &str,
        max_accounts: u32,
    ) -> Result<Vec<DirectoryUser>>;
}

pub struct AdminDirectory {
    source: Arc<dyn ClientSource>,
    base_url: String,
}

impl AdminDirectory {
    pub fn new(source: Arc<dyn ClientSource>, base_url: &str) -> Self {
        Self {
            source,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AccountDirectory for AdminDirectory {
    async fn list_users(
        &self,
        customer: &str,
        domain: &str,
        delegate: &str,
        max_accounts: u32,
    ) -> Result<Vec<DirectoryUser>> {
        if customer.is_empty() && domain.is_empty() {
            return Err(Error::Usage(
                "A customer or domain must be provided in order to list a directory".into(),
            ));
        }

        let client = self.source.client(delegate)?;
        let mut params = vec![("maxResults", max_accounts.to_string())];
        if !customer.is_empty() {
            params.push(("customer", customer.to_string()));
        }
        if !domain.is_empty() {
            params.push(("domain", domain.to_string()));
        }

        let response: UsersResponse = client
            .get_json(&format!("{}/users", self.base_url), &params)
            .await
            .map_err(|e| match e {
                Error::Upstream(msg) => {
                    Error::Upstream(format!("Unable to retrieve directory listing: {msg}"))
                }
                other => other,
            })?;

        tracing::debug!(count = response.users.len(), "directory listing received");
        Ok(response.users)
    }
}
