//! People API connections adapter.
//!
//! Only the first page of connections is read; `nextPageToken` is not followed,
//! so `max_contacts` above the API's page limit still yields one page.

use super::{Contact, ContactAdapter};
use crate::auth::ClientSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const PERSON_FIELDS: &str = "emailAddresses,names,phoneNumbers";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsResponse {
    #[serde(default)]
    connections: Vec<Person>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    #[serde(default)]
    names: Vec<Name>,
    #[serde(default)]
    email_addresses: Vec<Value>,
    #[serde(default)]
    phone_numbers: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Name {
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct Value {
    #[serde(default)]
    value: String,
}

impl From<Person> for Contact {
    fn from(person: Person) -> Self {
        Self {
            name: person
                .names
                .into_iter()
                .next()
                .map(|n| n.display_name)
                .unwrap_or_default(),
            emails: person.email_addresses.into_iter().map(|e| e.value).collect(),
            phones: person.phone_numbers.into_iter().map(|p| p.value).collect(),
        }
    }
}

/// Reads `people/me/connections` for the impersonated account.
pub struct PeopleAdapter {
    source: Arc<dyn ClientSource>,
    base_url: String,
}

impl PeopleAdapter {
    pub fn new(source: Arc<dyn ClientSource>, base_url: &str) -> Self {
        Self {
            source,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ContactAdapter for PeopleAdapter {
    async fn fetch(&self, account: &str, query: &str, max_contacts: u32) -> Result<Vec<Contact>> {
        if !query.is_empty() {
            tracing::warn!(query, "the People API does not support search; query ignored");
        }

        let client = self.source.client(account)?;
        let url = format!("{}/people/me/connections", self.base_url);
        let params = [
            ("personFields", PERSON_FIELDS.to_string()),
            ("pageSize", max_contacts.to_string()),
        ];

        let response: ConnectionsResponse = client
            .get_json(&url, &params)
            .await
            .map_err(|e| match e {
                Error::Upstream(msg) => {
                    Error::Upstream(format!("Unable to retrieve connections for {account}: {msg}"))
                }
                other => other,
            })?;

        if response.next_page_token.is_some() {
            tracing::debug!(account, "more connections available; pagination is not followed");
        }

        Ok(response.connections.into_iter().map(Contact::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connections() {
        let body = r#"{
            "connections": [
                {
                    "resourceName": "people/c1",
                    "names": [{"displayName": "Bob Smith"}, {"displayName": "Robert"}],
                    "emailAddresses": [{"value": "bob@example.com"}, {"value": "rs@example.org"}],
                    "phoneNumbers": [{"value": "555-0100"}]
                },
                {"resourceName": "people/c2"}
            ],
            "nextPageToken": "abc",
            "totalPeople": 3
        }"#;
        let response: ConnectionsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.next_page_token.as_deref(), Some("abc"));

        let contacts: Vec<Contact> = response.connections.into_iter().map(Contact::from).collect();
        assert_eq!(contacts[0].name, "Bob Smith");
        assert_eq!(contacts[0].emails, vec!["bob@example.com", "rs@example.org"]);
        assert_eq!(contacts[0].phones, vec!["555-0100"]);
        assert_eq!(contacts[1], Contact::default());
    }

    #[test]
    fn test_no_connections_field() {
        let response: ConnectionsResponse = serde_json::from_str("{}").unwrap();
        assert!(response.connections.is_empty());
        assert!(response.next_page_token.is_none());
    }
}
