//! Google API adapters and contact listing output.

pub mod contacts;
pub mod directory;
pub mod people;

pub use contacts::ContactsAdapter;
pub use directory::{AccountDirectory, AdminDirectory, DirectoryUser};
pub use people::PeopleAdapter;

use crate::auth::ClientSource;
use crate::config::Endpoints;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

pub const API_CONTACTS: &str = "contacts";
pub const API_PEOPLE: &str = "people";

/// Which backend serves the per-account listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    Contacts,
    People,
}

impl Api {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Contacts => API_CONTACTS,
            Self::People => API_PEOPLE,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Contacts => "Google Contacts API",
            Self::People => "Google People API",
        }
    }

    /// Only the contacts feed accepts a free-text query.
    #[must_use]
    pub fn supports_search(self) -> bool {
        matches!(self, Self::Contacts)
    }

    /// Build the adapter for this API. Chosen once per run.
    #[must_use]
    pub fn adapter(
        self,
        source: Arc<dyn ClientSource>,
        endpoints: &Endpoints,
    ) -> Box<dyn ContactAdapter> {
        match self {
            Self::Contacts => Box::new(ContactsAdapter::new(source, &endpoints.contacts_url)),
            Self::People => Box::new(PeopleAdapter::new(source, &endpoints.people_url)),
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Api {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_api(s).as_str() {
            API_CONTACTS => Ok(Self::Contacts),
            API_PEOPLE => Ok(Self::People),
            other => Err(Error::Usage(format!("\"{other}\" is not a known API"))),
        }
    }
}

/// Normalize an API name: lower-case it and resolve singular aliases.
///
/// Unknown names pass through lower-cased.
#[must_use]
pub fn parse_api(api: &str) -> String {
    let api = api.to_lowercase();
    match api.as_str() {
        "contact" => API_CONTACTS.to_string(),
        "person" => API_PEOPLE.to_string(),
        _ => api,
    }
}

/// One contact, projected from either API's record shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
}

/// Fetches the contacts visible to one account.
#[async_trait]
pub trait ContactAdapter: Send + Sync {
    /// Perform one request for `account`, bounded by `max_contacts`.
    async fn fetch(&self, account: &str, query: &str, max_contacts: u32) -> Result<Vec<Contact>>;
}

/// Write the listing for one account.
pub fn render_listing(out: &mut dyn Write, account: &str, contacts: &[Contact]) -> io::Result<()> {
    writeln!(out, "{account}: {} contact(s)", contacts.len())?;
    for (i, contact) in contacts.iter().enumerate() {
        writeln!(
            out,
            "  {i:>3}: \"{}\"{}{}",
            contact.name,
            format_emails(&contact.emails),
            format_phones(&contact.phones)
        )?;
    }
    Ok(())
}

fn format_emails(emails: &[String]) -> String {
    if emails.is_empty() {
        return String::new();
    }
    let tokens: Vec<String> = emails.iter().map(|e| format!("<{e}>")).collect();
    format!(" {}", tokens.join(", "))
}

fn format_phones(phones: &[String]) -> String {
    if phones.is_empty() {
        return String::new();
    }
    format!(" [ {} ]", phones.join(", "))
}
