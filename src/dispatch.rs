//! Runs the listing for one account or every account in an organization.

use crate::api::{AccountDirectory, Api, ContactAdapter, render_listing};
use crate::error::{Error, Result};
use std::io::Write;

/// What to list, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub customer: String,
    pub domain: String,
    pub account: String,
    /// Free-text filter (contacts API only).
    pub search: String,
    pub max_accounts: u32,
    pub max_contacts: u32,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            customer: String::new(),
            domain: String::new(),
            account: String::new(),
            search: String::new(),
            max_accounts: 500,
            max_contacts: 500,
        }
    }
}

impl Query {
    /// Whether accounts come from the directory rather than `account`.
    #[must_use]
    pub fn uses_directory(&self) -> bool {
        !self.customer.is_empty() || !self.domain.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.uses_directory() && self.account.is_empty() {
            return Err(Error::Usage(
                "No customer, domain or account specified".into(),
            ));
        }
        Ok(())
    }

    /// One-line summary of what the run will show.
    #[must_use]
    pub fn describe(&self, api: Api) -> String {
        let searching = !self.search.is_empty() && api.supports_search();

        let mut api_desc = api.display_name().to_string();
        if self.uses_directory() {
            api_desc.push_str(" and Google Admin Directory API");
        }

        let mut scope = if searching { "contacts" } else { "all contacts" }.to_string();
        if self.uses_directory() {
            if !self.customer.is_empty() {
                scope = format!("{scope} for customer \"{}\"", self.customer);
            }
            if !self.domain.is_empty() {
                scope = format!("{scope} within domain \"{}\"", self.domain);
            }
        } else {
            scope = format!("{scope} for account \"{}\"", self.account);
        }

        if searching {
            format!("Showing {scope} matching \"{}\" using {api_desc}.", self.search)
        } else {
            format!("Showing {scope} using {api_desc}.")
        }
    }
}

/// Fetch and print the contacts of one account.
pub async fn list_account(
    adapter: &dyn ContactAdapter,
    account: &str,
    search: &str,
    max_contacts: u32,
    out: &mut dyn Write,
) -> Result<()> {
    if account.is_empty() {
        return Err(Error::Usage("No account specified".into()));
    }

    let contacts = adapter.fetch(account, search, max_contacts).await?;
    render_listing(out, account, &contacts)?;
    Ok(())
}

/// Binds the adapter and directory chosen at startup.
pub struct Dispatcher {
    adapter: Box<dyn ContactAdapter>,
    directory: Box<dyn AccountDirectory>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(adapter: Box<dyn ContactAdapter>, directory: Box<dyn AccountDirectory>) -> Self {
        Self { adapter, directory }
    }

    /// List every directory member, or the single account, to `out`.
    ///
    /// Stops at the first failure; accounts already printed stay printed.
    pub async fn run(&self, query: &Query, out: &mut dyn Write) -> Result<()> {
        query.validate()?;

        if !query.uses_directory() {
            return list_account(
                self.adapter.as_ref(),
                &query.account,
                &query.search,
                query.max_contacts,
                out,
            )
            .await;
        }

        let users = self
            .directory
            .list_users(
                &query.customer,
                &query.domain,
                &query.account,
                query.max_accounts,
            )
            .await?;

        if users.is_empty() {
            writeln!(out, "No users found.")?;
            return Ok(());
        }

        for user in users.iter().filter(|u| !u.primary_email.is_empty()) {
            list_account(
                self.adapter.as_ref(),
                &user.primary_email,
                &query.search,
                query.max_contacts,
                out,
            )
            .await?;
        }
        Ok(())
    }
}
