//! Credential sources for Google APIs.
//!
//! Two strategies produce [`AuthorizedClient`]s:
//! - [`ServiceSource`]: a service-account key that may impersonate any account
//!   in a domain with delegated authority.
//! - [`InteractiveSource`]: one user's consent, obtained through the browser.

mod client;
mod pkce;
mod server;
mod token;

pub mod interactive;
pub mod service;

pub use client::{AuthorizedClient, TokenProvider};
pub use interactive::{HandshakeSettings, InteractiveSource, OAuthClient};
pub use service::{JwtConfig, ServiceSource};
pub use token::Token;

use crate::error::Result;

/// A source of pre-authenticated HTTP clients.
pub trait ClientSource: Send + Sync {
    /// Client acting as `subject`; an empty subject uses the source's own identity.
    fn client(&self, subject: &str) -> Result<AuthorizedClient>;
}

#[cfg(test)]
pub(crate) use client::tests::StaticToken;
