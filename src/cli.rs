//! Command-line flags and the top-level run.

use crate::api::{API_CONTACTS, AdminDirectory, Api};
use crate::auth::{ClientSource, HandshakeSettings, InteractiveSource, OAuthClient, ServiceSource};
use crate::config::{Config, Endpoints, ScopeSet};
use crate::dispatch::{Dispatcher, Query};
use crate::error::{Error, Result};
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Flags accepted with a single leading dash, e.g. `-keyfile=key.json`.
const LONG_FLAGS: &[&str] = &[
    "keyfile", "clientid", "secret", "domain", "customer", "account", "api", "accounts", "max",
    "config",
];

/// List Google contacts for one account or every account in a domain
#[derive(Parser, Debug)]
#[command(name = "gcontacts", version, about)]
pub struct Cli {
    /// OAuth v2 service account key file (JSON)
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,

    /// OAuth v2 client ID
    #[arg(long, value_name = "ID")]
    pub clientid: Option<String>,

    /// OAuth v2 client secret
    #[arg(long)]
    pub secret: Option<String>,

    /// Domain to interrogate via the directory API
    #[arg(long)]
    pub domain: Option<String>,

    /// Customer to interrogate via the directory API
    #[arg(long)]
    pub customer: Option<String>,

    /// Email address of account to interrogate (or delegate for directory listings)
    #[arg(long)]
    pub account: Option<String>,

    /// API to use ("contacts" or "people")
    #[arg(long, default_value = API_CONTACTS)]
    pub api: String,

    /// Restricts returned contacts to those matching query (contacts API only)
    #[arg(short = 'q', value_name = "QUERY")]
    pub query: Option<String>,

    /// Maximum number of accounts to retrieve
    #[arg(long = "accounts", default_value_t = 500, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_accounts: u32,

    /// Maximum number of contacts to retrieve per account
    #[arg(long = "max", default_value_t = 500, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_contacts: u32,

    /// Settings file (TOML); defaults to $GCONTACTS_CONFIG or the user config dir
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// How this run authenticates. Exactly one is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Keyfile(PathBuf),
    Client { id: String, secret: String },
}

fn or_empty(value: Option<&String>) -> String {
    value.cloned().unwrap_or_default()
}

impl Cli {
    /// Parse the process arguments, accepting single-dash long flags.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Full usage text, printed after usage errors.
    #[must_use]
    pub fn usage() -> String {
        let mut command = Self::command();
        command.render_help().to_string()
    }

    pub fn api(&self) -> Result<Api> {
        self.api.parse()
    }

    #[must_use]
    pub fn query(&self) -> Query {
        Query {
            customer: or_empty(self.customer.as_ref()),
            domain: or_empty(self.domain.as_ref()),
            account: or_empty(self.account.as_ref()),
            search: or_empty(self.query.as_ref()),
            max_accounts: self.max_accounts,
            max_contacts: self.max_contacts,
        }
    }

    /// Pick the credential strategy; a keyfile wins over a client ID.
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(keyfile) = self.keyfile.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Credentials::Keyfile(keyfile.clone()));
        }

        let id = or_empty(self.clientid.as_ref());
        if id.is_empty() {
            return Err(Error::Usage("No keyfile or client ID provided".into()));
        }
        let secret = or_empty(self.secret.as_ref());
        if secret.is_empty() {
            return Err(Error::Usage("No secret provided".into()));
        }
        Ok(Credentials::Client { id, secret })
    }
}

/// Rewrite `-flag` / `-flag=value` to `--flag` for the known long flags.
///
/// Everything after a bare `--` is left alone.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            if passthrough {
                return arg;
            }
            let Some(s) = arg.to_str() else {
                return arg;
            };
            if s == "--" {
                passthrough = true;
                return arg;
            }
            if let Some(rest) = s.strip_prefix('-')
                && !rest.starts_with('-')
                && LONG_FLAGS.contains(&rest.split('=').next().unwrap_or_default())
            {
                return OsString::from(format!("-{s}"));
            }
            arg
        })
        .collect()
}

/// Build the credential source for the chosen strategy.
pub async fn build_source(
    credentials: Credentials,
    scopes: ScopeSet,
    config: &Config,
) -> Result<Arc<dyn ClientSource>> {
    match credentials {
        Credentials::Keyfile(path) => Ok(Arc::new(ServiceSource::from_keyfile(&path, scopes)?)),
        Credentials::Client { id, secret } => {
            let client = OAuthClient::new(id, secret, scopes, &config.endpoints)?;
            let source =
                InteractiveSource::authorize(client, &HandshakeSettings::from(config)).await?;
            Ok(Arc::new(source))
        }
    }
}

/// Wire the selected adapter and the directory to one credential source.
#[must_use]
pub fn build_dispatcher(
    api: Api,
    source: Arc<dyn ClientSource>,
    endpoints: &Endpoints,
) -> Dispatcher {
    Dispatcher::new(
        api.adapter(Arc::clone(&source), endpoints),
        Box::new(AdminDirectory::new(source, &endpoints.directory_url)),
    )
}

/// Run the whole listing described by the flags.
pub async fn run(cli: Cli) -> Result<()> {
    let credentials = cli.credentials()?;
    let api = cli.api()?;
    let query = cli.query();
    query.validate()?;

    let config = Config::load(cli.config.as_deref())?;
    let scopes = ScopeSet::new(query.uses_directory());
    tracing::debug!(?api, scopes = %scopes.joined(), "starting");

    let source = build_source(credentials, scopes, &config).await?;
    let dispatcher = build_dispatcher(api, source, &config.endpoints);

    eprintln!("{}\n", query.describe(api));
    dispatcher.run(&query, &mut io::stdout()).await
}
