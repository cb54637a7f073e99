//! Spotify authorization: PKCE login over a loopback redirect, token refresh,
//! and the `ensure_client` entry point used by every feature view.

pub mod callback;
pub mod credential;
pub mod exchange;
pub mod pkce;
pub mod provider;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::{Duration, SystemTime},
};

use crate::{config::Config, error::Error, util::unix_millis};

pub use credential::Credential;
pub use exchange::{Authorizer, FormResponse, TokenEndpoint, UreqTokenEndpoint};
pub use provider::TokenProvider;

pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

pub const REDIRECT_ADDRESS: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8888);
pub const CALLBACK_PATH: &str = "/callback";

// Interactive login gives up after this long without a callback.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// Tokens expiring within this margin are renewed before use.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_SCOPES: &[&str] = &[
    "user-library-read",
    "user-library-modify",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "user-read-recently-played",
    "user-top-read",
    "user-follow-read",
    "user-follow-modify",
    "user-read-private",
    "user-read-email",
];

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_address: SocketAddr,
    pub login_timeout: Duration,
    pub refresh_margin: Duration,
    pub proxy_url: Option<String>,
}

impl AuthConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            redirect_address: REDIRECT_ADDRESS,
            login_timeout: LOGIN_TIMEOUT,
            refresh_margin: REFRESH_MARGIN,
            proxy_url: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            scopes: config.scopes.clone(),
            proxy_url: Config::proxy(),
            ..Self::new(config.client_id().unwrap_or_default())
        }
    }

    pub fn client_id(&self) -> Result<&str, Error> {
        let id = self.client_id.trim();
        if id.is_empty() {
            Err(Error::Configuration)
        } else {
            Ok(id)
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.redirect_address, CALLBACK_PATH)
    }
}

/// Wall clock in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        unix_millis(SystemTime::now())
    }
}

/// Opens the authorization URL for the user.
pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> Result<(), Error>;
}

pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), Error> {
        open::that(url)?;
        Ok(())
    }
}

impl<F> Browser for F
where
    F: Fn(&str) -> Result<(), Error> + Send + Sync,
{
    fn open(&self, url: &str) -> Result<(), Error> {
        self(url)
    }
}

/// Surfaces terminal failures to the user.
pub trait Notifier: Send + Sync {
    fn notify_failure(&self, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_failure(&self, message: &str) {
        log::error!("{}", message);
    }
}
