use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    error::Error,
    store::{PreferenceStore, PKCE_STATE_KEY, PKCE_VERIFIER_KEY},
    webapi::{WebApi, WebApiHandle},
};

use super::{
    credential::Credential,
    exchange::{self, Authorizer, TokenEndpoint, UreqTokenEndpoint},
    AuthConfig, Browser, Clock, LogNotifier, Notifier, SystemBrowser, SystemClock,
};

/// Hands out a Web API client backed by a usable token, renewing or logging
/// in as needed.  The built client is kept and reused for as long as the
/// stored token it was built from stays current.
pub struct TokenProvider {
    config: AuthConfig,
    store: Arc<dyn PreferenceStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    clock: Arc<dyn Clock>,
    browser: Arc<dyn Browser>,
    notifier: Arc<dyn Notifier>,
    client: Mutex<Option<WebApiHandle>>,
}

impl TokenProvider {
    pub fn new(config: AuthConfig, store: Arc<dyn PreferenceStore>) -> Self {
        let endpoint = UreqTokenEndpoint::new(config.token_url.clone(), config.proxy_url.as_deref());
        Self {
            config,
            store,
            endpoint: Arc::new(endpoint),
            clock: Arc::new(SystemClock),
            browser: Arc::new(SystemBrowser),
            notifier: Arc::new(LogNotifier),
            client: Mutex::new(None),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Return a client with a usable token.  Blocks while refreshing, or for
    /// up to the login timeout while the user authorizes in the browser.
    /// Terminal failures are reported through the notifier and returned.
    pub fn ensure_client(&self) -> Result<WebApiHandle, Error> {
        self.obtain_client().map_err(|err| {
            log::error!("failed to obtain a usable token: {}", err);
            self.notifier.notify_failure(&err.user_message());
            err
        })
    }

    fn obtain_client(&self) -> Result<WebApiHandle, Error> {
        self.config.client_id()?;

        if let Some(credential) = Credential::load(&*self.store) {
            if credential.is_fresh(self.clock.now_millis(), self.config.refresh_margin) {
                return self.client_for(&credential);
            }
            if let Some(refresh_token) = credential.refresh_token.as_deref() {
                log::info!("access token expired, refreshing");
                match exchange::refresh_token(&*self.endpoint, &self.config, refresh_token) {
                    Ok(response) => {
                        let renewed = credential.renewed(response, self.clock.now_millis());
                        renewed.save(&*self.store)?;
                        return self.client_for(&renewed);
                    }
                    Err(err) if err.is_rejection() => {
                        log::warn!("refresh token rejected, logging in again: {}", err);
                        Credential::delete(&*self.store)?;
                        self.invalidate_client();
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        log::info!("no usable token, starting authorization");
        let credential = self.authorizer().login()?;
        credential.save(&*self.store)?;
        self.client_for(&credential)
    }

    fn authorizer(&self) -> Authorizer<'_> {
        Authorizer {
            config: &self.config,
            store: &*self.store,
            endpoint: &*self.endpoint,
            clock: &*self.clock,
            browser: &*self.browser,
        }
    }

    /// Reuse the cached client if it carries this credential's token,
    /// otherwise swap in a freshly built one.
    fn client_for(&self, credential: &Credential) -> Result<WebApiHandle, Error> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            if client.access_token() == credential.access_token {
                return Ok(client.clone());
            }
        }
        let client = Arc::new(WebApi::new(
            credential.access_token.clone(),
            self.config.client_id()?.to_string(),
            self.config.proxy_url.as_deref(),
        ));
        *slot = Some(client.clone());
        Ok(client)
    }

    /// The currently cached client, without checking the token.
    pub fn cached_client(&self) -> Option<WebApiHandle> {
        self.client.lock().clone()
    }

    pub fn invalidate_client(&self) {
        self.client.lock().take();
    }

    pub fn is_logged_in(&self) -> bool {
        Credential::load(&*self.store).is_some()
    }

    pub fn credential(&self) -> Option<Credential> {
        Credential::load(&*self.store)
    }

    /// Forget the stored token and any pending login material.
    pub fn logout(&self) -> Result<(), Error> {
        log::info!("logging out");
        self.invalidate_client();
        Credential::delete(&*self.store)?;
        self.store.remove(PKCE_STATE_KEY)?;
        self.store.remove(PKCE_VERIFIER_KEY)?;
        Ok(())
    }
}
