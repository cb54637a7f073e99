use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};

use crate::{
    error::Error,
    store::{PreferenceStore, PKCE_STATE_KEY, PKCE_VERIFIER_KEY},
    util::default_ureq_agent_builder,
};

use super::{
    callback::{Callback, CallbackListener},
    credential::{Credential, TokenResponse},
    pkce::PkceChallenge,
    AuthConfig, Browser, Clock,
};

/// Raw reply of the token endpoint.
#[derive(Clone, Debug)]
pub struct FormResponse {
    pub status: u16,
    pub body: String,
}

impl FormResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Form-encoded POST to the OAuth token endpoint.  No client secret is ever
/// sent.
pub trait TokenEndpoint: Send + Sync {
    fn post_form(&self, params: &[(&str, &str)]) -> Result<FormResponse, Error>;
}

pub struct UreqTokenEndpoint {
    url: String,
    agent: ureq::Agent,
}

impl UreqTokenEndpoint {
    pub fn new(url: impl Into<String>, proxy_url: Option<&str>) -> Self {
        Self {
            url: url.into(),
            agent: default_ureq_agent_builder(proxy_url).build().into(),
        }
    }
}

impl TokenEndpoint for UreqTokenEndpoint {
    fn post_form(&self, params: &[(&str, &str)]) -> Result<FormResponse, Error> {
        let mut response = self
            .agent
            .post(self.url.as_str())
            .header("Accept", "application/json")
            .send_form(params.iter().copied())?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        Ok(FormResponse { status, body })
    }
}

/// Trade an authorization code and its PKCE verifier for a token.
pub fn exchange_code(
    endpoint: &dyn TokenEndpoint,
    config: &AuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse, Error> {
    let client_id = config.client_id()?;
    let redirect_uri = config.redirect_uri();
    let response = endpoint.post_form(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", &redirect_uri),
        ("client_id", client_id),
        ("code_verifier", verifier),
    ])?;
    if !response.is_success() {
        log::error!("token exchange rejected with status {}", response.status);
        return Err(Error::TokenExchange {
            status: response.status,
            body: response.body,
        });
    }
    Ok(serde_json::from_str(&response.body)?)
}

pub fn refresh_token(
    endpoint: &dyn TokenEndpoint,
    config: &AuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse, Error> {
    let client_id = config.client_id()?;
    let response = endpoint.post_form(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
    ])?;
    if !response.is_success() {
        log::warn!("token refresh failed with status {}", response.status);
        return Err(Error::TokenRefresh {
            status: response.status,
            body: response.body,
        });
    }
    Ok(serde_json::from_str(&response.body)?)
}

/// Build the browser-facing authorization URL for one attempt.
pub fn authorize_url(config: &AuthConfig, pkce: &PkceChallenge) -> Result<String, Error> {
    let client = BasicClient::new(
        ClientId::new(config.client_id()?.to_string()),
        None,
        AuthUrl::new(config.authorize_url.clone()).map_err(invalid_url)?,
        None,
    )
    .set_redirect_uri(RedirectUrl::new(config.redirect_uri()).map_err(invalid_url)?);

    let state = pkce.state.clone();
    let (url, _) = client
        .authorize_url(move || CsrfToken::new(state))
        .add_scopes(config.scopes.iter().cloned().map(Scope::new))
        .add_extra_param("code_challenge_method", "S256")
        .add_extra_param("code_challenge", pkce.challenge.clone())
        .url();
    Ok(url.into())
}

fn invalid_url(err: oauth2::url::ParseError) -> Error {
    Error::HttpError(Box::new(err))
}

/// Drives one interactive authorization-code login.
pub struct Authorizer<'a> {
    pub config: &'a AuthConfig,
    pub store: &'a dyn PreferenceStore,
    pub endpoint: &'a dyn TokenEndpoint,
    pub clock: &'a dyn Clock,
    pub browser: &'a dyn Browser,
}

impl Authorizer<'_> {
    pub fn login(&self) -> Result<Credential, Error> {
        self.config.client_id()?;

        // Bind first, so an overlapping attempt fails before it can replace
        // the PKCE material of the one in flight.
        let listener = CallbackListener::bind(self.config.redirect_address)?;

        let pkce = PkceChallenge::generate();
        let result = self
            .store
            .set(PKCE_STATE_KEY, &pkce.state)
            .and_then(|_| self.store.set(PKCE_VERIFIER_KEY, &pkce.verifier))
            .and_then(|_| self.authorize(&listener, &pkce));

        self.clear_transient();
        drop(listener);
        result
    }

    fn authorize(
        &self,
        listener: &CallbackListener,
        pkce: &PkceChallenge,
    ) -> Result<Credential, Error> {
        let url = authorize_url(self.config, pkce)?;
        log::info!("opening authorization page");
        if let Err(err) = self.browser.open(&url) {
            log::warn!("failed to open browser ({}), navigate to {} manually", err, url);
        }

        let callback = listener.wait(self.config.login_timeout)?;

        let stored_state = self.store.get(PKCE_STATE_KEY);
        let verifier = self.store.get(PKCE_VERIFIER_KEY);
        self.clear_transient();

        match self.complete(&callback, stored_state, verifier) {
            Ok(credential) => {
                callback.respond_success();
                log::info!("authorization complete");
                Ok(credential)
            }
            Err(err) => {
                callback.respond_failure();
                Err(err)
            }
        }
    }

    fn complete(
        &self,
        callback: &Callback,
        stored_state: Option<String>,
        verifier: Option<String>,
    ) -> Result<Credential, Error> {
        let params = &callback.params;
        if let Some(error) = &params.error {
            log::error!("authorization denied: {}", error);
            return Err(Error::AuthorizationDenied(error.clone()));
        }
        let (state, verifier) = match (stored_state, verifier) {
            (Some(state), Some(verifier)) => (state, verifier),
            _ => {
                log::error!("no pending authorization for this callback");
                return Err(Error::StateMismatch);
            }
        };
        if params.state.as_deref() != Some(state.as_str()) {
            log::error!("callback state does not match the pending authorization");
            return Err(Error::StateMismatch);
        }
        let code = params.code.as_deref().ok_or(Error::MissingCode)?;

        let response = exchange_code(self.endpoint, self.config, code, &verifier)?;
        Ok(Credential::issued(response, self.clock.now_millis()))
    }

    fn clear_transient(&self) {
        for key in [PKCE_STATE_KEY, PKCE_VERIFIER_KEY] {
            if let Err(err) = self.store.remove(key) {
                log::error!("failed to remove {}: {}", key, err);
            }
        }
    }
}
