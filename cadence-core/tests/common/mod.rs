#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use cadence_core::{
    error::Error,
    oauth::{AuthConfig, Browser, Clock, Credential, FormResponse, Notifier, TokenEndpoint},
    store::{MemoryStore, PreferenceStore},
    TokenProvider,
};
use parking_lot::Mutex;
use url::Url;

pub const NOW: u64 = 1_700_000_000_000;

pub const MINUTE: u64 = 60_000;

pub fn token_body(access: &str, refresh: Option<&str>) -> String {
    match refresh {
        Some(refresh) => format!(
            r#"{{"access_token":"{access}","token_type":"Bearer","expires_in":3600,"refresh_token":"{refresh}","scope":"user-read-private"}}"#
        ),
        None => format!(
            r#"{{"access_token":"{access}","token_type":"Bearer","expires_in":3600,"scope":"user-read-private"}}"#
        ),
    }
}

/// Token endpoint replaying queued responses and recording each form.
#[derive(Default)]
pub struct FakeEndpoint {
    replies: Mutex<VecDeque<FormResponse>>,
    pub requests: Mutex<Vec<HashMap<String, String>>>,
}

impl FakeEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, status: u16, body: impl Into<String>) {
        self.replies.lock().push_back(FormResponse {
            status,
            body: body.into(),
        });
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn grants(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|form| form["grant_type"].clone())
            .collect()
    }
}

impl TokenEndpoint for FakeEndpoint {
    fn post_form(&self, params: &[(&str, &str)]) -> Result<FormResponse, Error> {
        self.requests.lock().push(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::HttpError("no reply queued".into()))
    }
}

pub struct FixedClock(pub AtomicU64);

impl FixedClock {
    pub fn at(millis: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(millis)))
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify_failure(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// What the simulated user does on the authorization page.
#[derive(Clone)]
pub enum UserAction {
    Approve,
    Deny,
    WrongState,
    DropCode,
    Ignore,
}

/// Browser stand-in that follows the redirect the way the real page would.
pub struct FakeBrowser {
    action: UserAction,
    pub opened: Mutex<Vec<String>>,
    pub pages: Mutex<Vec<JoinHandle<String>>>,
}

impl FakeBrowser {
    pub fn new(action: UserAction) -> Arc<Self> {
        Arc::new(Self {
            action,
            opened: Mutex::new(Vec::new()),
            pages: Mutex::new(Vec::new()),
        })
    }

    /// Response pages received by the browser, in order.
    pub fn responses(&self) -> Vec<String> {
        self.pages
            .lock()
            .drain(..)
            .map(|handle| handle.join().unwrap())
            .collect()
    }

    pub fn last_url(&self) -> Url {
        Url::parse(self.opened.lock().last().unwrap()).unwrap()
    }
}

impl Browser for FakeBrowser {
    fn open(&self, url: &str) -> Result<(), Error> {
        self.opened.lock().push(url.to_string());
        let url = Url::parse(url).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let redirect = Url::parse(&query["redirect_uri"]).unwrap();
        let state = query["state"].clone();

        let target = match self.action {
            UserAction::Approve => format!("/callback?code=c0de&state={state}"),
            UserAction::Deny => format!("/callback?error=access_denied&state={state}"),
            UserAction::WrongState => "/callback?code=c0de&state=forged".to_string(),
            UserAction::DropCode => format!("/callback?state={state}"),
            UserAction::Ignore => return Ok(()),
        };
        let address: SocketAddr = format!(
            "{}:{}",
            redirect.host_str().unwrap(),
            redirect.port().unwrap()
        )
        .parse()
        .unwrap();
        self.pages
            .lock()
            .push(thread::spawn(move || http_get(address, &target)));
        Ok(())
    }
}

pub fn http_get(address: SocketAddr, target: &str) -> String {
    let mut stream = TcpStream::connect(address).unwrap();
    write!(stream, "GET {target} HTTP/1.1\r\nHost: {address}\r\n\r\n").unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

/// A loopback address that is free right now.
pub fn free_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn port_is_free(address: SocketAddr) -> bool {
    TcpListener::bind(address).is_ok()
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        redirect_address: free_address(),
        login_timeout: Duration::from_secs(10),
        ..AuthConfig::new("test-client")
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub endpoint: Arc<FakeEndpoint>,
    pub clock: Arc<FixedClock>,
    pub browser: Arc<FakeBrowser>,
    pub notifier: Arc<RecordingNotifier>,
    pub provider: TokenProvider,
}

impl Harness {
    pub fn new(action: UserAction) -> Self {
        Self::with_config(test_config(), action)
    }

    pub fn with_config(config: AuthConfig, action: UserAction) -> Self {
        let store = Arc::new(MemoryStore::new());
        let endpoint = FakeEndpoint::new();
        let clock = FixedClock::at(NOW);
        let browser = FakeBrowser::new(action);
        let notifier = Arc::new(RecordingNotifier::default());
        let provider = TokenProvider::new(config, store.clone())
            .with_endpoint(endpoint.clone())
            .with_clock(clock.clone())
            .with_browser(browser.clone())
            .with_notifier(notifier.clone());
        Self {
            store,
            endpoint,
            clock,
            browser,
            notifier,
            provider,
        }
    }

    pub fn store_credential(&self, access: &str, refresh: Option<&str>, expires_at: u64) {
        let credential = Credential {
            access_token: access.into(),
            token_type: "Bearer".into(),
            expires_in: 3600,
            expires_at,
            refresh_token: refresh.map(str::to_owned),
            scope: "user-read-private".into(),
        };
        credential.save(&*self.store).unwrap();
    }

    pub fn stored(&self) -> Option<Credential> {
        Credential::load(&*self.store)
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }
}
