use std::fmt::Display;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use ureq::{http::Response, Agent, Body};
use url::Url;

use crate::{error::Error, util::default_ureq_agent_builder};

use super::model::{
    Album, Artist, Device, Page, PlaybackState, Playlist, PlaylistItem, Recommendations, SavedTrack,
    SearchResults, SearchTopic, Track, UserProfile,
};

pub const API_BASE_URL: &str = "https://api.spotify.com";

// Largest page size the Web API accepts for list endpoints.
const PAGE_LIMIT: usize = 50;

/// Spotify Web API client bound to one access token.  Remote failures are
/// returned as they are, without retries.
pub struct WebApi {
    agent: Agent,
    access_token: String,
    client_id: String,
    base_url: String,
}

impl WebApi {
    pub fn new(access_token: String, client_id: String, proxy_url: Option<&str>) -> Self {
        Self {
            agent: default_ureq_agent_builder(proxy_url).build().into(),
            access_token,
            client_id,
            base_url: API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn request(&self, request: &RequestBuilder) -> Result<Response<Body>, Error> {
        let url = request.build(&self.base_url)?;
        let auth = format!("Bearer {}", self.access_token);
        log::debug!("{:?} {}", request.method, request.path);

        let mut response = match request.method {
            Method::Get => self
                .agent
                .get(url.as_str())
                .header("Authorization", &auth)
                .call()?,
            Method::Delete => self
                .agent
                .delete(url.as_str())
                .header("Authorization", &auth)
                .call()?,
            Method::Post | Method::Put => {
                let builder = if matches!(request.method, Method::Post) {
                    self.agent.post(url.as_str())
                } else {
                    self.agent.put(url.as_str())
                };
                let builder = builder.header("Authorization", &auth);
                match &request.body {
                    Some(body) => builder.send_json(body)?,
                    None => builder.send_empty()?,
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            log::warn!("{} failed with status {}", request.path, status);
            Err(Error::WebApi {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Send a request and throw away the response body.  Use for
    /// POST/PUT/DELETE requests.
    fn send_empty(&self, request: &RequestBuilder) -> Result<(), Error> {
        self.request(request).map(|_| ())
    }

    /// Send a request and deserialize the JSON body.  A success without a
    /// body yields `None`.
    fn load_optional<T: DeserializeOwned>(
        &self,
        request: &RequestBuilder,
    ) -> Result<Option<T>, Error> {
        let mut response = self.request(request)?;
        let body = response.body_mut().read_to_string()?;
        if body.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(serde_json::from_str(&body)?))
        }
    }

    fn load<T: DeserializeOwned>(&self, request: &RequestBuilder) -> Result<T, Error> {
        self.load_optional(request)?
            .ok_or(Error::UnexpectedResponse)
    }

    /// Iterate a paginated result set by sending `request` with added
    /// pagination parameters.
    fn for_all_pages<T: DeserializeOwned>(
        &self,
        request: &RequestBuilder,
        mut func: impl FnMut(Page<T>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut offset = 0;
        loop {
            let req = request
                .clone()
                .query("limit", PAGE_LIMIT)
                .query("offset", offset);
            let page: Page<T> = self.load(&req)?;

            let page_total = page.total;
            let page_offset = page.offset;
            let page_limit = page.limit.max(1);
            let has_next = page.next.is_some();
            func(page)?;

            if !has_next || page_total <= page_offset + page_limit {
                break Ok(());
            }
            offset = page_offset + page_limit;
        }
    }

    fn load_all_pages<T: DeserializeOwned>(
        &self,
        request: &RequestBuilder,
    ) -> Result<Vec<T>, Error> {
        let mut results = Vec::new();
        self.for_all_pages(request, |page| {
            results.extend(page.items);
            Ok(())
        })?;
        Ok(results)
    }
}

/// User endpoints.
impl WebApi {
    // https://developer.spotify.com/documentation/web-api/reference/get-current-users-profile
    pub fn current_user(&self) -> Result<UserProfile, Error> {
        self.load(&RequestBuilder::new("v1/me", Method::Get))
    }
}

/// Player endpoints.
impl WebApi {
    pub fn devices(&self) -> Result<Vec<Device>, Error> {
        #[derive(Deserialize)]
        struct Devices {
            devices: Vec<Device>,
        }

        let result: Devices = self.load(&RequestBuilder::new("v1/me/player/devices", Method::Get))?;
        Ok(result.devices)
    }

    pub fn transfer_playback(&self, device_id: &str, play: bool) -> Result<(), Error> {
        let request = RequestBuilder::new("v1/me/player", Method::Put)
            .body(json!({ "device_ids": [device_id], "play": play }));
        self.send_empty(&request)
    }

    /// `None` when nothing is playing on any device.
    pub fn playback_state(&self) -> Result<Option<PlaybackState>, Error> {
        self.load_optional(&RequestBuilder::new("v1/me/player", Method::Get))
    }

    pub fn play(&self, device_id: Option<&str>) -> Result<(), Error> {
        self.send_empty(&with_device(
            RequestBuilder::new("v1/me/player/play", Method::Put),
            device_id,
        ))
    }

    pub fn play_uris(&self, uris: &[&str], device_id: Option<&str>) -> Result<(), Error> {
        let request = RequestBuilder::new("v1/me/player/play", Method::Put)
            .body(json!({ "uris": uris }));
        self.send_empty(&with_device(request, device_id))
    }

    pub fn play_context(&self, context_uri: &str, device_id: Option<&str>) -> Result<(), Error> {
        let request = RequestBuilder::new("v1/me/player/play", Method::Put)
            .body(json!({ "context_uri": context_uri }));
        self.send_empty(&with_device(request, device_id))
    }

    pub fn pause(&self) -> Result<(), Error> {
        self.send_empty(&RequestBuilder::new("v1/me/player/pause", Method::Put))
    }

    pub fn next(&self) -> Result<(), Error> {
        self.send_empty(&RequestBuilder::new("v1/me/player/next", Method::Post))
    }

    pub fn previous(&self) -> Result<(), Error> {
        self.send_empty(&RequestBuilder::new("v1/me/player/previous", Method::Post))
    }
}

fn with_device(request: RequestBuilder, device_id: Option<&str>) -> RequestBuilder {
    match device_id {
        Some(id) => request.query("device_id", id),
        None => request,
    }
}

/// Library endpoints.
impl WebApi {
    pub fn saved_tracks(&self) -> Result<Vec<Track>, Error> {
        let request = RequestBuilder::new("v1/me/tracks", Method::Get).query("market", "from_token");
        let saved: Vec<SavedTrack> = self.load_all_pages(&request)?;
        Ok(saved.into_iter().map(|item| item.track).collect())
    }

    pub fn save_tracks(&self, ids: &[&str]) -> Result<(), Error> {
        let request = RequestBuilder::new("v1/me/tracks", Method::Put).query("ids", ids.join(","));
        self.send_empty(&request)
    }

    pub fn unsave_tracks(&self, ids: &[&str]) -> Result<(), Error> {
        let request =
            RequestBuilder::new("v1/me/tracks", Method::Delete).query("ids", ids.join(","));
        self.send_empty(&request)
    }
}

/// Playlist endpoints.
impl WebApi {
    pub fn user_playlists(&self) -> Result<Vec<Playlist>, Error> {
        // Playlists that are gone or inaccessible come back as `null`.
        let playlists: Vec<Option<Playlist>> =
            self.load_all_pages(&RequestBuilder::new("v1/me/playlists", Method::Get))?;
        Ok(playlists.into_iter().flatten().collect())
    }

    pub fn playlist_tracks(&self, id: &str) -> Result<Vec<Track>, Error> {
        let request = RequestBuilder::new(format!("v1/playlists/{}/tracks", id), Method::Get)
            .query("market", "from_token");
        let items: Vec<PlaylistItem> = self.load_all_pages(&request)?;
        Ok(items.into_iter().filter_map(|item| item.track).collect())
    }

    pub fn add_to_playlist(&self, playlist_id: &str, uris: &[&str]) -> Result<(), Error> {
        let request = RequestBuilder::new(format!("v1/playlists/{}/tracks", playlist_id), Method::Post)
            .body(json!({ "uris": uris }));
        self.send_empty(&request)
    }
}

/// Search endpoints.
impl WebApi {
    // https://developer.spotify.com/documentation/web-api/reference/search
    pub fn search(
        &self,
        query: &str,
        topics: &[SearchTopic],
        limit: usize,
    ) -> Result<SearchResults, Error> {
        #[derive(Deserialize)]
        struct ApiSearchResults {
            artists: Option<Page<Artist>>,
            albums: Option<Page<Album>>,
            tracks: Option<Page<Track>>,
            playlists: Option<Page<Option<Playlist>>>,
        }

        let topics = topics
            .iter()
            .map(SearchTopic::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let request = RequestBuilder::new("v1/search", Method::Get)
            .query("q", query)
            .query("type", topics)
            .query("limit", limit)
            .query("market", "from_token");

        let result: ApiSearchResults = self.load(&request)?;

        Ok(SearchResults {
            query: query.into(),
            artists: result.artists.map_or_else(Vec::new, |page| page.items),
            albums: result.albums.map_or_else(Vec::new, |page| page.items),
            tracks: result.tracks.map_or_else(Vec::new, |page| page.items),
            playlists: result.playlists.map_or_else(Vec::new, |page| {
                page.items.into_iter().flatten().collect()
            }),
        })
    }
}

/// Recommendation endpoints.
impl WebApi {
    pub fn recommendations(&self, seed_tracks: &[&str], limit: usize) -> Result<Vec<Track>, Error> {
        let request = RequestBuilder::new("v1/recommendations", Method::Get)
            .query("seed_tracks", seed_tracks.join(","))
            .query("limit", limit)
            .query("market", "from_token");
        let result: Recommendations = self.load(&request)?;
        Ok(result.tracks)
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Post,
    Put,
    Delete,
    Get,
}

#[derive(Debug, Clone)]
struct RequestBuilder {
    path: String,
    queries: Vec<(String, String)>,
    method: Method,
    body: Option<serde_json::Value>,
}

impl RequestBuilder {
    fn new(path: impl Display, method: Method) -> Self {
        Self {
            path: path.to_string(),
            queries: Vec::new(),
            method,
            body: None,
        }
    }

    fn query(mut self, key: impl Display, value: impl Display) -> Self {
        self.queries.push((key.to_string(), value.to_string()));
        self
    }

    fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    fn build(&self, base_url: &str) -> Result<Url, Error> {
        let mut url = Url::parse(base_url)
            .and_then(|base| base.join(&self.path))
            .map_err(|err| Error::HttpError(Box::new(err)))?;
        if !self.queries.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.queries);
        }
        Ok(url)
    }
}
