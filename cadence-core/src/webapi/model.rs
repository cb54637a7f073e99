use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    // Restricted devices may come without an ID.
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_restricted: bool,
    pub volume_percent: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Artist {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Album {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Track {
    // Local files have no ID.
    pub id: Option<String>,
    pub name: String,
    pub uri: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Public link for sharing.
    pub fn share_url(&self) -> Option<String> {
        self.external_urls.spotify.clone().or_else(|| {
            self.id
                .as_ref()
                .map(|id| format!("https://open.spotify.com/track/{}", id))
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlaylistTracksRef {
    pub total: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub owner: PublicUser,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
    #[serde(default)]
    pub collaborative: bool,
    pub tracks: PlaylistTracksRef,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SavedTrack {
    pub added_at: String,
    pub track: Track,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlaylistItem {
    // Removed or unavailable items come back as `null`.
    pub track: Option<Track>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<Track>,
    pub device: Option<Device>,
    #[serde(default)]
    pub shuffle_state: bool,
    #[serde(default)]
    pub repeat_state: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Recommendations {
    pub tracks: Vec<Track>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchTopic {
    Artist,
    Album,
    Track,
    Playlist,
}

impl SearchTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchTopic::Artist => "artist",
            SearchTopic::Album => "album",
            SearchTopic::Track => "track",
            SearchTopic::Playlist => "playlist",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::Artist, Self::Album, Self::Track, Self::Playlist]
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchResults {
    pub query: String,
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub tracks: Vec<Track>,
    pub playlists: Vec<Playlist>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_with_local_file_fields() {
        let track: Track = serde_json::from_str(
            r#"{"id":null,"name":"Demo","uri":"spotify:local:a:b:Demo:120","duration_ms":120000,
                "artists":[{"id":null,"name":"Me"},{"id":null,"name":"You"}]}"#,
        )
        .unwrap();
        assert_eq!(track.artist_names(), "Me, You");
        assert_eq!(track.share_url(), None);
    }

    #[test]
    fn share_url_prefers_external_link() {
        let track: Track = serde_json::from_str(
            r#"{"id":"4uLU6hMCjMI75M1A2tKUQC","name":"Song","uri":"spotify:track:4uLU6hMCjMI75M1A2tKUQC",
                "duration_ms":1,"external_urls":{"spotify":"https://open.spotify.com/track/x"}}"#,
        )
        .unwrap();
        assert_eq!(
            track.share_url().as_deref(),
            Some("https://open.spotify.com/track/x")
        );
    }

    #[test]
    fn device_kind_is_renamed() {
        let device: Device = serde_json::from_str(
            r#"{"id":"d1","name":"Kitchen","type":"Speaker","is_active":true,"volume_percent":40}"#,
        )
        .unwrap();
        assert_eq!(device.kind, "Speaker");
        assert!(device.is_active);
        assert!(!device.is_restricted);
    }
}
