use std::{env, process, sync::Arc, thread, time::Duration};

use cadence_core::{
    config::{Config, Preferences},
    error::Error,
    oauth::{Clock, SystemClock},
    store::{FileStore, MemoryStore, PreferenceStore},
    webapi::{
        model::{Device, SearchTopic},
        WebApiHandle,
    },
    AuthConfig, TokenProvider,
};
use env_logger::{Builder, Env};

const ENV_LOG: &str = "CADENCE_LOG";
const ENV_LOG_STYLE: &str = "CADENCE_LOG_STYLE";

// Devices often show up a moment after waking, give them one more chance.
const DEVICE_RETRY_DELAY: Duration = Duration::from_millis(3500);

const SEARCH_LIMIT: usize = 10;

const USAGE: &str = "usage: cadence <command>

commands:
    login            authorize with Spotify
    logout           forget the stored token
    status           show login and playback status
    whoami           show the current user
    devices          list available devices
    device <name>    transfer playback to a device
    play | pause | next | prev
    search <query>   search tracks, albums, artists and playlists
    playlists        list your playlists";

fn main() {
    Builder::from_env(
        Env::new()
            .filter_or(ENV_LOG, "info")
            .write_style(ENV_LOG_STYLE),
    )
    .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        process::exit(2);
    };

    let app = match App::new() {
        Ok(app) => app,
        Err(err) => {
            eprintln!("cadence: {}", err.user_message());
            process::exit(1);
        }
    };

    let result = match (command.as_str(), rest) {
        ("login", []) => app.login(),
        ("logout", []) => app.logout(),
        ("status", []) => app.status(),
        ("whoami", []) => app.whoami(),
        ("devices", []) => app.devices(),
        ("device", name) if !name.is_empty() => app.select_device(&name.join(" ")),
        ("play", []) => app.play(),
        ("pause", []) => app.client().and_then(|client| client.pause()),
        ("next", []) => app.client().and_then(|client| client.next()),
        ("prev", []) => app.client().and_then(|client| client.previous()),
        ("search", query) if !query.is_empty() => app.search(&query.join(" ")),
        ("playlists", []) => app.playlists(),
        _ => {
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    if let Err(err) = result {
        log::debug!("command failed: {}", err);
        eprintln!("cadence: {}", err.user_message());
        process::exit(1);
    }
}

struct App {
    provider: TokenProvider,
    preferences: Preferences,
}

impl App {
    fn new() -> Result<Self, Error> {
        let config = Config::load()?;
        let store: Arc<dyn PreferenceStore> = match Config::store_path() {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => {
                log::warn!("no config directory, nothing will be remembered");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self {
            provider: TokenProvider::new(AuthConfig::from_config(&config), store.clone()),
            preferences: Preferences::new(store),
        })
    }

    fn client(&self) -> Result<WebApiHandle, Error> {
        self.provider.ensure_client()
    }

    fn login(&self) -> Result<(), Error> {
        let user = self.client()?.current_user()?;
        println!(
            "Logged in as {}",
            user.display_name.as_deref().unwrap_or(&user.id)
        );
        Ok(())
    }

    fn logout(&self) -> Result<(), Error> {
        self.provider.logout()?;
        println!("Logged out");
        Ok(())
    }

    fn status(&self) -> Result<(), Error> {
        let Some(credential) = self.provider.credential() else {
            println!("Not logged in");
            return Ok(());
        };
        let now = SystemClock.now_millis();
        if credential.expires_at > now {
            let minutes = (credential.expires_at - now) / 60_000;
            println!("Logged in, token valid for {minutes} more minutes");
        } else {
            println!("Logged in, token expired");
        }
        if let Some(device) = self.preferences.last_device() {
            println!("Last device: {device}");
        }
        match self.client()?.playback_state()? {
            Some(state) => {
                let track = state.item.as_ref().map_or_else(
                    || "nothing".to_string(),
                    |track| format!("{} - {}", track.artist_names(), track.name),
                );
                let device = state
                    .device
                    .as_ref()
                    .map_or("unknown device", |device| device.name.as_str());
                let verb = if state.is_playing { "Playing" } else { "Paused" };
                println!("{verb}: {track} on {device}");
            }
            None => println!("Nothing is playing"),
        }
        Ok(())
    }

    fn whoami(&self) -> Result<(), Error> {
        let user = self.client()?.current_user()?;
        println!("{}", user.display_name.as_deref().unwrap_or(&user.id));
        if let Some(email) = &user.email {
            println!("{email}");
        }
        if let Some(product) = &user.product {
            println!("plan: {product}");
        }
        Ok(())
    }

    fn devices(&self) -> Result<(), Error> {
        let devices = self.client()?.devices()?;
        if devices.is_empty() {
            println!("No devices available");
        }
        for device in devices {
            let marker = if device.is_active { "*" } else { " " };
            println!("{marker} {} ({})", device.name, device.kind);
        }
        Ok(())
    }

    fn select_device(&self, name: &str) -> Result<(), Error> {
        let client = self.client()?;
        let device = match find_device(client.devices()?, name) {
            Some(device) => device,
            None => {
                log::info!("device {:?} not found, retrying", name);
                thread::sleep(DEVICE_RETRY_DELAY);
                match find_device(client.devices()?, name) {
                    Some(device) => device,
                    None => {
                        println!("Device \"{name}\" not found");
                        return Ok(());
                    }
                }
            }
        };
        let Some(id) = device.id.as_deref() else {
            println!("Device \"{}\" cannot be controlled", device.name);
            return Ok(());
        };
        client.transfer_playback(id, true)?;
        self.preferences.set_last_device(&device.name)?;
        println!("Playing on {}", device.name);
        Ok(())
    }

    fn play(&self) -> Result<(), Error> {
        let client = self.client()?;
        let device_id = match self.preferences.last_device() {
            Some(name) => find_device(client.devices()?, &name).and_then(|device| device.id),
            None => None,
        };
        client.play(device_id.as_deref())
    }

    fn search(&self, query: &str) -> Result<(), Error> {
        let results = self
            .client()?
            .search(query, SearchTopic::all(), SEARCH_LIMIT)?;
        for track in &results.tracks {
            println!("track     {} - {}", track.artist_names(), track.name);
        }
        for album in &results.albums {
            println!("album     {}", album.name);
        }
        for artist in &results.artists {
            println!("artist    {}", artist.name);
        }
        for playlist in &results.playlists {
            println!("playlist  {}", playlist.name);
        }
        Ok(())
    }

    fn playlists(&self) -> Result<(), Error> {
        for playlist in self.client()?.user_playlists()? {
            println!("{} ({} tracks)", playlist.name, playlist.tracks.total);
        }
        Ok(())
    }
}

fn find_device(devices: Vec<Device>, name: &str) -> Option<Device> {
    devices
        .into_iter()
        .find(|device| device.name.eq_ignore_ascii_case(name))
}
