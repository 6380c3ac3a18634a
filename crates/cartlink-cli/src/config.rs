use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_READER_URL: &str = "https://192.168.1.3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the cartridge reader.
    pub reader_url: String,
    /// Catalog server URL, or a local directory laid out the same way.
    pub catalog_url: String,
    /// Directory dumped ROMs and saves are kept in.
    pub library_dir: PathBuf,
    pub timeout_secs: u64,
    pub upload_saves_to_cartridge: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reader_url: DEFAULT_READER_URL.to_string(),
            catalog_url: ".".to_string(),
            library_dir: PathBuf::from("games"),
            timeout_secs: 30,
            upload_saves_to_cartridge: false,
        }
    }
}

impl Config {
    pub const KEYS: [&'static str; 5] = [
        "reader_url",
        "catalog_url",
        "library_dir",
        "timeout_secs",
        "upload_saves_to_cartridge",
    ];

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Sets one key from its textual value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "reader_url" => self.reader_url = value.to_string(),
            "catalog_url" => self.catalog_url = value.to_string(),
            "library_dir" => self.library_dir = PathBuf::from(value),
            "timeout_secs" => {
                self.timeout_secs = value
                    .parse()
                    .map_err(|_| format!("timeout_secs must be a whole number, got '{value}'"))?;
            }
            "upload_saves_to_cartridge" => {
                self.upload_saves_to_cartridge = value
                    .parse()
                    .map_err(|_| format!("upload_saves_to_cartridge must be true or false, got '{value}'"))?;
            }
            _ => {
                return Err(format!(
                    "unknown key '{key}' (expected one of {})",
                    Self::KEYS.join(", ")
                ));
            }
        }
        Ok(())
    }
}

type Subscriber = Box<dyn FnMut(&Config)>;

/// Owns the configuration file and tells subscribers when it changes.
pub struct SettingsStore {
    path: PathBuf,
    config: Config,
    subscribers: Vec<Subscriber>,
}

impl SettingsStore {
    pub fn load(path: PathBuf) -> Self {
        let config = load_from_file(&path);
        Self {
            path,
            config,
            subscribers: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&Config) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    fn notify(&mut self) {
        for subscriber in &mut self.subscribers {
            subscriber(&self.config);
        }
    }

    /// Applies `edit`, saves the file and notifies subscribers. Returns
    /// whether anything changed; unchanged settings are not rewritten.
    pub fn update(&mut self, edit: impl FnOnce(&mut Config)) -> std::io::Result<bool> {
        let mut next = self.config.clone();
        edit(&mut next);
        if next == self.config {
            return Ok(false);
        }
        save_to_file(&self.path, &next)?;
        self.config = next;
        self.notify();
        Ok(true)
    }

    /// Re-reads the file, notifying subscribers if it changed on disk.
    pub fn reload(&mut self) -> bool {
        let fresh = load_from_file(&self.path);
        if fresh == self.config {
            return false;
        }
        self.config = fresh;
        self.notify();
        true
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("cartlink").join("config.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("cartlink").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("cartlink")
            .join("config.toml");
    }

    PathBuf::from("config.toml")
}

pub fn load_from_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read config {}: {e}; using defaults", path.display());
            }
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            Config::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &Config) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
