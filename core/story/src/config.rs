use std::net::SocketAddr;
use std::path::PathBuf;

/// Studio service configuration, read from the environment
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub export_dir: PathBuf,
}

impl StudioConfig {
    /// `DB_PATH`, `STUDIO_ADDR` and `EXPORT_DIR`, each with a default.
    /// An unparseable address falls back to the default.
    pub fn from_env() -> Self {
        let addr = std::env::var("STUDIO_ADDR")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(default_addr);

        let export_dir = std::env::var("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        Self {
            db_path: db_path_from_env(),
            addr,
            export_dir,
        }
    }
}

/// `DB_PATH`, or `~/.bookwright/story.db`
pub fn db_path_from_env() -> PathBuf {
    if let Ok(path) = std::env::var("DB_PATH") {
        return PathBuf::from(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".bookwright").join("story.db")
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 21960))
}
