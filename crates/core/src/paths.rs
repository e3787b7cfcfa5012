use std::path::PathBuf;

/// Well-known filesystem locations. All state lives under `~/.browsepilot`.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".browsepilot");
        Self { root }
    }

    /// Root under an explicit directory, for tests.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PathBuf {
        self.root.clone()
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
