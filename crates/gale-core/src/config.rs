//! Engine configuration
//!
//! Plain structs with defaults and consuming builder methods. Loading them
//! from files or flags is left to the embedding application.

use std::path::PathBuf;
use std::time::Duration;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie name carrying the session id (default: "_wsid")
    pub key: String,
    /// Exact length of a session id (default: 36)
    pub length: usize,
    /// Idle time after which a session expires (default: 24 minutes)
    pub timeout: Duration,
    /// Cookie domain
    pub domain: Option<String>,
    /// Server instance tag embedded in new ids
    pub server_id: String,
    /// Directory for file-per-session storage; memory store when unset
    pub dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: "_wsid".to_string(),
            length: 36,
            timeout: Duration::from_millis(1_440_000),
            domain: None,
            server_id: String::new(),
            dir: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn server_id(mut self, id: impl Into<String>) -> Self {
        self.server_id = id.into();
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }
}

/// Dispatch engine settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Web root for file serving
    pub home: PathBuf,
    /// Files smaller than this are cached in memory with a gzip copy (0 disables)
    pub file_cache_size: u64,
    /// Default document probed for directory urls
    pub default_page: Option<String>,
    /// List directory contents when no default document exists
    pub list_dir: bool,
    /// Render body errors into the response
    pub show_error: bool,
    /// Template rendered for 404 responses
    pub not_found_template: Option<String>,
    /// Where multipart uploads are written
    pub upload_dir: PathBuf,
    /// Charset appended to text content types
    pub charset: String,
    /// Session settings
    pub session: SessionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home: PathBuf::from("./"),
            file_cache_size: 0,
            default_page: Some("index.html".to_string()),
            list_dir: false,
            show_error: true,
            not_found_template: None,
            upload_dir: std::env::temp_dir(),
            charset: "utf-8".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl Settings {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Default::default()
        }
    }

    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    pub fn file_cache_size(mut self, bytes: u64) -> Self {
        self.file_cache_size = bytes;
        self
    }

    pub fn default_page(mut self, page: Option<&str>) -> Self {
        self.default_page = page.map(str::to_string);
        self
    }

    pub fn list_dir(mut self, enabled: bool) -> Self {
        self.list_dir = enabled;
        self
    }

    pub fn show_error(mut self, enabled: bool) -> Self {
        self.show_error = enabled;
        self
    }

    pub fn not_found_template(mut self, template: impl Into<String>) -> Self {
        self.not_found_template = Some(template.into());
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}
