use std::env;
use std::path::PathBuf;
use std::time::Duration;

// Constants
const DATA_DIR: &str = "data";
const RENDER_DIR: &str = "telecaller_dashboard";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const SHEETS_TIMEOUT_SECS: u64 = 10;
const BIND_ADDR: &str = "127.0.0.1:3000";
const ADMIN_PASSWORD: &str = "admin123";

/// Credentials for the remote spreadsheet
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Spreadsheet id from the sheet URL
    pub spreadsheet_id: String,

    /// OAuth bearer token with the spreadsheets scope
    pub access_token: String,

    /// API base URL, overridable for testing
    pub api_base: String,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Runtime configuration
///
/// Every value has a default; environment variables override them.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the local JSON tables
    pub data_dir: PathBuf,

    /// Remote spreadsheet, if both id and token are configured
    pub sheets: Option<SheetsConfig>,

    /// Address the web server listens on
    pub bind_addr: String,

    /// Password given to the `admin` account when the user table is empty
    pub admin_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR),
            sheets: None,
            bind_addr: BIND_ADDR.to_string(),
            admin_password: ADMIN_PASSWORD.to_string(),
        }
    }
}

impl Config {
    /// Build the configuration from the process environment
    ///
    /// # Environment
    /// * `DATA_DIR` - local table directory (a temp-dir folder when `RENDER` is set)
    /// * `GOOGLE_SHEET_ID`, `GOOGLE_SHEETS_TOKEN` - enable the remote store
    /// * `SHEETS_API_BASE`, `SHEETS_TIMEOUT_SECS` - remote tuning
    /// * `BIND_ADDR` - web server address
    /// * `ADMIN_PASSWORD` - initial admin password
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(dir) = lookup("DATA_DIR").filter(|d| !d.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        } else if lookup("RENDER").is_some() {
            // Hosted filesystem is read-only outside the temp dir
            config.data_dir = env::temp_dir().join(RENDER_DIR);
        }

        let sheet_id = lookup("GOOGLE_SHEET_ID").filter(|s| !s.is_empty());
        let token = lookup("GOOGLE_SHEETS_TOKEN").filter(|s| !s.is_empty());
        if let (Some(spreadsheet_id), Some(access_token)) = (sheet_id, token) {
            let timeout = lookup("SHEETS_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(SHEETS_TIMEOUT_SECS);
            config.sheets = Some(SheetsConfig {
                spreadsheet_id,
                access_token,
                api_base: lookup("SHEETS_API_BASE").unwrap_or_else(|| SHEETS_API_BASE.to_string()),
                timeout: Duration::from_secs(timeout),
            });
        }

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(password) = lookup("ADMIN_PASSWORD").filter(|p| !p.is_empty()) {
            config.admin_password = password;
        }

        config
    }
}
