//! Runtime configuration – where templates live, where the pagination
//! script can be found, and how the browser is launched.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of a template's main document.
pub const MAIN_DOCUMENT: &str = "report.hbs";
/// Subdirectory holding a template's partial fragments.
pub const PARTIALS_DIR: &str = "partials";
/// Extension (without dot) of partial fragment files.
pub const PARTIAL_EXTENSION: &str = "hbs";

/// Relative location of the Paged.js polyfill inside an npm install.
const PAGEDJS_DIST: &str = "node_modules/pagedjs/dist/paged.polyfill.js";

/// Browser launch options.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Explicit Chromium executable. `None` lets the driver auto-detect.
    pub executable: Option<PathBuf>,
    /// Pass `--no-sandbox` / `--disable-setuid-sandbox` (default: true).
    pub no_sandbox: bool,
    /// Timeout for a single DevTools request (default: 30 s).
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable: None,
            no_sandbox: true,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for the whole report service.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Root of the template store (default: `{cwd}/templates`).
    pub templates_root: PathBuf,
    /// Ordered candidate paths for the pagination script; the first that
    /// exists wins.
    pub pagination_script_candidates: Vec<PathBuf>,
    pub browser: BrowserOptions,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            templates_root: cwd.join("templates"),
            pagination_script_candidates: default_script_candidates(&cwd),
            browser: BrowserOptions::default(),
        }
    }
}

impl ForgeConfig {
    /// Build a config from `TEMPLATES_PATH`, `PAGEDJS_PATH` and `CHROME_PATH`,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = env::var_os("TEMPLATES_PATH") {
            config.templates_root = PathBuf::from(root);
        }
        if let Some(script) = env::var_os("PAGEDJS_PATH") {
            config
                .pagination_script_candidates
                .insert(0, PathBuf::from(script));
        }
        if let Some(chrome) = env::var_os("CHROME_PATH") {
            config.browser.executable = Some(PathBuf::from(chrome));
        }
        config
    }

    /// Default config rooted at a specific template store.
    pub fn with_templates_root(root: impl Into<PathBuf>) -> Self {
        Self {
            templates_root: root.into(),
            ..Self::default()
        }
    }
}

fn default_script_candidates(cwd: &Path) -> Vec<PathBuf> {
    vec![
        cwd.join(PAGEDJS_DIST),
        cwd.join("client").join(PAGEDJS_DIST),
    ]
}
