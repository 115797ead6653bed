use anyhow::{bail, Context, Result};
use forumkit::ProviderNames;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Prefix of environment overrides: `APP__FORUM__BOARD_ID=2` maps to `forum.board_id`.
pub const ENV_PREFIX: &str = "APP__";

/// Main application configuration with strongly-typed global sections
/// and a flexible per-module configuration bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Request-context settings shared by every request.
    #[serde(default)]
    pub forum: ForumConfig,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Directory containing per-module YAML files (optional).
    #[serde(default)]
    pub modules_dir: Option<String>,
    /// Per-module configuration bag: module_name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForumConfig {
    /// Board used when a request carries no `b` parameter.
    #[serde(default = "default_board_id")]
    pub board_id: i64,
    /// Query parameter naming the logical page.
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// Prefix for generated links, e.g. `/forum/default.aspx`.
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub providers: ProviderNames,
}

fn default_board_id() -> i64 {
    forumkit::request_context::DEFAULT_BOARD_ID
}

fn default_page_param() -> String {
    forumkit::request_context::DEFAULT_PAGE_PARAM.to_string()
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            board_id: default_board_id(),
            page_param: default_page_param(),
            base_url: String::new(),
            providers: ProviderNames::default(),
        }
    }
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/forum.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/forum.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            forum: ForumConfig::default(),
            logging: Some(default_logging_config()),
            modules_dir: None,
            modules: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        Self::load_layered_with_env(config_path, ENV_PREFIX)
    }

    pub(crate) fn load_layered_with_env<P: AsRef<Path>>(
        config_path: P,
        env_prefix: &str,
    ) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let path = config_path.as_ref();
        if !path.exists() {
            bail!("config file not found: {}", path.display());
        }

        // Optional sections stay None unless YAML/ENV provides them.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to extract config from {}", path.display()))?;

        if let Some(dir) = config.modules_dir.clone() {
            let dir = resolve_relative(path, &dir);
            merge_module_files(&mut config.modules, dir)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Ok(Self::default()),
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(board) = args.board {
            self.forum.board_id = board;
        }

        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.forum.board_id < 1 {
            bail!("forum.board_id must be positive, got {}", self.forum.board_id);
        }
        if self.forum.page_param.trim().is_empty() {
            bail!("forum.page_param must not be empty");
        }
        Ok(())
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
    pub board: Option<i64>,
}

/// `modules_dir` relative paths are taken from the config file's directory.
fn resolve_relative(config_path: &Path, dir: &str) -> std::path::PathBuf {
    let p = Path::new(dir);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    config_path
        .parent()
        .map(|parent| parent.join(p))
        .unwrap_or_else(|| p.to_path_buf())
}

/// Merge `<module>.yaml` files into the bag; a file replaces an inline entry of the same name.
fn merge_module_files(
    bag: &mut HashMap<String, serde_json::Value>,
    dir: impl AsRef<Path>,
) -> Result<()> {
    use std::fs;
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext != "yml" && ext != "yaml" {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read module config {}", path.display()))?;
        let val: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?;
        bag.insert(name.to_string(), serde_json::to_value(val)?);
    }
    Ok(())
}
