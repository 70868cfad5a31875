//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file; a handful of ingest settings can
//! be overridden from the environment. A missing config file is not an
//! error: the services warn and run on built-in defaults.
//!
//! Root folder priority:
//! 1. Command-line argument
//! 2. `LOMBADA_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML file
//! 4. OS-dependent default (`~/.local/share/lombada` on Linux)

use crate::record::IdPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

pub const ROOT_FOLDER_ENV: &str = "LOMBADA_ROOT_FOLDER";
pub const CONFIG_PATH_ENV: &str = "LOMBADA_CONFIG";
pub const ID_POLICY_ENV: &str = "LOMBADA_ID_POLICY";
pub const RECOGNIZER_ENV: &str = "LOMBADA_RECOGNIZER";
pub const MAX_FILE_BYTES_ENV: &str = "LOMBADA_MAX_FILE_BYTES";

const CONFIG_FILE_NAME: &str = "lombada.toml";
const DATABASE_FILE_NAME: &str = "lombada.db";

/// Bootstrap configuration loaded from `lombada.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Folder holding the database and uploaded images
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Database file; defaults to `<root>/lombada.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ingest: IngestSettings,

    #[serde(default)]
    pub ocr: OcrSettings,

    #[serde(default)]
    pub detector: DetectorSettings,

    #[serde(default)]
    pub review: ReviewSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins if set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Which plate recognizer the ingest pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerKind {
    /// Plate pattern taken from the image filename
    Filename,
    /// Full-image OCR
    Ocr,
    /// Vehicle detection, then OCR of the plate region
    DetectOcr,
    /// Recognition disabled
    #[default]
    None,
}

impl FromStr for RecognizerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filename" => Ok(RecognizerKind::Filename),
            "ocr" => Ok(RecognizerKind::Ocr),
            "detect_ocr" | "detect-ocr" => Ok(RecognizerKind::DetectOcr),
            "none" | "off" => Ok(RecognizerKind::None),
            other => Err(format!(
                "unknown recognizer '{}' (expected filename, ocr, detect_ocr or none)",
                other
            )),
        }
    }
}

impl fmt::Display for RecognizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecognizerKind::Filename => "filename",
            RecognizerKind::Ocr => "ocr",
            RecognizerKind::DetectOcr => "detect_ocr",
            RecognizerKind::None => "none",
        };
        f.write_str(name)
    }
}

/// `[ingest]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestSettings {
    #[serde(default)]
    pub id_policy: IdPolicy,

    #[serde(default)]
    pub recognizer: RecognizerKind,

    /// Per-file upload limit in bytes (CSV and each image)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_recognizer_timeout_secs")]
    pub recognizer_timeout_secs: u64,

    /// Rows enriched concurrently (recognition + image upload)
    #[serde(default = "default_max_concurrent_rows")]
    pub max_concurrent_rows: usize,

    /// Image directory; defaults to `<root>/uploads`
    #[serde(default)]
    pub image_dir: Option<PathBuf>,

    /// Prefix prepended to image keys to form the stored URL
    #[serde(default = "default_public_url_prefix")]
    pub public_url_prefix: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            id_policy: IdPolicy::default(),
            recognizer: RecognizerKind::default(),
            max_file_bytes: default_max_file_bytes(),
            recognizer_timeout_secs: default_recognizer_timeout_secs(),
            max_concurrent_rows: default_max_concurrent_rows(),
            image_dir: None,
            public_url_prefix: default_public_url_prefix(),
        }
    }
}

/// `[ocr]` section (tesseract command line)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrSettings {
    #[serde(default = "default_tesseract_path")]
    pub tesseract_path: PathBuf,

    #[serde(default = "default_ocr_language")]
    pub language: String,

    /// Page segmentation mode for whole-image OCR (sparse text)
    #[serde(default = "default_full_image_psm")]
    pub full_image_psm: u8,

    /// Page segmentation mode for plate crops (single line)
    #[serde(default = "default_crop_psm")]
    pub crop_psm: u8,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_path: default_tesseract_path(),
            language: default_ocr_language(),
            full_image_psm: default_full_image_psm(),
            crop_psm: default_crop_psm(),
        }
    }
}

/// `[detector]` section (external vehicle detector)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorSettings {
    /// Program reading an image on stdin and printing JSON detections
    #[serde(default = "default_detector_command")]
    pub command: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    /// Best detection must score at least this much
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Lower fraction of the vehicle box searched for the plate
    #[serde(default = "default_plate_region")]
    pub plate_region: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            command: default_detector_command(),
            args: Vec::new(),
            min_score: default_min_score(),
            plate_region: default_plate_region(),
        }
    }
}

/// `[review]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewSettings {
    #[serde(default = "default_review_bind")]
    pub bind: String,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            bind: default_review_bind(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_recognizer_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_rows() -> usize {
    4
}

fn default_public_url_prefix() -> String {
    "/uploads".to_string()
}

fn default_tesseract_path() -> PathBuf {
    PathBuf::from("tesseract")
}

fn default_ocr_language() -> String {
    "por".to_string()
}

fn default_full_image_psm() -> u8 {
    11
}

fn default_crop_psm() -> u8 {
    7
}

fn default_detector_command() -> PathBuf {
    PathBuf::from("lombada-detect")
}

fn default_min_score() -> f32 {
    0.5
}

fn default_plate_region() -> f32 {
    0.3
}

fn default_review_bind() -> String {
    "127.0.0.1:5740".to_string()
}

impl TomlConfig {
    /// Load configuration
    ///
    /// `cli_path` wins over `LOMBADA_CONFIG`, which wins over the platform
    /// locations. Environment overrides are applied afterwards.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match locate_config_file(cli_path) {
            Some(path) => load_toml_config(&path)?,
            None => {
                warn!("No {} found, using built-in defaults", CONFIG_FILE_NAME);
                TomlConfig::default()
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `LOMBADA_*` environment overrides for ingest settings
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(ID_POLICY_ENV) {
            self.ingest.id_policy = value.parse().map_err(Error::Config)?;
            info!("id_policy overridden from {}: {}", ID_POLICY_ENV, self.ingest.id_policy);
        }

        if let Ok(value) = std::env::var(RECOGNIZER_ENV) {
            self.ingest.recognizer = value.parse().map_err(Error::Config)?;
            info!("recognizer overridden from {}: {}", RECOGNIZER_ENV, self.ingest.recognizer);
        }

        if let Ok(value) = std::env::var(MAX_FILE_BYTES_ENV) {
            self.ingest.max_file_bytes = value.trim().parse().map_err(|e| {
                Error::Config(format!("{} must be a byte count: {}", MAX_FILE_BYTES_ENV, e))
            })?;
            info!(
                "max_file_bytes overridden from {}: {}",
                MAX_FILE_BYTES_ENV, self.ingest.max_file_bytes
            );
        }

        Ok(())
    }

    /// Database file for a resolved root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
    }

    /// Image directory for a resolved root folder
    pub fn image_dir(&self, root_folder: &Path) -> PathBuf {
        self.ingest
            .image_dir
            .clone()
            .unwrap_or_else(|| root_folder.join("uploads"))
    }
}

/// Read and parse a TOML config file
///
/// A file that does not exist yields defaults with a warning; a file that
/// exists but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found: {} (using defaults)", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Find the config file to load, if any
fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("lombada").join(CONFIG_FILE_NAME));
    let system_config = PathBuf::from("/etc/lombada").join(CONFIG_FILE_NAME);

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|path| path.exists())
}

/// Root folder resolution (CLI > ENV > TOML > OS default)
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_value: config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lombada"))
        .unwrap_or_else(|| PathBuf::from("./lombada_data"))
}

/// Creates the root folder on first start
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }
}
