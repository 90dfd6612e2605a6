use lookout_core::{DetectorOptions, MatchPolicy};
use lookout_stream::{ReconnectPolicy, StreamOptions, Transport};
use serde::Deserialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("no stream URL configured; set RTSP_URL or pass --url")]
    MissingUrl,
}

/// Runtime configuration.
///
/// Layered as: built-in defaults, optional TOML file, `RTSP_URL` and
/// `LOOKOUT_*` environment variables, then command-line flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Camera stream URL.
    pub rtsp_url: Option<String>,
    pub rtsp_transport: Transport,
    /// Directory of `<name>/<image>` folders.
    pub known_faces_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine similarity needed for a positive match.
    pub similarity_threshold: f32,
    pub match_policy: MatchPolicy,
    /// Minimum SCRFD score for a detection.
    pub detection_threshold: f32,
    /// Process one frame out of every `skip_frames`.
    pub skip_frames: u32,
    /// Resize factor applied to processed frames before detection and display.
    pub scale: f64,
    pub window_title: String,
    /// Capture buffer length in frames; 0 keeps the backend default.
    pub buffer_size: u32,
    /// Reconnects tolerated after the stream stops producing frames.
    pub reconnect_attempts: u32,
    /// Log recognitions instead of opening a window.
    pub headless: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rtsp_url: None,
            rtsp_transport: Transport::Udp,
            known_faces_dir: PathBuf::from("known_faces"),
            model_dir: PathBuf::from("models"),
            similarity_threshold: 0.40,
            match_policy: MatchPolicy::First,
            detection_threshold: 0.5,
            skip_frames: 5,
            scale: 0.5,
            window_title: "Face Recognition".to_string(),
            buffer_size: 0,
            reconnect_attempts: 5,
            headless: false,
        }
    }
}

impl Config {
    /// Load defaults, the optional TOML file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Override fields from environment variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RTSP_URL").filter(|u| !u.trim().is_empty()) {
            self.rtsp_url = Some(url);
        }
        if let Some(dir) = lookup("LOOKOUT_KNOWN_FACES_DIR") {
            self.known_faces_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("LOOKOUT_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(title) = lookup("LOOKOUT_WINDOW_TITLE") {
            self.window_title = title;
        }
        if let Some(headless) = lookup("LOOKOUT_HEADLESS") {
            self.headless = parse_flag(&headless);
        }

        set_parsed(&lookup, "LOOKOUT_RTSP_TRANSPORT", &mut self.rtsp_transport)?;
        set_parsed(&lookup, "LOOKOUT_SIMILARITY_THRESHOLD", &mut self.similarity_threshold)?;
        set_parsed(&lookup, "LOOKOUT_MATCH_POLICY", &mut self.match_policy)?;
        set_parsed(&lookup, "LOOKOUT_DETECTION_THRESHOLD", &mut self.detection_threshold)?;
        set_parsed(&lookup, "LOOKOUT_SKIP_FRAMES", &mut self.skip_frames)?;
        set_parsed(&lookup, "LOOKOUT_SCALE", &mut self.scale)?;
        set_parsed(&lookup, "LOOKOUT_BUFFER_SIZE", &mut self.buffer_size)?;
        set_parsed(&lookup, "LOOKOUT_RECONNECT_ATTEMPTS", &mut self.reconnect_attempts)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detection_threshold must be within [0, 1], got {}",
                self.detection_threshold
            )));
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "scale must be within (0, 1], got {}",
                self.scale
            )));
        }
        Ok(())
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            confidence_threshold: self.detection_threshold,
            ..DetectorOptions::default()
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            ..ReconnectPolicy::default()
        }
    }

    pub fn stream_options(&self) -> Result<StreamOptions, ConfigError> {
        let url = self.rtsp_url.clone().ok_or(ConfigError::MissingUrl)?;
        Ok(StreamOptions {
            url,
            transport: self.rtsp_transport,
            buffer_size: (self.buffer_size > 0).then_some(self.buffer_size),
        })
    }
}

fn parse_flag(value: &str) -> bool {
    let v = value.trim();
    !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no"))
}

fn set_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = lookup(key) {
        *slot = value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
