//! Configuration file loading.
//!
//! ```yaml
//! listen: ":8080"
//! data_path: ~/.roastbooth/gallery.redb
//! static_dir: ./web
//! match:
//!   threshold: 0.4
//!   workers: 4
//! embedder:
//!   url: http://127.0.0.1:5000
//!   model: VGG-Face
//!   detector: opencv
//! generator:
//!   api_key: $PERPLEXITY_API_KEY
//!   model: r1-1776
//! speech:
//!   api_key: ${ELEVENLABS_API_KEY}
//!   voice_id: JBFqnCBsd6RMkjVDRZzb
//! ```
//!
//! Every key is optional. Values of the form `$VAR` or `${VAR}` are read
//! from the environment, and a leading `~/` in a path is the home
//! directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use roastbooth_facematch::{
    DEFAULT_DETECTOR, DEFAULT_MODEL, DEFAULT_THRESHOLD, HttpEmbedderConfig, MatcherConfig,
};
use roastbooth_roast::{
    ChatCompletionConfig, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL, DEFAULT_ELEVENLABS_URL,
    DEFAULT_OUTPUT_FORMAT, DEFAULT_SYSTEM_PROMPT, DEFAULT_TTS_MODEL, DEFAULT_VOICE_ID,
    ElevenLabsConfig,
};
use serde::Deserialize;

const DEFAULT_BASE_DIR: &str = ".roastbooth";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const DEFAULT_DB_FILE: &str = "gallery.redb";

/// Top-level configuration, built once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address; ":8080" binds every interface.
    pub listen: String,
    pub data_path: PathBuf,
    /// Front end files served under `/`.
    pub static_dir: Option<PathBuf>,
    #[serde(rename = "match")]
    pub matching: MatchSection,
    pub embedder: EmbedderSection,
    pub generator: GeneratorSection,
    pub speech: SpeechSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchSection {
    pub threshold: f32,
    /// Concurrent embedding calls. 0 means available parallelism.
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbedderSection {
    pub url: String,
    pub model: String,
    pub detector: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorSection {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechSection {
    pub base_url: String,
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ":8080".to_string(),
            data_path: default_base_dir()
                .map(|dir| dir.join(DEFAULT_DB_FILE))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE)),
            static_dir: None,
            matching: MatchSection::default(),
            embedder: EmbedderSection::default(),
            generator: GeneratorSection::default(),
            speech: SpeechSection::default(),
        }
    }
}

impl Default for MatchSection {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            workers: 0,
        }
    }
}

impl Default for EmbedderSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000".to_string(),
            model: DEFAULT_MODEL.to_string(),
            detector: DEFAULT_DETECTOR.to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_URL.to_string(),
            api_key: "$PERPLEXITY_API_KEY".to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for SpeechSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ELEVENLABS_URL.to_string(),
            api_key: "$ELEVENLABS_API_KEY".to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_TTS_MODEL.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

/// Returns `~/.roastbooth`.
pub fn default_base_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR))
}

/// Returns `~/.roastbooth/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_base_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
}

impl Config {
    /// Loads the config at `path`, or the default path if `None`.
    ///
    /// An explicit path must exist; a missing default file yields the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        let cfg = cfg.expanded();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Resolves `$VAR` references and `~/` path prefixes.
    pub fn expanded(mut self) -> Self {
        self.data_path = expand_home(&self.data_path);
        self.static_dir = self.static_dir.as_deref().map(expand_home);
        self.embedder.url = expand_env(&self.embedder.url);
        self.generator.base_url = expand_env(&self.generator.base_url);
        self.generator.api_key = expand_env(&self.generator.api_key);
        self.speech.base_url = expand_env(&self.speech.base_url);
        self.speech.api_key = expand_env(&self.speech.api_key);
        self.speech.voice_id = expand_env(&self.speech.voice_id);
        self
    }

    /// Checks settings every command depends on.
    pub fn validate(&self) -> Result<()> {
        let t = self.matching.threshold;
        if !(t.is_finite() && t > 0.0 && t <= 2.0) {
            bail!("match.threshold must be in (0, 2], got {t}");
        }
        if self.embedder.url.is_empty() {
            bail!("embedder.url is required");
        }
        Ok(())
    }

    /// Checks the provider credentials needed to produce audio.
    pub fn validate_providers(&self) -> Result<()> {
        if self.generator.api_key.is_empty() {
            bail!("generator.api_key is required (set PERPLEXITY_API_KEY)");
        }
        if self.speech.api_key.is_empty() {
            bail!("speech.api_key is required (set ELEVENLABS_API_KEY)");
        }
        Ok(())
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        match self.matching.workers {
            0 => MatcherConfig::default(),
            workers => MatcherConfig { workers },
        }
    }

    pub fn embedder_config(&self) -> HttpEmbedderConfig {
        HttpEmbedderConfig::new(&self.embedder.url)
            .with_model(&self.embedder.model)
            .with_detector(&self.embedder.detector)
            .with_timeout(Duration::from_secs(self.embedder.timeout_secs))
    }

    pub fn generator_config(&self) -> ChatCompletionConfig {
        let mut cfg = ChatCompletionConfig::new(&self.generator.api_key);
        cfg.base_url = self.generator.base_url.clone();
        cfg.model = self.generator.model.clone();
        cfg.system_prompt = self.generator.system_prompt.clone();
        cfg
    }

    pub fn speech_config(&self) -> ElevenLabsConfig {
        let mut cfg = ElevenLabsConfig::new(&self.speech.api_key);
        cfg.base_url = self.speech.base_url.clone();
        cfg.voice_id = self.speech.voice_id.clone();
        cfg.model_id = self.speech.model_id.clone();
        cfg.output_format = self.speech.output_format.clone();
        cfg
    }
}

/// Replaces a leading `~` component with the home directory. Paths without
/// one, or when no home directory is known, pass through.
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Expands a whole-value `$VAR` or `${VAR}` reference. Unset variables
/// expand to the empty string; other values pass through.
fn expand_env(s: &str) -> String {
    let Some(rest) = s.strip_prefix('$') else {
        return s.to_string();
    };
    let name = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(rest);
    std::env::var(name).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.listen, ":8080");
        assert_eq!(cfg.matching.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.generator.model, "r1-1776");
        assert_eq!(cfg.speech.voice_id, DEFAULT_VOICE_ID);
        assert!(cfg.static_dir.is_none());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg = Config::parse(
            r#"
listen: "127.0.0.1:9000"
match:
  threshold: 0.3
speech:
  voice_id: other-voice
"#,
        )
        .unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(cfg.matching.threshold, 0.3);
        assert_eq!(cfg.matching.workers, 0);
        assert_eq!(cfg.speech.voice_id, "other-voice");
        assert_eq!(cfg.speech.model_id, DEFAULT_TTS_MODEL);
        assert_eq!(cfg.embedder.model, "VGG-Face");
    }

    #[test]
    fn threshold_out_of_range_fails_validation() {
        for bad in ["0", "-0.1", "2.5"] {
            let cfg = Config::parse(&format!("match:\n  threshold: {bad}\n")).unwrap();
            assert!(cfg.validate().is_err(), "threshold {bad}");
        }
        let cfg = Config::parse("match:\n  threshold: 2.0\n").unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_keys_fail_provider_validation() {
        let mut cfg = Config::default();
        cfg.generator.api_key.clear();
        cfg.speech.api_key = "xi".into();
        assert!(cfg.validate_providers().is_err());

        cfg.generator.api_key = "pplx".into();
        assert!(cfg.validate_providers().is_ok());
    }

    #[test]
    fn expand_env_forms() {
        // PATH is set in every test environment.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env("$PATH"), path);
        assert_eq!(expand_env("${PATH}"), path);
        assert_eq!(expand_env("$ROASTBOOTH_SURELY_UNSET_VAR"), "");
        assert_eq!(expand_env("literal"), "literal");
        assert_eq!(expand_env(""), "");
    }

    #[test]
    fn home_prefix_is_expanded() {
        let cfg = Config::parse("data_path: ~/.roastbooth/gallery.redb\nstatic_dir: ~/web\n")
            .unwrap()
            .expanded();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(cfg.data_path, home.join(".roastbooth/gallery.redb"));
            assert_eq!(cfg.static_dir, Some(home.join("web")));
        }

        assert_eq!(expand_home(Path::new("/tmp/x.redb")), PathBuf::from("/tmp/x.redb"));
        assert_eq!(expand_home(Path::new("~user/x")), PathBuf::from("~user/x"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "data_path: /tmp/x.redb\nmatch:\n  workers: 3\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.data_path, PathBuf::from("/tmp/x.redb"));
        assert_eq!(cfg.matcher_config().workers, 3);
    }
}
