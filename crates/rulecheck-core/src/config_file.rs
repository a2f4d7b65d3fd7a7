use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub llm: Option<LlmConfig>,
    pub limits: Option<LimitsConfig>,
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_document_chars: Option<usize>,
    pub min_text_chars: Option<usize>,
    pub max_concurrent_evaluations: Option<usize>,
    pub max_upload_mb: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
}

/// Platform config directory path: `<config_dir>/rulecheck/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rulecheck").join("config.toml"))
}

/// Load config by cascading CWD `.rulecheck.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".rulecheck.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
            None
        }
    }
}

/// Pick the overlay's value if set, otherwise the base's.
fn pick<S, T>(
    base: Option<&S>,
    overlay: Option<&S>,
    get: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay.and_then(&get).or_else(|| base.and_then(&get))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bl, ol) = (base.llm.as_ref(), overlay.llm.as_ref());
    let (bm, om) = (base.limits.as_ref(), overlay.limits.as_ref());
    let (bs, os) = (base.server.as_ref(), overlay.server.as_ref());

    ConfigFile {
        llm: Some(LlmConfig {
            base_url: pick(bl, ol, |l| l.base_url.clone()),
            model: pick(bl, ol, |l| l.model.clone()),
            api_key: pick(bl, ol, |l| l.api_key.clone()),
            temperature: pick(bl, ol, |l| l.temperature),
            timeout_secs: pick(bl, ol, |l| l.timeout_secs),
        }),
        limits: Some(LimitsConfig {
            max_document_chars: pick(bm, om, |m| m.max_document_chars),
            min_text_chars: pick(bm, om, |m| m.min_text_chars),
            max_concurrent_evaluations: pick(bm, om, |m| m.max_concurrent_evaluations),
            max_upload_mb: pick(bm, om, |m| m.max_upload_mb),
        }),
        server: Some(ServerConfig {
            port: pick(bs, os, |s| s.port),
        }),
    }
}
