use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub credentials: Option<CredentialsConfig>,
    pub http: Option<HttpConfig>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub s2_api_key: Option<String>,
    pub core_api_key: Option<String>,
    /// Email for the OpenAlex polite pool.
    pub openalex_mailto: Option<String>,
    /// Email for the CrossRef polite pool.
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_secs: Option<f64>,
    pub max_delay_secs: Option<f64>,
}

/// Platform config path: `<config_dir>/litref/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("litref").join("config.toml"))
}

/// Load config by cascading CWD `.litref.toml` over the platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|path| load_from_path(&path));
    let cwd = load_from_path(Path::new(".litref.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(platform), None) => platform,
        (None, Some(cwd)) => cwd,
        (Some(platform), Some(cwd)) => merge(platform, cwd),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let pick = |overlay: Option<String>, base: Option<String>| overlay.or(base);

    let base_creds = base.credentials.unwrap_or_default();
    let overlay_creds = overlay.credentials.unwrap_or_default();
    let base_http = base.http.unwrap_or_default();
    let overlay_http = overlay.http.unwrap_or_default();
    let base_retry = base.retry.unwrap_or_default();
    let overlay_retry = overlay.retry.unwrap_or_default();

    ConfigFile {
        credentials: Some(CredentialsConfig {
            s2_api_key: pick(overlay_creds.s2_api_key, base_creds.s2_api_key),
            core_api_key: pick(overlay_creds.core_api_key, base_creds.core_api_key),
            openalex_mailto: pick(overlay_creds.openalex_mailto, base_creds.openalex_mailto),
            crossref_mailto: pick(overlay_creds.crossref_mailto, base_creds.crossref_mailto),
        }),
        http: Some(HttpConfig {
            timeout_secs: overlay_http.timeout_secs.or(base_http.timeout_secs),
        }),
        retry: Some(RetryConfig {
            max_attempts: overlay_retry.max_attempts.or(base_retry.max_attempts),
            base_delay_secs: overlay_retry.base_delay_secs.or(base_retry.base_delay_secs),
            max_delay_secs: overlay_retry.max_delay_secs.or(base_retry.max_delay_secs),
        }),
    }
}

/// Save the current config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {e}"))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {e}"))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {e}"))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_round_trip_toml() {
        let config = ConfigFile {
            credentials: Some(CredentialsConfig {
                s2_api_key: Some("sk-test".to_string()),
                crossref_mailto: Some("user@example.org".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let creds = parsed.credentials.unwrap();
        assert_eq!(creds.s2_api_key.unwrap(), "sk-test");
        assert_eq!(creds.crossref_mailto.unwrap(), "user@example.org");
        assert!(creds.core_api_key.is_none());
    }

    #[test]
    fn absent_sections_deserialize_as_none() {
        let parsed: ConfigFile = toml::from_str("[http]\ntimeout_secs = 15\n").unwrap();
        assert!(parsed.credentials.is_none());
        assert!(parsed.retry.is_none());
        assert_eq!(parsed.http.unwrap().timeout_secs, Some(15));
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            credentials: Some(CredentialsConfig {
                s2_api_key: Some("base-key".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            credentials: Some(CredentialsConfig {
                s2_api_key: Some("overlay-key".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.credentials.unwrap().s2_api_key.unwrap(), "overlay-key");
    }

    #[test]
    fn merge_preserves_base_when_overlay_absent() {
        let base = ConfigFile {
            credentials: Some(CredentialsConfig {
                core_api_key: Some("base-core".to_string()),
                ..Default::default()
            }),
            retry: Some(RetryConfig {
                max_attempts: Some(7),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.credentials.unwrap().core_api_key.unwrap(), "base-core");
        assert_eq!(merged.retry.unwrap().max_attempts, Some(7));
    }

    #[test]
    fn merge_mixes_fields_across_sections() {
        let base = ConfigFile {
            http: Some(HttpConfig {
                timeout_secs: Some(30),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            retry: Some(RetryConfig {
                max_attempts: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.http.unwrap().timeout_secs, Some(30));
        assert_eq!(merged.retry.unwrap().max_attempts, Some(3));
    }
}
