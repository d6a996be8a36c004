//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use mediarelay_core::transfer::constants::LARGE_UPLOAD_CEILING_BYTES;
use mediarelay_core::transfer::{TransferConfig, TransferMode};

use crate::cli::Args;

/// TOML-backed file configuration for mediarelay defaults.
///
/// Every key is optional; unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default transfer mode (`upload` or `link`).
    pub mode: Option<String>,
    /// Directory uploads are written to when no upload URL is given.
    pub output_dir: Option<PathBuf>,
    /// HTTP endpoint uploads are posted to.
    pub upload_url: Option<String>,
    /// JSON endpoint template resolving page links.
    pub metadata_endpoint: Option<String>,
    /// Chunk size in bytes.
    pub chunk_size: Option<u64>,
    /// Attempts per phase (1..=10).
    pub max_attempts: Option<u32>,
    /// Delay between attempts in seconds (0..=600).
    pub retry_delay_secs: Option<u64>,
    /// Upload ceiling in bytes.
    pub upload_ceiling_bytes: Option<u64>,
    /// Use the large-file ceiling instead of the default one.
    pub large_uploads: Option<bool>,
    /// Per-attempt timeout in seconds (1..=86400).
    pub overall_timeout_secs: Option<u64>,
    /// Connect timeout in seconds (1..=300).
    pub connect_timeout_secs: Option<u64>,
    /// Directory for temporary artifacts.
    pub temp_dir: Option<PathBuf>,
    /// Answer with the link when the download fails.
    pub allow_link_fallback: Option<bool>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(mode) = &self.mode {
            parse_mode(mode)?;
        }
        if let Some(max_attempts) = self.max_attempts
            && !(1..=10).contains(&max_attempts)
        {
            bail!("Invalid config value for `max_attempts`: {max_attempts}. Expected range: 1..=10");
        }
        validate_range_secs("retry_delay_secs", self.retry_delay_secs, 0, 600)?;
        validate_range_secs("overall_timeout_secs", self.overall_timeout_secs, 1, 86_400)?;
        validate_range_secs("connect_timeout_secs", self.connect_timeout_secs, 1, 300)?;
        if self.upload_ceiling_bytes.is_some() && self.large_uploads == Some(true) {
            bail!("`upload_ceiling_bytes` and `large_uploads` cannot both be set");
        }
        Ok(())
    }

    /// Parsed `mode`, if set.
    pub fn transfer_mode(&self) -> Result<Option<TransferMode>> {
        self.mode.as_deref().map(parse_mode).transpose()
    }
}

fn parse_mode(raw: &str) -> Result<TransferMode> {
    raw.parse::<TransferMode>()
        .map_err(|reason| anyhow::anyhow!("Invalid config value for `mode`: {reason}"))
}

fn validate_range_secs(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config, empty when no file exists.
    pub config: FileConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediarelay/config.toml`
/// 2. `$HOME/.config/mediarelay/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("mediarelay")
                .join("config.toml"),
        );
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("mediarelay")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config for this run.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Builds the engine configuration: defaults, then file values, then flags.
pub fn build_transfer_config(file: &FileConfig, args: &Args) -> Result<TransferConfig> {
    let mut config = TransferConfig::default();

    if let Some(chunk_size) = args.chunk_size.or(file.chunk_size) {
        config.chunk_size = usize::try_from(chunk_size)
            .with_context(|| format!("chunk size {chunk_size} does not fit this platform"))?;
    }
    if let Some(max_attempts) = args.max_attempts.or(file.max_attempts) {
        config.max_attempts = max_attempts;
    }
    if let Some(delay) = args.retry_delay.or(file.retry_delay_secs) {
        config.retry_delay = Duration::from_secs(delay);
    }

    if let Some(ceiling) = args.ceiling {
        config.upload_ceiling_bytes = ceiling;
    } else if args.large {
        config.upload_ceiling_bytes = LARGE_UPLOAD_CEILING_BYTES;
    } else if let Some(ceiling) = file.upload_ceiling_bytes {
        config.upload_ceiling_bytes = ceiling;
    } else if file.large_uploads == Some(true) {
        config.upload_ceiling_bytes = LARGE_UPLOAD_CEILING_BYTES;
    }

    if let Some(secs) = file.overall_timeout_secs {
        config.overall_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(temp_dir) = &file.temp_dir {
        config.temp_dir.clone_from(temp_dir);
    }
    if args.no_link_fallback {
        config.allow_link_fallback = false;
    } else if let Some(allow) = file.allow_link_fallback {
        config.allow_link_fallback = allow;
    }

    config.validate().context("Invalid transfer configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["mediarelay"];
        argv.extend_from_slice(extra);
        argv.push("https://example.com/a.mp4");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let cfg = parse_config_str(
            r#"
mode = "link"
output_dir = "/srv/media"
chunk_size = 1048576
max_attempts = 5
retry_delay_secs = 2
upload_ceiling_bytes = 104857600
overall_timeout_secs = 120
allow_link_fallback = false
"#,
        )
        .unwrap();
        assert_eq!(cfg.transfer_mode().unwrap(), Some(TransferMode::LinkOnly));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/srv/media")));
        assert_eq!(cfg.chunk_size, Some(1_048_576));
        assert_eq!(cfg.max_attempts, Some(5));
        assert_eq!(cfg.allow_link_fallback, Some(false));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let err = parse_config_str("concurrency = 4\n").unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{err}");
    }

    #[test]
    fn test_parse_rejects_out_of_range_values() {
        let err = parse_config_str("max_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"), "{err}");

        let err = parse_config_str("connect_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("connect_timeout_secs"), "{err}");

        let err = parse_config_str("mode = \"sideways\"\n").unwrap_err();
        assert!(err.to_string().contains("mode"), "{err}");
    }

    #[test]
    fn test_parse_rejects_ceiling_with_large_preset() {
        let err =
            parse_config_str("upload_ceiling_bytes = 10\nlarge_uploads = true\n").unwrap_err();
        assert!(err.to_string().contains("large_uploads"), "{err}");
    }

    #[test]
    fn test_load_explicit_path_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_attempts = 2\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.loaded_from_file);
        assert_eq!(loaded.config.max_attempts, Some(2));
    }

    #[test]
    fn test_load_explicit_missing_path_is_error() {
        let temp = TempDir::new().unwrap();
        let err = load_config(Some(&temp.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"), "{err}");
    }

    #[test]
    fn test_build_defaults_without_file_or_flags() {
        let config = build_transfer_config(&FileConfig::default(), &args(&[])).unwrap();
        let defaults = TransferConfig::default();
        assert_eq!(config.chunk_size, defaults.chunk_size);
        assert_eq!(config.max_attempts, defaults.max_attempts);
        assert_eq!(config.upload_ceiling_bytes, defaults.upload_ceiling_bytes);
        assert!(config.allow_link_fallback);
    }

    #[test]
    fn test_build_flags_win_over_file() {
        let file = FileConfig {
            max_attempts: Some(5),
            retry_delay_secs: Some(9),
            upload_ceiling_bytes: Some(1000),
            allow_link_fallback: Some(true),
            ..FileConfig::default()
        };
        let config = build_transfer_config(
            &file,
            &args(&["-r", "2", "--large", "--no-link-fallback"]),
        )
        .unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.retry_delay, Duration::from_secs(9));
        assert_eq!(config.upload_ceiling_bytes, LARGE_UPLOAD_CEILING_BYTES);
        assert!(!config.allow_link_fallback);
    }

    #[test]
    fn test_build_rejects_invalid_chunk_size() {
        let err = build_transfer_config(&FileConfig::default(), &args(&["--chunk-size", "0"]))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid transfer configuration"), "{err}");
    }
}
