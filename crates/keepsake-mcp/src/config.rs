//! Configuration Vault – reads/writes `~/.keepsake/config.toml`.
//!
//! Resolution order for every setting, highest first:
//!
//! 1. command-line flag (applied by `main`),
//! 2. `KEEPSAKE_*` environment variable ([`apply_env_overrides`]),
//! 3. the config file,
//! 4. built-in default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory (under the home directory or the project directory) holding
/// keepsake state.
pub const STATE_DIR: &str = ".keepsake";

/// Sub-directory of [`STATE_DIR`] holding category files.
pub const MEMORIES_DIR: &str = "memories";

/// Errors raised while reading or writing the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config at {}: {source}", .path.display())]
    Write { path: PathBuf, source: std::io::Error },
}

/// Persisted user configuration stored in `~/.keepsake/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the global (user-wide) area.  Defaults to
    /// `~/.keepsake/memories`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_dir: Option<PathBuf>,

    /// Root of the local (project) area.  Defaults to
    /// `<cwd>/.keepsake/memories`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<PathBuf>,

    /// `tracing` filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_dir: None,
            local_dir: None,
            log_level: default_log_level(),
        }
    }
}

/// The two area roots after defaults and relative paths are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaRoots {
    pub global: PathBuf,
    pub local: PathBuf,
}

impl Config {
    /// Resolve both area roots to absolute paths.
    ///
    /// Relative paths from the config are taken relative to `cwd`.
    pub fn area_roots(&self, home: &Path, cwd: &Path) -> AreaRoots {
        let global = match &self.global_dir {
            Some(dir) => absolutize(dir, cwd),
            None => home.join(STATE_DIR).join(MEMORIES_DIR),
        };
        let local = match &self.local_dir {
            Some(dir) => absolutize(dir, cwd),
            None => cwd.join(STATE_DIR).join(MEMORIES_DIR),
        };
        AreaRoots { global, local }
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// The user's home directory from `HOME` (or `USERPROFILE` on Windows),
/// falling back to `cwd`.  Always absolute when `cwd` is.
pub fn home_dir(cwd: &Path) -> PathBuf {
    home_from(|key| std::env::var(key).ok(), cwd)
}

fn home_from(lookup: impl Fn(&str) -> Option<String>, cwd: &Path) -> PathBuf {
    lookup("HOME")
        .filter(|v| !v.is_empty())
        .or_else(|| lookup("USERPROFILE").filter(|v| !v.is_empty()))
        .map(|v| absolutize(Path::new(&v), cwd))
        .unwrap_or_else(|| cwd.to_path_buf())
}

/// Return the path to `~/.keepsake/config.toml`.
pub fn config_path(cwd: &Path) -> PathBuf {
    config_path_for_home(&home_dir(cwd))
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(STATE_DIR).join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.  Environment overrides are applied to a loaded file.
pub fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `KEEPSAKE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KEEPSAKE_GLOBAL_DIR` | `global_dir` |
/// | `KEEPSAKE_LOCAL_DIR` | `local_dir` |
/// | `KEEPSAKE_LOG_LEVEL` | `log_level` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("KEEPSAKE_GLOBAL_DIR").filter(|v| !v.is_empty()) {
        cfg.global_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("KEEPSAKE_LOCAL_DIR").filter(|v| !v.is_empty()) {
        cfg.local_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("KEEPSAKE_LOG_LEVEL").filter(|v| !v.is_empty()) {
        cfg.log_level = v;
    }
}

/// Save the config to a specific path, creating the parent directory if
/// necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        // Restrict the state directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    // ── paths ────────────────────────────────────────────────────────────────

    #[test]
    fn config_path_points_to_keepsake_dir() {
        let p = config_path_for_home(Path::new("/home/testuser"));
        assert_eq!(p, PathBuf::from("/home/testuser/.keepsake/config.toml"));
    }

    #[test]
    fn default_area_roots() {
        let roots = Config::default().area_roots(Path::new("/home/u"), Path::new("/work/proj"));
        assert_eq!(roots.global, PathBuf::from("/home/u/.keepsake/memories"));
        assert_eq!(roots.local, PathBuf::from("/work/proj/.keepsake/memories"));
    }

    #[test]
    fn relative_dirs_resolve_against_cwd() {
        let cfg = Config {
            global_dir: Some(PathBuf::from("/srv/mem")),
            local_dir: Some(PathBuf::from("notes")),
            ..Config::default()
        };
        let roots = cfg.area_roots(Path::new("/home/u"), Path::new("/work/proj"));
        assert_eq!(roots.global, PathBuf::from("/srv/mem"));
        assert_eq!(roots.local, PathBuf::from("/work/proj/notes"));
    }

    #[test]
    fn home_falls_back_to_cwd() {
        let cwd = Path::new("/work/proj");
        assert_eq!(home_from(lookup(&[]), cwd), PathBuf::from("/work/proj"));
        assert_eq!(home_from(lookup(&[("HOME", "")]), cwd), PathBuf::from("/work/proj"));

        let roots = Config::default().area_roots(&home_from(lookup(&[]), cwd), cwd);
        assert!(roots.global.is_absolute());
        assert_eq!(roots.global, PathBuf::from("/work/proj/.keepsake/memories"));
    }

    #[test]
    fn home_prefers_home_then_userprofile() {
        let cwd = Path::new("/work/proj");
        let both = lookup(&[("HOME", "/home/u"), ("USERPROFILE", "/users/u")]);
        assert_eq!(home_from(both, cwd), PathBuf::from("/home/u"));
        let profile = lookup(&[("USERPROFILE", "/users/u")]);
        assert_eq!(home_from(profile, cwd), PathBuf::from("/users/u"));
    }

    // ── load / save ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());

        let cfg = Config {
            global_dir: Some(PathBuf::from("/srv/mem")),
            local_dir: None,
            log_level: "debug".to_string(),
        };
        save_to(&cfg, &path).expect("save");

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("local_dir"));

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.global_dir, Some(PathBuf::from("/srv/mem")));
        assert_eq!(loaded.local_dir, None);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "").unwrap();
        let cfg: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "global_dir = [not toml").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "state directory must have 0o700 permissions");
    }

    // ── env overrides ────────────────────────────────────────────────────────

    #[test]
    fn overrides_replace_dirs_and_level() {
        let mut cfg = Config::default();
        apply_overrides_from(
            &mut cfg,
            lookup(&[
                ("KEEPSAKE_GLOBAL_DIR", "/g"),
                ("KEEPSAKE_LOCAL_DIR", "/l"),
                ("KEEPSAKE_LOG_LEVEL", "trace"),
            ]),
        );
        assert_eq!(cfg.global_dir, Some(PathBuf::from("/g")));
        assert_eq!(cfg.local_dir, Some(PathBuf::from("/l")));
        assert_eq!(cfg.log_level, "trace");
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut cfg = Config {
            global_dir: Some(PathBuf::from("/keep")),
            ..Config::default()
        };
        apply_overrides_from(&mut cfg, lookup(&[("KEEPSAKE_GLOBAL_DIR", "")]));
        assert_eq!(cfg.global_dir, Some(PathBuf::from("/keep")));
    }
}
