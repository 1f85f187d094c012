use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout: String,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            session_idle_timeout: default_session_idle_timeout(),
            sysfs_root: default_sysfs_root(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml(&text, path_display)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn from_yaml(text: &str, path_display: String) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "поле socket_path обязательно".to_string(),
            ));
        }
        if self.sysfs_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "поле sysfs_root не должно быть пустым".to_string(),
            ));
        }
        let timeout = self.idle_timeout()?;
        if timeout < Duration::from_secs(1) {
            return Err(ConfigError::Validation(
                "session_idle_timeout должно быть >= 1s".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.session_idle_timeout).map_err(|err| {
            ConfigError::Validation(format!(
                "session_idle_timeout '{}' не является длительностью: {err}",
                self.session_idle_timeout
            ))
        })
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/sysfetchd.sock")
}

fn default_session_idle_timeout() -> String {
    "5m".to_string()
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_is_valid() {
        let cfg = Config::from_yaml(Config::example_yaml(), "example".to_string())
            .expect("пример конфигурации должен проходить валидацию");
        assert_eq!(cfg.socket_path, PathBuf::from("/run/sysfetchd.sock"));
        assert_eq!(cfg.idle_timeout().expect("таймаут"), Duration::from_secs(300));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = Config::from_yaml("socket_path: /tmp/x.sock\n", "inline".to_string())
            .expect("валидная конфигурация");
        assert_eq!(cfg.sysfs_root, PathBuf::from("/sys"));
        assert_eq!(cfg.session_idle_timeout, "5m");
    }

    #[test]
    fn rejects_bad_idle_timeout() {
        let cfg = Config {
            session_idle_timeout: "soon".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let cfg = Config {
            session_idle_timeout: "10ms".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_empty_socket_path() {
        let cfg = Config {
            socket_path: PathBuf::new(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("временный каталог");
        let cfg = Config::load_or_default(dir.path().join("absent.yaml"))
            .expect("отсутствующий файл допустим");
        assert_eq!(cfg.socket_path, default_socket_path());

        let err = Config::load_from_file(dir.path().join("absent.yaml"))
            .expect_err("load_from_file требует файл");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
