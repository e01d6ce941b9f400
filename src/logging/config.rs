use std::{fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Формат вывода в консоль.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию (`RUST_LOG` имеет приоритет).
    pub level: String,
    pub format: LogFormat,
    pub console_enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    /// Писать ли лог в файл с ежедневной ротацией.
    pub file_enabled: bool,
    pub log_dir: PathBuf,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::default(),
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_name: "feedbridge.log".into(),
        }
    }
}

impl LoggingConfig {
    /// Директива для `EnvFilter`: уровень для крейта и для остальных.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.to_lowercase();
        format!("{level},feedbridge={level}")
    }

    pub fn validate(&self) -> Result<(), String> {
        if !LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(format!(
                "unknown log level '{}', expected one of {:?}",
                self.level, LEVELS
            ));
        }
        if self.file_enabled && self.file_name.trim().is_empty() {
            return Err("file logging enabled but file_name is empty".into());
        }
        Ok(())
    }

    /// Создаёт каталог для файлов лога, если файловый вывод включён.
    pub fn ensure_log_dir(&self) -> io::Result<()> {
        if self.file_enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }
}
