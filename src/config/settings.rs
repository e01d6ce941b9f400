use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Максимальная длина имени темы по умолчанию (в байтах).
pub const DEFAULT_MAX_TOPIC_LEN: usize = 256;

/// Настройки брокера.
///
/// Все лимиты опциональны: по умолчанию брокер не ограничивает число
/// слушателей на тему, а фиды буферизуют сообщения без ограничения.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Максимальная длина имени темы.
    pub max_topic_len: usize,
    /// Лимит слушателей на одну тему (`None`: без лимита).
    pub max_listeners_per_topic: Option<usize>,
    /// Ёмкость буфера одного фида (`None`: без лимита). При переполнении
    /// вытесняется самое старое сообщение.
    pub feed_capacity: Option<usize>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_topic_len: DEFAULT_MAX_TOPIC_LEN,
            max_listeners_per_topic: None,
            feed_capacity: None,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_topic_len == 0 {
            return Err(ConfigError::Message(
                "broker.max_topic_len must be greater than 0".into(),
            ));
        }
        if self.max_listeners_per_topic == Some(0) {
            return Err(ConfigError::Message(
                "broker.max_listeners_per_topic must be greater than 0".into(),
            ));
        }
        if self.feed_capacity == Some(0) {
            return Err(ConfigError::Message(
                "broker.feed_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Настройки процесса: брокер и логирование.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки из переменных окружения с префиксом
    /// `FEEDBRIDGE_`, вложенные ключи разделяются `__`
    /// (например, `FEEDBRIDGE_BROKER__MAX_TOPIC_LEN=64`).
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Значения по умолчанию
            .set_default("broker.max_topic_len", DEFAULT_MAX_TOPIC_LEN as u64)?
            .set_default("logging.level", "info")?
            // Переменные окружения с префиксом FEEDBRIDGE_
            .add_source(
                Environment::with_prefix("FEEDBRIDGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.broker.validate()?;
        Ok(settings)
    }
}
