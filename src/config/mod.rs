pub mod settings;

pub use settings::{BrokerConfig, Settings, DEFAULT_MAX_TOPIC_LEN};
