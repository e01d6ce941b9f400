use thiserror::Error;

use crate::pubsub::SubscriptionId;

/// Ошибки брокера: регистрация, отписка и публикация.
///
/// Все варианты возвращаются синхронно вызывающему `subscribe` /
/// `publish` / `try_unsubscribe` и не затрагивают другие подписки.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    #[error("invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("listener limit of {limit} reached for topic {topic:?}")]
    ListenerLimitExceeded { topic: String, limit: usize },
}

impl PubSubError {
    pub(crate) fn invalid_topic(
        topic: &str,
        reason: &'static str,
    ) -> Self {
        PubSubError::InvalidTopic {
            topic: topic.to_string(),
            reason,
        }
    }
}
