use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use config::ConfigError;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, trace};

use super::{AsyncFeed, Listener, ListenerEntry, PubSubEngine, SubscriptionId};
use crate::{BrokerConfig, PubSubError};

type TopicKey = Arc<str>;

/// Снимок счётчиков брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    /// Общее количество успешных вызовов `publish`.
    pub publish_count: usize,
    /// Сколько раз слушатели были вызваны.
    pub delivered_count: usize,
    /// Публикации, не нашедшие ни одного слушателя.
    pub unrouted_count: usize,
}

struct BrokerInner<T> {
    /// Тема → слушатели в порядке регистрации.
    topics: DashMap<TopicKey, Vec<Arc<ListenerEntry<T>>>>,
    /// Подписка → тема, для отписки по id.
    subscriptions: DashMap<SubscriptionId, TopicKey>,
    next_id: AtomicU64,
    config: BrokerConfig,
    publish_count: AtomicUsize,
    delivered_count: AtomicUsize,
    unrouted_count: AtomicUsize,
}

/// Внутрипроцессный pub/sub брокер.
///
/// Поддерживает:
/// - Подписки по точному имени темы
/// - Рассылку по снимку реестра (слушатели могут подписываться и
///   отписываться прямо из callback'а)
/// - Автоматическое удаление пустых тем
/// - Статистику публикаций и доставок
///
/// `Broker` является лёгким handle поверх `Arc`: клоны разделяют один реестр.
pub struct Broker<T> {
    inner: Arc<BrokerInner<T>>,
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Broker<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Broker<T>
where
    T: Send + Sync + 'static,
{
    /// Создаёт брокер с настройками по умолчанию.
    pub fn new() -> Self {
        Self::from_valid_config(BrokerConfig::default())
    }

    /// Создаёт брокер с заданными лимитами.
    ///
    /// Нулевые лимиты отклоняются так же, как при загрузке [`Settings`].
    ///
    /// [`Settings`]: crate::Settings
    pub fn with_config(config: BrokerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                subscriptions: DashMap::new(),
                next_id: AtomicU64::new(1),
                config,
                publish_count: AtomicUsize::new(0),
                delivered_count: AtomicUsize::new(0),
                unrouted_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Регистрирует `on_payload` на все последующие публикации в `topic`.
    ///
    /// Слушатель не вызывается немедленно: он получит только то, что
    /// опубликовано после регистрации.
    pub fn subscribe<F>(
        &self,
        topic: &str,
        on_payload: F,
    ) -> Result<SubscriptionId, PubSubError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(topic, Arc::new(on_payload))
    }

    /// Удаляет подписку.
    ///
    /// Идемпотентна: повторный вызов или неизвестный id возвращают `false`.
    /// Безопасна при вызове из слушателя во время `publish`.
    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool {
        let Some((_, topic)) = self.inner.subscriptions.remove(&id) else {
            debug!(subscription = %id, "Unsubscribe of unknown subscription ignored");
            return false;
        };

        let mut now_empty = false;
        if let Some(mut listeners) = self.inner.topics.get_mut(&topic) {
            listeners.retain(|entry| {
                if entry.id == id {
                    entry.deactivate();
                    false
                } else {
                    true
                }
            });
            now_empty = listeners.is_empty();
        }
        if now_empty {
            self.inner
                .topics
                .remove_if(&topic, |_, listeners| listeners.is_empty());
        }

        debug!(subscription = %id, topic = %topic, "Listener unsubscribed");
        true
    }

    /// Строгая версия [`Broker::unsubscribe`]: для неизвестного id возвращает ошибку.
    pub fn try_unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> Result<(), PubSubError> {
        if self.unsubscribe(id) {
            Ok(())
        } else {
            Err(PubSubError::UnknownSubscription(id))
        }
    }

    /// Публикует `payload` в `topic`.
    ///
    /// Синхронно вызывает всех слушателей темы в порядке регистрации.
    /// Работает по снимку реестра, снятому в начале вызова:
    /// - слушатель, добавленный во время рассылки, этот payload не получит;
    /// - слушатель, удалённый во время рассылки, тоже не получит его,
    ///   даже если уже попал в снимок.
    ///
    /// Публикация в тему без слушателей не считается ошибкой и возвращает `Ok(0)`.
    pub fn publish(
        &self,
        topic: &str,
        payload: T,
    ) -> Result<usize, PubSubError> {
        self.validate_topic(topic)?;
        self.inner.publish_count.fetch_add(1, Ordering::Relaxed);

        let snapshot = match self.inner.topics.get(topic) {
            Some(listeners) => listeners.value().clone(),
            None => {
                self.inner.unrouted_count.fetch_add(1, Ordering::Relaxed);
                trace!(topic, "Publish without listeners");
                return Ok(0);
            }
        };

        let delivered = snapshot
            .iter()
            .filter(|entry| entry.deliver(&payload))
            .count();

        self.inner
            .delivered_count
            .fetch_add(delivered, Ordering::Relaxed);
        trace!(topic, delivered, "Payload dispatched");
        Ok(delivered)
    }

    /// Создаёт новый фид, подписанный на `topic`.
    pub fn async_iterator(
        &self,
        topic: &str,
    ) -> Result<AsyncFeed<T>, PubSubError>
    where
        T: Clone,
    {
        self.async_iterator_for([topic])
    }

    /// Создаёт один фид, слушающий сразу несколько тем.
    ///
    /// Если хотя бы одна тема невалидна, уже сделанные регистрации
    /// откатываются.
    pub fn async_iterator_for<I, S>(
        &self,
        topics: I,
    ) -> Result<AsyncFeed<T>, PubSubError>
    where
        T: Clone,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let engine: Arc<dyn PubSubEngine<T>> = Arc::new(self.clone());
        let capacity = self.inner.config.feed_capacity.and_then(NonZeroUsize::new);
        AsyncFeed::with_capacity(engine, topics, capacity)
    }

    /// Количество активных слушателей темы.
    pub fn listener_count(
        &self,
        topic: &str,
    ) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Количество тем, на которые есть хотя бы один слушатель.
    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            publish_count: self.inner.publish_count.load(Ordering::Relaxed),
            delivered_count: self.inner.delivered_count.load(Ordering::Relaxed),
            unrouted_count: self.inner.unrouted_count.load(Ordering::Relaxed),
        }
    }

    fn register(
        &self,
        topic: &str,
        listener: Listener<T>,
    ) -> Result<SubscriptionId, PubSubError> {
        self.validate_topic(topic)?;

        let key: TopicKey = Arc::from(topic);
        // тема появляется в реестре только вместе с первым слушателем
        let id = match self.inner.topics.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                self.check_listener_limit(topic, occupied.get().len())?;
                let id = self.next_id();
                occupied
                    .get_mut()
                    .push(Arc::new(ListenerEntry::new(id, listener)));
                id
            }
            Entry::Vacant(vacant) => {
                self.check_listener_limit(topic, 0)?;
                let id = self.next_id();
                vacant.insert(vec![Arc::new(ListenerEntry::new(id, listener))]);
                id
            }
        };
        self.inner.subscriptions.insert(id, key);

        debug!(subscription = %id, topic, "Listener subscribed");
        Ok(id)
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::from_raw(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn check_listener_limit(
        &self,
        topic: &str,
        current: usize,
    ) -> Result<(), PubSubError> {
        match self.inner.config.max_listeners_per_topic {
            Some(limit) if current >= limit => Err(PubSubError::ListenerLimitExceeded {
                topic: topic.to_string(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn validate_topic(
        &self,
        topic: &str,
    ) -> Result<(), PubSubError> {
        if topic.is_empty() {
            return Err(PubSubError::invalid_topic(topic, "topic is empty"));
        }
        if topic.trim().is_empty() {
            return Err(PubSubError::invalid_topic(topic, "topic is blank"));
        }
        if topic.len() > self.inner.config.max_topic_len {
            return Err(PubSubError::invalid_topic(topic, "topic is too long"));
        }
        Ok(())
    }
}

impl<T> PubSubEngine<T> for Broker<T>
where
    T: Send + Sync + 'static,
{
    fn publish(
        &self,
        topic: &str,
        payload: T,
    ) -> Result<usize, PubSubError> {
        Broker::publish(self, topic, payload)
    }

    fn subscribe(
        &self,
        topic: &str,
        listener: Listener<T>,
    ) -> Result<SubscriptionId, PubSubError> {
        self.register(topic, listener)
    }

    fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool {
        Broker::unsubscribe(self, id)
    }
}
