use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    pin::pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{Listener, PubSubEngine, SubscriptionId};
use crate::{FeedError, PubSubError};

/// Pull-последовательность событий одной подписки.
///
/// - `next()` возвращает `Ok(Some(payload))`, `Ok(None)` (конец
///   последовательности, больше значений не будет) или ошибку конкретного
///   pull'а.
/// - `terminate()` досрочно закрывает фид и освобождает нижележащие ресурсы.
///   Может вызываться конкурентно с незавершённым `next()`: тот завершается
///   с `Ok(None)`. Повторные вызовы ничего не делают.
///
/// Оба метода принимают `&self`, чтобы закрытие можно было запросить из
/// другой задачи, пока `next()` ждёт события.
#[async_trait]
pub trait Feed: Send + Sync {
    type Item: Send;

    async fn next(&self) -> Result<Option<Self::Item>, FeedError>;

    async fn terminate(&self);

    fn is_terminated(&self) -> bool;
}

#[async_trait]
impl<F> Feed for Arc<F>
where
    F: Feed + ?Sized,
{
    type Item = F::Item;

    async fn next(&self) -> Result<Option<Self::Item>, FeedError> {
        (**self).next().await
    }

    async fn terminate(&self) {
        (**self).terminate().await
    }

    fn is_terminated(&self) -> bool {
        (**self).is_terminated()
    }
}

/// Буфер фида, разделяемый с callback'ом брокера.
///
/// Брокер держит только `Weak` на буфер: если фид уничтожен, callback
/// превращается в no-op.
struct FeedBuffer<T> {
    queue: Mutex<VecDeque<T>>,
    running: AtomicBool,
    notify: Notify,
    capacity: Option<NonZeroUsize>,
}

impl<T> FeedBuffer<T> {
    fn push(
        &self,
        payload: T,
    ) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.queue.lock();
            if let Some(capacity) = self.capacity {
                if queue.len() >= capacity.get() {
                    queue.pop_front();
                    warn!(
                        capacity = capacity.get(),
                        "Feed buffer full, oldest payload dropped"
                    );
                }
            }
            queue.push_back(payload);
        }
        self.notify.notify_waiters();
    }

    fn pop(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Фид, который брокер создаёт на каждый вызов `async_iterator`.
///
/// Сообщения, пришедшие без ожидающего `next()`, буферизуются и выдаются в
/// порядке публикации, по одному на pull. Закрытие (явное, через
/// [`AsyncFeed::close`] / [`Feed::terminate`], или при `Drop`) ровно один раз
/// снимает все регистрации в движке, очищает буфер и будит ожидающие
/// `next()` с концом последовательности.
pub struct AsyncFeed<T> {
    buffer: Arc<FeedBuffer<T>>,
    engine: Arc<dyn PubSubEngine<T>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl<T> AsyncFeed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Подписывает новый фид на `topics` через `engine`.
    pub fn new<I, S>(
        engine: Arc<dyn PubSubEngine<T>>,
        topics: I,
    ) -> Result<Self, PubSubError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_capacity(engine, topics, None)
    }

    /// То же, что [`AsyncFeed::new`], но с ограничением буфера.
    pub fn with_capacity<I, S>(
        engine: Arc<dyn PubSubEngine<T>>,
        topics: I,
        capacity: Option<NonZeroUsize>,
    ) -> Result<Self, PubSubError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let buffer = Arc::new(FeedBuffer {
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
            notify: Notify::new(),
            capacity,
        });

        let mut subscriptions = Vec::new();
        for topic in topics {
            let weak: Weak<FeedBuffer<T>> = Arc::downgrade(&buffer);
            let listener: Listener<T> = Arc::new(move |payload: &T| {
                if let Some(buffer) = weak.upgrade() {
                    buffer.push(payload.clone());
                }
            });

            match engine.subscribe(topic.as_ref(), listener) {
                Ok(id) => subscriptions.push(id),
                Err(err) => {
                    for id in subscriptions {
                        engine.unsubscribe(id);
                    }
                    return Err(err);
                }
            }
        }

        debug!(subscriptions = subscriptions.len(), "Feed opened");
        Ok(Self {
            buffer,
            engine,
            subscriptions: Mutex::new(subscriptions),
        })
    }

    /// Ждёт следующий payload.
    ///
    /// Возвращает `None`, когда фид закрыт. Уже буферизованные сообщения
    /// отдаются сразу.
    pub async fn recv(&self) -> Option<T> {
        loop {
            if !self.buffer.is_running() {
                return None;
            }
            if let Some(payload) = self.buffer.pop() {
                return Some(payload);
            }

            let mut notified = pin!(self.buffer.notify.notified());
            notified.as_mut().enable();

            // повторная проверка после регистрации в Notify
            if !self.buffer.is_running() {
                return None;
            }
            if let Some(payload) = self.buffer.pop() {
                return Some(payload);
            }

            notified.await;
        }
    }

    /// Количество сообщений, ожидающих pull.
    pub fn len(&self) -> usize {
        self.buffer.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.queue.lock().is_empty()
    }
}

impl<T> AsyncFeed<T> {
    /// Закрывает фид. Только первый вызов имеет эффект.
    pub fn close(&self) {
        if !self.buffer.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.buffer.queue.lock().clear();
        self.buffer.notify.notify_waiters();

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for id in &subscriptions {
            self.engine.unsubscribe(*id);
        }
        debug!(subscriptions = subscriptions.len(), "Feed closed");
    }

    pub fn is_closed(&self) -> bool {
        !self.buffer.running.load(Ordering::Acquire)
    }
}

impl<T> Drop for AsyncFeed<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl<T> Feed for AsyncFeed<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    async fn next(&self) -> Result<Option<T>, FeedError> {
        Ok(self.recv().await)
    }

    async fn terminate(&self) {
        self.close();
    }

    fn is_terminated(&self) -> bool {
        self.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use tokio::time::timeout;

    use super::*;
    use crate::{Broker, BrokerConfig};

    /// Движок-обёртка над брокером, считающий вызовы `unsubscribe`.
    struct CountingEngine {
        broker: Broker<u32>,
        unsubscribes: AtomicUsize,
    }

    impl PubSubEngine<u32> for CountingEngine {
        fn publish(
            &self,
            topic: &str,
            payload: u32,
        ) -> Result<usize, PubSubError> {
            self.broker.publish(topic, payload)
        }

        fn subscribe(
            &self,
            topic: &str,
            listener: Listener<u32>,
        ) -> Result<SubscriptionId, PubSubError> {
            PubSubEngine::subscribe(&self.broker, topic, listener)
        }

        fn unsubscribe(
            &self,
            id: SubscriptionId,
        ) -> bool {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            self.broker.unsubscribe(id)
        }
    }

    fn counting_engine() -> Arc<CountingEngine> {
        Arc::new(CountingEngine {
            broker: Broker::new(),
            unsubscribes: AtomicUsize::new(0),
        })
    }

    /// Проверяет, что pull, выданный до публикации, дожидается её.
    #[tokio::test]
    async fn test_pending_pull_resolves_on_publish() {
        let broker = Broker::<u32>::new();
        let feed = broker.async_iterator("chan").unwrap();

        let (pulled, _) = tokio::join!(feed.next(), async {
            tokio::task::yield_now().await;
            broker.publish("chan", 42).unwrap();
        });

        assert_eq!(pulled.unwrap(), Some(42));
    }

    /// Проверяет, что сообщения без ожидающего pull буферизуются и
    /// выдаются в порядке публикации.
    #[tokio::test]
    async fn test_buffered_payloads_keep_publish_order() {
        let broker = Broker::<u32>::new();
        let feed = broker.async_iterator("chan").unwrap();

        for n in 1..=3 {
            broker.publish("chan", n).unwrap();
        }
        assert_eq!(feed.len(), 3);

        for n in 1..=3 {
            assert_eq!(feed.next().await.unwrap(), Some(n));
        }
        assert!(feed.is_empty());
    }

    /// Проверяет, что закрытие будит ожидающий pull концом
    /// последовательности.
    #[tokio::test]
    async fn test_close_resolves_pending_pull() {
        let broker = Broker::<u32>::new();
        let feed = broker.async_iterator("chan").unwrap();

        let (pulled, _) = tokio::join!(feed.next(), async {
            tokio::task::yield_now().await;
            feed.terminate().await;
        });

        assert_eq!(pulled.unwrap(), None);
        assert!(feed.is_terminated());
        assert_eq!(broker.listener_count("chan"), 0);
    }

    /// Проверяет, что после закрытия буфер отбрасывается, а новые
    /// публикации до фида не доходят.
    #[tokio::test]
    async fn test_close_discards_buffer() {
        let broker = Broker::<u32>::new();
        let feed = broker.async_iterator("chan").unwrap();
        broker.publish("chan", 1).unwrap();

        feed.close();
        assert_eq!(broker.publish("chan", 2).unwrap(), 0);
        assert_eq!(feed.next().await.unwrap(), None);
    }

    /// Проверяет, что повторное закрытие снимает регистрацию ровно один
    /// раз, в том числе при конкурентных вызовах.
    #[tokio::test]
    async fn test_terminate_unsubscribes_exactly_once() {
        let engine = counting_engine();
        let feed = AsyncFeed::<u32>::new(engine.clone(), ["chan"]).unwrap();

        tokio::join!(feed.terminate(), feed.terminate());
        feed.terminate().await;
        drop(feed);

        assert_eq!(engine.unsubscribes.load(Ordering::SeqCst), 1);
        assert_eq!(engine.broker.listener_count("chan"), 0);
    }

    /// Проверяет, что `Drop` фида снимает регистрацию в брокере.
    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let broker = Broker::<u32>::new();
        let feed = broker.async_iterator("chan").unwrap();
        assert_eq!(broker.listener_count("chan"), 1);

        drop(feed);
        assert_eq!(broker.listener_count("chan"), 0);
    }

    /// Проверяет фид на несколько тем и откат регистраций при ошибке.
    #[tokio::test]
    async fn test_multi_topic_feed_and_rollback() {
        let broker = Broker::<u32>::new();
        let feed = broker.async_iterator_for(["a", "b"]).unwrap();
        broker.publish("b", 2).unwrap();
        broker.publish("a", 1).unwrap();

        assert_eq!(feed.next().await.unwrap(), Some(2));
        assert_eq!(feed.next().await.unwrap(), Some(1));

        let err = broker.async_iterator_for(["c", ""]).err();
        assert!(matches!(err, Some(PubSubError::InvalidTopic { .. })));
        assert_eq!(broker.listener_count("c"), 0);
    }

    /// Проверяет, что pull без публикаций остаётся в ожидании.
    #[tokio::test]
    async fn test_pull_without_publish_stays_pending() {
        let broker = Broker::<u32>::new();
        let feed = broker.async_iterator("chan").unwrap();

        let res = timeout(Duration::from_millis(20), feed.next()).await;
        assert!(res.is_err(), "pull must still be pending");
    }

    /// Проверяет вытеснение старейшего сообщения при ограниченном буфере.
    #[tokio::test]
    async fn test_bounded_buffer_drops_oldest() {
        let broker = Broker::<u32>::with_config(BrokerConfig {
            feed_capacity: Some(2),
            ..Default::default()
        })
        .unwrap();
        let feed = broker.async_iterator("chan").unwrap();
        for n in 1..=3 {
            broker.publish("chan", n).unwrap();
        }

        assert_eq!(feed.next().await.unwrap(), Some(2));
        assert_eq!(feed.next().await.unwrap(), Some(3));
    }
}
