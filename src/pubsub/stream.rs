use futures::stream::{self, BoxStream, StreamExt};

use super::Feed;
use crate::FeedError;

/// Превращает фид в `Stream` для движков, работающих со стримами.
///
/// Стрим заканчивается на конце последовательности фида. Ошибки pull'ов
/// отдаются как `Err` и стрим не обрывают. Drop стрима уничтожает фид
/// (а [`AsyncFeed`](super::AsyncFeed) при уничтожении отписывается).
pub fn into_stream<F>(feed: F) -> BoxStream<'static, Result<F::Item, FeedError>>
where
    F: Feed + 'static,
    F::Item: 'static,
{
    stream::unfold(feed, |feed| async move {
        match feed.next().await {
            Ok(Some(item)) => Some((Ok(item), feed)),
            Ok(None) => None,
            Err(err) => Some((Err(err), feed)),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{predicate_fn, Broker, FilteredFeed, SharedContext};

    #[tokio::test]
    async fn test_stream_yields_until_feed_ends() {
        let broker = Broker::<u32>::new();
        let feed = Arc::new(broker.async_iterator("chan").unwrap());
        let mut events = into_stream(feed.clone());

        broker.publish("chan", 1).unwrap();
        broker.publish("chan", 2).unwrap();

        assert_eq!(events.next().await.unwrap().unwrap(), 1);
        assert_eq!(events.next().await.unwrap().unwrap(), 2);

        feed.close();
        assert!(events.next().await.is_none());
    }

    /// Проверяет, что отфильтрованный фид тоже работает как стрим, а
    /// drop стрима снимает подписку.
    #[tokio::test]
    async fn test_filtered_stream_and_drop_unsubscribes() {
        type Ctx = SharedContext<(), (), ()>;

        let broker = Broker::<u32>::new();
        let feed = FilteredFeed::new(
            broker.async_iterator("chan").unwrap(),
            Arc::new(predicate_fn(|n: &u32, _: &Ctx| *n > 1)),
            Ctx::default(),
        );
        let mut events = into_stream(feed);

        broker.publish("chan", 1).unwrap();
        broker.publish("chan", 2).unwrap();
        assert_eq!(events.next().await.unwrap().unwrap(), 2);

        drop(events);
        assert_eq!(broker.listener_count("chan"), 0);
    }
}
