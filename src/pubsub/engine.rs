use super::{Listener, SubscriptionId};
use crate::PubSubError;

/// Минимальный контракт pub/sub движка, поверх которого строится
/// [`AsyncFeed`](super::AsyncFeed).
///
/// Встроенная реализация: [`Broker`](super::Broker). Фид знает о движке
/// только через этот трейт, поэтому его можно подключить к любому другому
/// источнику событий.
pub trait PubSubEngine<T>: Send + Sync {
    /// Рассылает `payload` всем активным слушателям темы.
    ///
    /// Возвращает количество вызванных слушателей.
    fn publish(
        &self,
        topic: &str,
        payload: T,
    ) -> Result<usize, PubSubError>;

    /// Регистрирует слушателя на тему.
    fn subscribe(
        &self,
        topic: &str,
        listener: Listener<T>,
    ) -> Result<SubscriptionId, PubSubError>;

    /// Удаляет регистрацию. Для неизвестного id возвращает `false`, это не ошибка.
    fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool;
}
