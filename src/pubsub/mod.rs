//! Подсистема Publish–Subscribe (pub/sub) и мост к pull-фидам.
//!
//! - `broker`: реестр слушателей по темам, публикация и отписка.
//! - `engine`: трейт `PubSubEngine`, через который фиды общаются с брокером.
//! - `feed`: трейт `Feed` и `AsyncFeed`, отменяемая pull-последовательность
//!   одной подписки.
//! - `filter`: `with_filter` и `FilteredFeed`: серверная фильтрация
//!   payload'ов предикатом.
//! - `listener`: идентификаторы подписок и записи реестра.
//! - `stream`: адаптер `Feed` → `futures::Stream`.

pub mod broker;
pub mod engine;
pub mod feed;
pub mod filter;
pub mod listener;
pub mod stream;

pub use broker::*;
pub use engine::*;
pub use feed::*;
pub use filter::*;
pub(crate) use listener::ListenerEntry;
pub use listener::{Listener, SubscriptionId};
pub use stream::*;
