//! Фильтрующий адаптер поверх [`Feed`].
//!
//! [`with_filter`] связывает фабрику фидов с предикатом и возвращает
//! [`FilterHandler`]. Каждый вызов [`FilterHandler::subscribe`] создаёт
//! свежий нижележащий фид и оборачивает его в [`FilteredFeed`], который
//! отдаёт потребителю только принятые предикатом payload'ы.
//!
//! Цикл «тянуть, пока предикат не примет» не ограничен: если источник
//! публикует только отклоняемые сообщения, `next()` ждёт бесконечно.
//! Выйти из такого фида можно только через `terminate()`.

use std::{
    future::Future,
    marker::PhantomData,
    pin::pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use super::Feed;
use crate::{BoxError, FeedError, PubSubError};

/// Решает, доставлять ли payload конкретной подписке.
///
/// `ctx` содержит данные подписки, захваченные при её создании (обычно
/// [`SharedContext`]); передаются без изменений в каждый вызов.
#[async_trait]
pub trait Predicate<T, C>: Send + Sync {
    async fn test(
        &self,
        payload: &T,
        ctx: &C,
    ) -> Result<bool, BoxError>;
}

/// Синхронный предикат из замыкания `Fn(&T, &C) -> bool`.
pub struct FnPredicate<F>(F);

/// Синхронный предикат, который может завершиться ошибкой.
pub struct TryFnPredicate<F>(F);

/// Асинхронный предикат: замыкание получает клоны payload'а и контекста и
/// возвращает future.
pub struct AsyncFnPredicate<F>(F);

pub fn predicate_fn<T, C, F>(f: F) -> FnPredicate<F>
where
    F: Fn(&T, &C) -> bool,
{
    FnPredicate(f)
}

pub fn try_predicate_fn<T, C, E, F>(f: F) -> TryFnPredicate<F>
where
    F: Fn(&T, &C) -> Result<bool, E>,
{
    TryFnPredicate(f)
}

pub fn async_predicate_fn<T, C, E, Fut, F>(f: F) -> AsyncFnPredicate<F>
where
    F: Fn(T, C) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    AsyncFnPredicate(f)
}

#[async_trait]
impl<T, C, F> Predicate<T, C> for FnPredicate<F>
where
    T: Sync,
    C: Sync,
    F: Fn(&T, &C) -> bool + Send + Sync,
{
    async fn test(
        &self,
        payload: &T,
        ctx: &C,
    ) -> Result<bool, BoxError> {
        Ok((self.0)(payload, ctx))
    }
}

#[async_trait]
impl<T, C, E, F> Predicate<T, C> for TryFnPredicate<F>
where
    T: Sync,
    C: Sync,
    E: Into<BoxError>,
    F: Fn(&T, &C) -> Result<bool, E> + Send + Sync,
{
    async fn test(
        &self,
        payload: &T,
        ctx: &C,
    ) -> Result<bool, BoxError> {
        (self.0)(payload, ctx).map_err(Into::into)
    }
}

#[async_trait]
impl<T, C, E, Fut, F> Predicate<T, C> for AsyncFnPredicate<F>
where
    T: Clone + Send + Sync,
    C: Clone + Send + Sync,
    E: Into<BoxError>,
    Fut: Future<Output = Result<bool, E>> + Send,
    F: Fn(T, C) -> Fut + Send + Sync,
{
    async fn test(
        &self,
        payload: &T,
        ctx: &C,
    ) -> Result<bool, BoxError> {
        (self.0)(payload.clone(), ctx.clone())
            .await
            .map_err(Into::into)
    }
}

/// Данные подписки от исполняющего движка: аргументы, контекст и
/// служебная информация. Фильтр их не интерпретирует.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionContext<A, X, I> {
    pub args: A,
    pub context: X,
    pub info: I,
}

/// Контекст, разделяемый между всеми вызовами предиката одной подписки.
pub type SharedContext<A, X, I> = Arc<SubscriptionContext<A, X, I>>;

/// Состояние [`FilteredFeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Active,
    /// Запрошено закрытие, но pull ещё не завершился.
    Draining,
    Closed,
}

struct Lifecycle {
    state: FilterState,
    in_flight: usize,
}

/// Учёт незавершённого pull'а. Снимается в `Drop`, поэтому отменённый
/// future `next()` тоже корректно завершает переход `Draining -> Closed`.
struct InFlight<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    exhausted: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.in_flight -= 1;
        match lifecycle.state {
            FilterState::Active if self.exhausted => lifecycle.state = FilterState::Closed,
            FilterState::Draining if lifecycle.in_flight == 0 => {
                lifecycle.state = FilterState::Closed
            }
            _ => {}
        }
    }
}

/// Фид, пропускающий только payload'ы, принятые предикатом.
pub struct FilteredFeed<F, P, C> {
    inner: F,
    predicate: Arc<P>,
    ctx: C,
    lifecycle: Mutex<Lifecycle>,
    cancelled: AtomicBool,
    shutdown: Notify,
}

impl<F, P, C> FilteredFeed<F, P, C>
where
    F: Feed,
    F::Item: Sync,
    P: Predicate<F::Item, C>,
    C: Send + Sync,
{
    pub fn new(
        inner: F,
        predicate: Arc<P>,
        ctx: C,
    ) -> Self {
        Self {
            inner,
            predicate,
            ctx,
            lifecycle: Mutex::new(Lifecycle {
                state: FilterState::Active,
                in_flight: 0,
            }),
            cancelled: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn state(&self) -> FilterState {
        self.lifecycle.lock().state
    }

    /// Контекст подписки, переданный при создании.
    pub fn context(&self) -> &C {
        &self.ctx
    }

    fn begin_pull(&self) -> Option<InFlight<'_>> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != FilterState::Active {
            return None;
        }
        lifecycle.in_flight += 1;
        Some(InFlight {
            lifecycle: &self.lifecycle,
            exhausted: false,
        })
    }

    async fn cancelled(&self) {
        loop {
            let mut notified = pin!(self.shutdown.notified());
            notified.as_mut().enable();
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    async fn pull_matching(&self) -> Result<Option<F::Item>, FeedError> {
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return Ok(None);
            }
            let Some(payload) = self.inner.next().await? else {
                return Ok(None);
            };

            match self.predicate.test(&payload, &self.ctx).await {
                Ok(true) => return Ok(Some(payload)),
                Ok(false) => trace!("Payload rejected by filter"),
                Err(source) => {
                    warn!(error = %source, "Filter predicate failed");
                    return Err(FeedError::PredicateFailure(source));
                }
            }
        }
    }
}

#[async_trait]
impl<F, P, C> Feed for FilteredFeed<F, P, C>
where
    F: Feed,
    F::Item: Sync,
    P: Predicate<F::Item, C>,
    C: Send + Sync,
{
    type Item = F::Item;

    async fn next(&self) -> Result<Option<F::Item>, FeedError> {
        let Some(mut in_flight) = self.begin_pull() else {
            return Ok(None);
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancelled() => Ok(None),
            res = self.pull_matching() => res,
        };

        in_flight.exhausted = matches!(outcome, Ok(None));
        drop(in_flight);
        outcome
    }

    async fn terminate(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == FilterState::Active {
                lifecycle.state = if lifecycle.in_flight > 0 {
                    FilterState::Draining
                } else {
                    FilterState::Closed
                };
            }
        }

        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_waiters();
        debug!("Filtered feed terminated");
        self.inner.terminate().await;
    }

    fn is_terminated(&self) -> bool {
        self.state() != FilterState::Active
    }
}

/// Обработчик подписки, возвращаемый [`with_filter`].
pub struct FilterHandler<Fac, P> {
    factory: Fac,
    predicate: Arc<P>,
}

/// Связывает фабрику фидов с предикатом.
///
/// Фабрика вызывается на каждую новую подписку, так что независимые
/// потребители получают независимые нижележащие фиды.
pub fn with_filter<Fac, F, P>(
    factory: Fac,
    predicate: P,
) -> FilterHandler<Fac, P>
where
    Fac: Fn() -> Result<F, PubSubError>,
    F: Feed,
{
    FilterHandler {
        factory,
        predicate: Arc::new(predicate),
    }
}

impl<Fac, F, P> FilterHandler<Fac, P>
where
    Fac: Fn() -> Result<F, PubSubError>,
    F: Feed,
    F::Item: Sync,
{
    /// Создаёт отфильтрованный фид для новой подписки.
    pub fn subscribe<A, X, I>(
        &self,
        args: A,
        context: X,
        info: I,
    ) -> Result<FilteredFeed<F, P, SharedContext<A, X, I>>, PubSubError>
    where
        A: Send + Sync,
        X: Send + Sync,
        I: Send + Sync,
        P: Predicate<F::Item, SharedContext<A, X, I>>,
    {
        let inner = (self.factory)()?;
        let ctx = Arc::new(SubscriptionContext {
            args,
            context,
            info,
        });
        Ok(FilteredFeed::new(inner, self.predicate.clone(), ctx))
    }

    pub fn predicate(&self) -> &P {
        &self.predicate
    }
}

/// Предикат, принимающий всё.
pub struct AcceptAll<T>(PhantomData<fn(&T)>);

impl<T> Default for AcceptAll<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<T, C> Predicate<T, C> for AcceptAll<T>
where
    T: Sync,
    C: Sync,
{
    async fn test(
        &self,
        _payload: &T,
        _ctx: &C,
    ) -> Result<bool, BoxError> {
        Ok(true)
    }
}
