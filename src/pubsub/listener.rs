use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Callback, который брокер вызывает на каждый `publish` в тему.
///
/// Получает payload по ссылке: брокер не клонирует и не хранит сообщение.
/// Если слушателю нужно сохранить payload (например, до следующего pull),
/// он клонирует его сам.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Идентификатор подписки, выдаваемый брокером.
///
/// Монотонно растёт в пределах одного брокера, начиная с 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Запись реестра: слушатель плюс флаг активности.
///
/// Флаг снимается при отписке. Рассылка идёт по снимку реестра, поэтому
/// запись может оказаться в снимке уже после удаления; флаг проверяется
/// непосредственно перед вызовом.
pub(crate) struct ListenerEntry<T> {
    pub(crate) id: SubscriptionId,
    callback: Listener<T>,
    active: AtomicBool,
}

impl<T> ListenerEntry<T> {
    pub(crate) fn new(
        id: SubscriptionId,
        callback: Listener<T>,
    ) -> Self {
        Self {
            id,
            callback,
            active: AtomicBool::new(true),
        }
    }

    /// Вызывает слушателя, если он ещё зарегистрирован.
    pub(crate) fn deliver(
        &self,
        payload: &T,
    ) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        (self.callback)(payload);
        true
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_subscription_id_display_and_order() {
        let a = SubscriptionId::from_raw(1);
        let b = SubscriptionId::from_raw(2);
        assert!(a < b);
        assert_eq!(a.to_string(), "#1");
        assert_eq!(b.as_u64(), 2);
    }

    /// Тест проверяет, что деактивированная запись больше не вызывает
    /// callback.
    #[test]
    fn test_deactivated_entry_skips_delivery() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = hits.clone();
        let entry = ListenerEntry::new(
            SubscriptionId::from_raw(1),
            Arc::new(move |_: &u32| {
                hits_cb.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(entry.deliver(&1));
        entry.deactivate();
        assert!(!entry.is_active());
        assert!(!entry.deliver(&2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
