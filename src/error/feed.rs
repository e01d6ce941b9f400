use thiserror::Error;

/// Ошибка, которую может вернуть пользовательский предикат.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Ошибка отдельного pull-запроса к фиду.
///
/// Ошибка относится только к тому `next()`, который её вернул: фид остаётся
/// активным, следующий `next()` продолжит со следующего payload, а
/// `terminate()` отрабатывает как обычно.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("predicate evaluation failed: {0}")]
    PredicateFailure(#[source] BoxError),
}

impl FeedError {
    /// Возвращает `true`, если pull упал в предикате фильтра.
    pub fn is_predicate_failure(&self) -> bool {
        matches!(self, FeedError::PredicateFailure(_))
    }
}
