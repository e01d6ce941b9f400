/// Settings loading (broker limits, logging) from the environment.
pub mod config;
/// Common error types: broker errors and feed pull errors.
pub mod error;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Pub/Sub: Broker, AsyncFeed, FilteredFeed.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::{BrokerConfig, Settings};
/// Operation errors.
pub use error::{BoxError, FeedError, PubSubError};
/// Logging bootstrap.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Pub/Sub API.
pub use pubsub::{
    async_predicate_fn, into_stream, predicate_fn, try_predicate_fn, with_filter, AcceptAll,
    AsyncFeed, Broker, BrokerStats, Feed, FilterHandler, FilterState, FilteredFeed, Listener,
    Predicate, PubSubEngine, SharedContext, SubscriptionContext, SubscriptionId,
};
