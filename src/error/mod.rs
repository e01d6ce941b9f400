pub mod feed;
pub mod pubsub;

pub use feed::{BoxError, FeedError};
pub use pubsub::PubSubError;
