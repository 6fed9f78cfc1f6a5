pub mod feed;
pub mod item;
pub mod spec;

pub use feed::FeedChannel;
pub use item::FeedItem;
pub use spec::{AuthSpec, Credentials, GeneratorParams, GeneratorSpec, Payload};
