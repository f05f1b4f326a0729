pub mod destination;
pub mod entry;
pub mod feed;
pub mod sent;

pub use destination::{Destination, NewDestination};
pub use entry::{Extensions, FeedEntry};
pub use feed::{FeedConfig, FeedOverview, DEFAULT_FORMAT};
pub use sent::SentRecord;
