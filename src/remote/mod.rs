pub mod pusher;
pub mod sink;
pub mod sqlite_sink;

pub use pusher::AggPusher;
pub use sink::{AggSink, SinkError};
pub use sqlite_sink::SqliteAggSink;
