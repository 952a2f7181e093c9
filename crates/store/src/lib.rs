pub mod db;
pub mod query;
pub mod retention;
pub mod schema;
pub mod sink;
pub mod write;

pub use db::Store;
pub use sink::NotificationSink;
