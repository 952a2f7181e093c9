pub mod comparison;
pub mod dashboard;
pub mod insights;
pub mod notification;
pub mod service_map;
pub mod span;
pub mod tag;
pub mod trace;
