//! Pure computations over normalized spans: nothing in this crate performs I/O or holds
//! shared state, so every function is safe to call concurrently from request handlers.

pub mod assemble;
pub mod compare;
pub mod dashboard;
pub mod export;
pub mod insights;
pub mod select;
pub mod service_map;
pub mod stats;

#[cfg(test)]
pub(crate) mod fixtures;

pub use assemble::assemble;
pub use service_map::build_service_map;
