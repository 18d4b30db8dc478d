#![doc = include_str!("../README.md")]

pub mod error;
pub mod sink;
pub mod store;

pub use error::StoreError;
pub use sink::{DataOptsWriter, GraphSink};
pub use store::{EdgeKind, MemoryGraph};
