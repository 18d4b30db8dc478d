#![doc = include_str!("../README.md")]

pub mod asn;
pub mod error;
pub mod manager;

pub use asn::{AsnInfo, CachedMetadata, IpMetadata, StaticMetadata};
pub use error::DataMgmtError;
pub use manager::{arpa_to_ip, DataManager, DataManagerBuilder};
