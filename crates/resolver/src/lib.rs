#![doc = include_str!("../README.md")]

pub mod client;
pub mod error;
pub mod service;

pub use client::{reverse_query_name, DnsClient, HickoryClient};
pub use error::ResolverError;
pub use service::{query_plan, ResolverService};
