#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod client;
pub mod http;
pub mod mock;
pub mod provider;

pub use client::{EmbeddingClient, EmbeddingUsage, UsageSnapshot};
pub use http::HttpProvider;
pub use mock::HashProvider;
pub use provider::{EmbeddingProvider, ProviderBatch};
