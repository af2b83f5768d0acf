pub mod client;
pub mod error;
pub mod http;
pub mod memory;
pub mod traits;
pub mod wire;

pub use client::RemoteClient;
pub use error::StoreError;
pub use traits::{NodeStatusBackend, RemoteStore};
