//! nanorelay-core: configuration, errors and identifier types shared by
//! every NanoRelay crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use types::{AccountId, ClientId};
