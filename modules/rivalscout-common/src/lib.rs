pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::Config;
pub use error::{Result, RivalScoutError};
pub use policy::DiscoveryPolicy;
pub use types::*;
