pub mod assistant;
pub mod cli;
pub mod config;
pub mod relay;
pub mod server;
pub mod session;
pub mod store;

pub use config::Config;
pub use relay::{Relay, RelayError, RelaySettings};
pub use store::ChatStore;
