pub mod models {
    pub mod netatmo;
}

pub mod auth;
pub mod client;
pub mod config;
pub mod services {
    pub mod history;
    pub mod resolver;
    pub mod thermostat;
}
#[cfg(test)]
mod testing;
pub mod transport;
pub mod utils;

pub use client::{ClientError, NetatmoClient};
pub use config::Config;
