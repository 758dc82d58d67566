use crate::registry::RegistryConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(name = "doudizhu-server", about = "Fight-the-Landlord game server")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "DDZ_BIND", default_value = "0.0.0.0:33030")]
    pub bind: SocketAddr,

    /// Seconds a game may live before the reaper removes it
    #[arg(long, env = "DDZ_IDLE_TIMEOUT_SECS", default_value_t = 30 * 60)]
    pub idle_timeout_secs: u64,

    /// Seconds between idle-game sweeps
    #[arg(long, env = "DDZ_REAP_INTERVAL_SECS", default_value_t = 60)]
    pub reap_interval_secs: u64,

    /// Tracing filter directive
    #[arg(long, env = "DDZ_LOG", default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}
