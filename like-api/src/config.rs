use envconfig::Envconfig;

use like_common::config::{bind_address, NonEmptyString};
use like_common::event::TargetSet;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3300")]
    pub port: u16,

    #[envconfig(default = "redis://localhost:6379/")]
    pub redis_url: String,

    #[envconfig(default = "like_queue")]
    pub queue_name: NonEmptyString,

    /// Entities a bare `POST /like` picks from.
    #[envconfig(default = "post:1,post:2,post:3")]
    pub like_targets: TargetSet,

    #[envconfig(default = "1000")]
    pub concurrency_limit: usize,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    pub fn bind(&self) -> String {
        bind_address(&self.host, self.port)
    }
}
