use envconfig::Envconfig;

use like_common::config::EnvMsDuration;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "http://localhost:3300/like")]
    pub target_url: String,

    #[envconfig(default = "1000")]
    pub request_count: usize,

    #[envconfig(default = "50")]
    pub concurrent_workers: usize,

    #[envconfig(default = "10000")]
    pub request_timeout: EnvMsDuration,

    /// Give the services a moment to come up before the first request.
    #[envconfig(default = "5000")]
    pub startup_delay: EnvMsDuration,
}
