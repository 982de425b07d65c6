use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8000")]
    pub port: u16,

    #[envconfig(default = "http://localhost:8001")]
    pub store_service_url: String,

    #[envconfig(default = "http://localhost:8002")]
    pub analysis_service_url: String,

    #[envconfig(default = "30000")]
    pub upstream_timeout_ms: u64,

    #[envconfig(default = "11534336")] // 11 MiB, a little over the store's upload limit
    pub max_body_bytes: usize,

    #[envconfig(default = "false")]
    pub enable_metrics: bool,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}
