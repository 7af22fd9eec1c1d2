use dotenv::dotenv;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const RABBIT_URL: &str = "RABBIT_URL";
const PAYMENT_SERVICE_URL: &str = "PAYMENT_SERVICE_URL";
const BIND_ADDR: &str = "BIND_ADDR";
const SETTLE_INTERVAL_SECS: &str = "SETTLE_INTERVAL_SECS";
const PAYMENT_QUEUE: &str = "PAYMENT_QUEUE";
const APP_ID: &str = "APP_ID";

#[derive(Clone)]
pub struct Config {
    pub rabbit_url: String,
    pub payment_service_url: String,
    pub bind_addr: SocketAddr,
    pub settle_interval: Duration,
    pub payment_queue: String,
    pub app_id: String,
}

impl Config {
    pub fn from_env() -> Config {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_from_env() -> Result<Config, String> {
        // Load .env file
        dotenv().ok();

        let rabbit_url = env::var(RABBIT_URL)
            .map_err(|_| format!("failed to load environment variable {}", RABBIT_URL))?;

        let payment_service_url = env::var(PAYMENT_SERVICE_URL).map_err(|_| {
            format!(
                "failed to load environment variable {}",
                PAYMENT_SERVICE_URL
            )
        })?;

        let bind_addr = env::var(BIND_ADDR)
            .unwrap_or_else(|_| "0.0.0.0:8084".to_string())
            .parse::<SocketAddr>()
            .map_err(|_| format!("failed to parse {}", BIND_ADDR))?;

        let settle_interval = env::var(SETTLE_INTERVAL_SECS)
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("failed to parse {}", SETTLE_INTERVAL_SECS))?;

        let payment_queue =
            env::var(PAYMENT_QUEUE).unwrap_or_else(|_| "auction.payment-events".to_string());

        let app_id = env::var(APP_ID).unwrap_or_else(|_| "auction-settlement".to_string());

        Ok(Config {
            rabbit_url,
            payment_service_url,
            bind_addr,
            settle_interval,
            payment_queue,
            app_id,
        })
    }
}
