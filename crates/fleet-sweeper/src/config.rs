use std::env;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub database_url: String,
    pub sweep_interval_secs: u64,
}

impl SweeperConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            sweep_interval_secs: parse_interval(
                &env::var("SWEEP_INTERVAL_SECS").unwrap_or_else(|_| "300".into()),
            ),
        }
    }
}

fn parse_interval(raw: &str) -> u64 {
    let secs: u64 = raw
        .parse()
        .expect("SWEEP_INTERVAL_SECS must be a valid u64");
    assert!(secs > 0, "SWEEP_INTERVAL_SECS must be greater than zero");
    secs
}
