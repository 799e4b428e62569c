use std::time::Duration;

/// Hold TTL used when `SEAT_HOLD_TTL_SECS` is unset.
const DEFAULT_HOLD_TTL_SECS: u64 = 300;

/// Holds are pre-confirmation; anything past a day is a misconfiguration.
const MAX_HOLD_TTL_SECS: u64 = 24 * 60 * 60;

/// Seat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// How long a seat stays held without an explicit release.
    pub hold_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a variable is present but invalid.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
            hold_ttl: parse_hold_ttl(std::env::var("SEAT_HOLD_TTL_SECS").ok().as_deref()),
        }
    }
}

fn parse_hold_ttl(raw: Option<&str>) -> Duration {
    let secs = match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => DEFAULT_HOLD_TTL_SECS,
        Some(v) => v
            .parse::<u64>()
            .unwrap_or_else(|_| panic!("SEAT_HOLD_TTL_SECS must be a whole number of seconds, got {v:?}")),
    };

    if secs == 0 || secs > MAX_HOLD_TTL_SECS {
        panic!("SEAT_HOLD_TTL_SECS must be between 1 and {MAX_HOLD_TTL_SECS}, got {secs}");
    }
    Duration::from_secs(secs)
}
