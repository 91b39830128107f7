//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use ffwebd_core::{DriverConfig, GateConfig, ManagerConfig};

const MB: u64 = 1024 * 1024;

/// Runtime configuration for ffwebd.
///
/// Every key has a sensible default so the server works out-of-the-box
/// without any environment variables set. Unparseable values silently
/// fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Transcoder binary; must resolve on PATH or as a path (default: `ffmpeg`).
    pub ff_bin: String,
    /// Per-task deadline, from the start of processing (default: `12m3s`).
    pub ff_timeout: Duration,
    /// Output artifact retention (default: `1h23m`).
    pub output_local_lifetime: Duration,
    /// Input size cap in bytes; accepts strings like `"200MB"` (default: 200 MB).
    pub max_input_size: u64,
    /// Concurrent processing slots (default: 1).
    pub max_concurrency: usize,
    /// Minimum idle CPU percentage required to admit a job (default: 50).
    pub throttle_cpu: f64,
    /// Minimum free RAM in bytes (default: 200 MB).
    pub throttle_free_mem: u64,
    /// Minimum free disk under the temp root in bytes (default: 200 MB).
    pub throttle_free_disk: u64,
    /// Gate `/api/v1/*` behind a bearer token (default: false).
    pub auth_enable: bool,
    /// Expected bearer token (default: `123456`).
    pub auth_key: String,
    /// HTTP listen port (default: `8080`).
    pub port: String,
    /// Prefix for constructed download URLs; empty derives it from the
    /// request `Host` header.
    pub base_url: String,
    /// `tracing` filter string, overridable via `RUST_LOG` (default: `info`).
    pub log_level: String,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            ff_bin: env_or("FF_BIN", "ffmpeg"),
            ff_timeout: env_duration("FF_TIMEOUT", Duration::from_secs(12 * 60 + 3)),
            output_local_lifetime: env_duration(
                "OUTPUT_LOCAL_LIFETIME",
                Duration::from_secs(60 * 83),
            ),
            max_input_size: env_bytes("MAX_INPUT_SIZE", 200 * MB),
            max_concurrency: parse_env("MAX_CONCURRENCY", 1),
            throttle_cpu: parse_env("THROTTLE_CPU", 50.0),
            throttle_free_mem: env_bytes("THROTTLE_FREEMEM", 200 * MB),
            throttle_free_disk: env_bytes("THROTTLE_FREEDISK", 200 * MB),
            auth_enable: env_bool("AUTH_ENABLE", false),
            auth_key: env_or("AUTH_KEY", "123456"),
            port: env_or("PORT", "8080"),
            base_url: env_or("BASE", ""),
            log_level: env_or("LOG_LEVEL", "info"),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            ff_bin: self.ff_bin.clone(),
            max_input_size: self.max_input_size,
            gate: GateConfig {
                throttle_cpu: self.throttle_cpu,
                throttle_free_mem: self.throttle_free_mem,
                throttle_free_disk: self.throttle_free_disk,
                ..GateConfig::default()
            },
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_concurrency: self.max_concurrency,
            task_timeout: self.ff_timeout,
            output_lifetime: self.output_local_lifetime,
            ..ManagerConfig::default()
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_duration(&v))
        .unwrap_or(default)
}

fn env_bytes(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_byte_size(&v))
        .unwrap_or(default)
}

/// Parse compound duration strings like `12m3s`, `1h23m`, or `200ms`.
fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut chars = input.chars().peekable();
    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let value: f64 = number.parse().ok()?;

        let mut unit = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let seconds = match unit.as_str() {
            "ns" => 1e-9,
            "us" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        total += Duration::from_secs_f64(value * seconds);
    }
    Some(total)
}

/// Parse human-readable byte sizes (`200MB`, `1.5GB`, `512`). Units are
/// 1024-based; a bare number is taken as bytes.
fn parse_byte_size(input: &str) -> Option<u64> {
    let input = input.trim();
    if let Ok(bytes) = input.parse::<u64>() {
        return Some(bytes);
    }

    let unit_start = input.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (number, unit) = input.split_at(unit_start);
    let value: f64 = number.trim().parse().ok()?;
    let scale: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return None,
    };
    if value < 0.0 {
        return None;
    }
    Some((value * scale as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("12m3s"), Some(Duration::from_secs(723)));
        assert_eq!(parse_duration("1h23m"), Some(Duration::from_secs(4980)));
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("200ms"), Some(Duration::from_millis(200)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("12"), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("12parsecs"), None);
    }

    #[test]
    fn parses_byte_sizes() {
        assert_eq!(parse_byte_size("200MB"), Some(200 * MB));
        assert_eq!(parse_byte_size("200 MB"), Some(200 * MB));
        assert_eq!(parse_byte_size("1.5KB"), Some(1536));
        assert_eq!(parse_byte_size("2GiB"), Some(2 << 30));
        assert_eq!(parse_byte_size("12345"), Some(12345));
        assert_eq!(parse_byte_size("64b"), Some(64));
    }

    #[test]
    fn rejects_malformed_byte_sizes() {
        assert_eq!(parse_byte_size(""), None);
        assert_eq!(parse_byte_size("lots"), None);
        assert_eq!(parse_byte_size("10parsecs"), None);
    }

    #[test]
    fn defaults_match_the_documented_values() {
        // from_env with a clean environment returns the documented
        // defaults; individual keys are covered by the parser tests.
        let cfg = Config::from_env();
        assert_eq!(cfg.max_concurrency, 1);
        assert_eq!(cfg.port, "8080");
        assert_eq!(cfg.auth_key, "123456");
        assert!(!cfg.auth_enable);
        assert_eq!(cfg.ff_timeout, Duration::from_secs(723));
        assert_eq!(cfg.output_local_lifetime, Duration::from_secs(4980));
        assert_eq!(cfg.max_input_size, 200 * MB);
    }
}
