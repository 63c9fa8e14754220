use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const MIN_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_LSCPU: &str = "lscpu";
pub const DEFAULT_SYSCTL: &str = "/usr/sbin/sysctl";

/// Knobs for a resolution. `from_env` reads the `CACHETOPO_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub timeout: Duration,
    pub lscpu: String,
    pub sysctl: String,
    pub debug: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            lscpu: DEFAULT_LSCPU.to_string(),
            sysctl: DEFAULT_SYSCTL.to_string(),
            debug: false,
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        Self {
            timeout: Duration::from_millis(env_timeout_ms()),
            lscpu: env_program("CACHETOPO_LSCPU", DEFAULT_LSCPU),
            sysctl: env_program("CACHETOPO_SYSCTL", DEFAULT_SYSCTL),
            debug: env_flag("CACHETOPO_DEBUG"),
        }
    }
}

pub fn env_timeout_ms() -> u64 {
    parse_timeout_ms(std::env::var("CACHETOPO_TIMEOUT_MS").ok().as_deref())
}

fn parse_timeout_ms(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|&v| v >= MIN_TIMEOUT_MS)
        .unwrap_or(DEFAULT_TIMEOUT_MS)
}

fn env_program(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_below_floor_falls_back() {
        assert_eq!(parse_timeout_ms(None), DEFAULT_TIMEOUT_MS);
        assert_eq!(parse_timeout_ms(Some("50")), DEFAULT_TIMEOUT_MS);
        assert_eq!(parse_timeout_ms(Some("abc")), DEFAULT_TIMEOUT_MS);
        assert_eq!(parse_timeout_ms(Some(" 1500 ")), 1500);
    }

    #[test]
    fn default_ignores_environment() {
        let cfg = ResolverConfig::default();
        assert_eq!(cfg.lscpu, "lscpu");
        assert_eq!(cfg.sysctl, "/usr/sbin/sysctl");
        assert!(!cfg.debug);
    }
}
