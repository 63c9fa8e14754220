use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheLevel {
    L1,
    L2,
    L3,
}

impl CacheLevel {
    pub const ALL: [CacheLevel; 3] = [CacheLevel::L1, CacheLevel::L2, CacheLevel::L3];

    /// Raw tool labels that contribute to this level.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            CacheLevel::L1 => &["L1d", "L1i"],
            CacheLevel::L2 => &["L2"],
            CacheLevel::L3 => &["L3"],
        }
    }

    pub fn from_label(label: &str) -> Option<CacheLevel> {
        CacheLevel::ALL
            .into_iter()
            .find(|lvl| lvl.labels().contains(&label))
    }

    /// L1/L2 are normalized to a per-core share, L3 is reported as the shared total.
    pub fn is_per_core(self) -> bool {
        !matches!(self, CacheLevel::L3)
    }

    pub fn number(self) -> u8 {
        match self {
            CacheLevel::L1 => 1,
            CacheLevel::L2 => 2,
            CacheLevel::L3 => 3,
        }
    }
}

impl TryFrom<u8> for CacheLevel {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(CacheLevel::L1),
            2 => Ok(CacheLevel::L2),
            3 => Ok(CacheLevel::L3),
            other => Err(format!("invalid cache level {other}, expected 1, 2 or 3")),
        }
    }
}

impl FromStr for CacheLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix('L')
            .or_else(|| s.strip_prefix('l'))
            .unwrap_or(s);
        digits
            .parse::<u8>()
            .map_err(|_| format!("invalid cache level `{s}`, expected 1, 2 or 3"))
            .and_then(|n| CacheLevel::try_from(n))
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.number())
    }
}

/// A normalized byte count, or the "unavailable" marker which renders as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum CacheSize {
    Bytes(u64),
    Unavailable,
}

impl CacheSize {
    pub const SENTINEL: i64 = -1;

    pub fn bytes(self) -> Option<u64> {
        match self {
            CacheSize::Bytes(b) => Some(b),
            CacheSize::Unavailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, CacheSize::Bytes(_))
    }

    pub fn as_i64(self) -> i64 {
        match self {
            CacheSize::Bytes(b) => i64::try_from(b).unwrap_or(i64::MAX),
            CacheSize::Unavailable => Self::SENTINEL,
        }
    }

    /// Unavailable absorbs: a sum with any unknown part is unknown.
    pub fn add(self, other: CacheSize) -> CacheSize {
        match (self, other) {
            (CacheSize::Bytes(a), CacheSize::Bytes(b)) => CacheSize::Bytes(a.saturating_add(b)),
            _ => CacheSize::Unavailable,
        }
    }
}

impl Default for CacheSize {
    fn default() -> Self {
        CacheSize::Unavailable
    }
}

impl From<CacheSize> for i64 {
    fn from(size: CacheSize) -> i64 {
        size.as_i64()
    }
}

impl TryFrom<i64> for CacheSize {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            CacheSize::SENTINEL => Ok(CacheSize::Unavailable),
            v if v >= 0 => Ok(CacheSize::Bytes(v as u64)),
            v => Err(format!("negative cache size {v}")),
        }
    }
}

impl fmt::Display for CacheSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

fn one() -> u32 {
    1
}

/// One cache line of raw tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub level: CacheLevel,
    pub label: String, // "L1d", "L1i", "L2", "L3"
    pub size: CacheSize, // per instance
    #[serde(default = "one")]
    pub instance_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_instances: Option<u32>, // set when the tool's total didn't split evenly
}

impl CacheRecord {
    pub fn new(level: CacheLevel, label: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            level,
            label: label.into(),
            size: CacheSize::Bytes(size_bytes),
            instance_count: 1,
            reported_instances: None,
        }
    }

    pub fn unavailable(level: CacheLevel, label: impl Into<String>) -> Self {
        Self {
            level,
            label: label.into(),
            size: CacheSize::Unavailable,
            instance_count: 1,
            reported_instances: None,
        }
    }

    pub fn with_instances(mut self, count: u32) -> Self {
        self.instance_count = count.max(1);
        self
    }

    pub fn with_reported_instances(mut self, count: u32) -> Self {
        self.reported_instances = Some(count);
        self
    }

    /// size × instance_count
    pub fn total(&self) -> CacheSize {
        match self.size {
            CacheSize::Bytes(b) => CacheSize::Bytes(b.saturating_mul(u64::from(self.instance_count))),
            CacheSize::Unavailable => CacheSize::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheSizes {
    pub l1: CacheSize,
    pub l2: CacheSize,
    pub l3: CacheSize,
}

impl CacheSizes {
    pub fn get(&self, level: CacheLevel) -> CacheSize {
        match level {
            CacheLevel::L1 => self.l1,
            CacheLevel::L2 => self.l2,
            CacheLevel::L3 => self.l3,
        }
    }

    pub fn set(&mut self, level: CacheLevel, size: CacheSize) {
        match level {
            CacheLevel::L1 => self.l1 = size,
            CacheLevel::L2 => self.l2 = size,
            CacheLevel::L3 => self.l3 = size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Darwin,
    Unsupported(String),
}

impl Platform {
    pub fn from_os(os: &str) -> Platform {
        match os.trim().to_ascii_lowercase().as_str() {
            "linux" => Platform::Linux,
            "macos" | "darwin" => Platform::Darwin,
            _ => Platform::Unsupported(os.to_string()),
        }
    }

    pub fn current() -> Platform {
        Platform::from_os(std::env::consts::OS)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => f.write_str("linux"),
            Platform::Darwin => f.write_str("darwin"),
            Platform::Unsupported(os) => f.write_str(os),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheReport {
    pub platform: String,
    pub processor: String,

    #[serde(default)]
    pub physical_cores: Option<u32>, // divisor used for L1/L2, if it resolved
    pub logical_cpus: u32,

    pub caches: CacheSizes,
    pub records: Vec<CacheRecord>,

    pub generated_at: String,

    #[serde(default)]
    pub diagnostics: Option<Vec<String>>, // CACHETOPO_DEBUG only
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parses_from_cli_digits_and_labels() {
        assert_eq!("1".parse::<CacheLevel>(), Ok(CacheLevel::L1));
        assert_eq!("L3".parse::<CacheLevel>(), Ok(CacheLevel::L3));
        assert!("4".parse::<CacheLevel>().is_err());
        assert!("two".parse::<CacheLevel>().is_err());
    }

    #[test]
    fn label_sets_per_level() {
        assert_eq!(CacheLevel::from_label("L1i"), Some(CacheLevel::L1));
        assert_eq!(CacheLevel::from_label("L1d"), Some(CacheLevel::L1));
        assert_eq!(CacheLevel::from_label("L2"), Some(CacheLevel::L2));
        assert_eq!(CacheLevel::from_label("L4"), None);
        assert!(!CacheLevel::L3.is_per_core());
    }

    #[test]
    fn unavailable_serializes_as_sentinel() {
        let sizes = CacheSizes {
            l1: CacheSize::Bytes(65536),
            l2: CacheSize::Unavailable,
            l3: CacheSize::Bytes(0),
        };
        let json = serde_json::to_string(&sizes).unwrap();
        assert_eq!(json, r#"{"l1":65536,"l2":-1,"l3":0}"#);
        let back: CacheSizes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sizes);
        assert!(serde_json::from_str::<CacheSize>("-7").is_err());
    }

    #[test]
    fn record_total_multiplies_instances() {
        let r = CacheRecord::new(CacheLevel::L2, "L2", 1024).with_instances(8);
        assert_eq!(r.total(), CacheSize::Bytes(8192));
        assert_eq!(CacheRecord::new(CacheLevel::L2, "L2", 1).with_instances(0).instance_count, 1);
        assert_eq!(CacheRecord::unavailable(CacheLevel::L3, "L3").total(), CacheSize::Unavailable);
    }

    #[test]
    fn platform_selection() {
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("Darwin"), Platform::Darwin);
        assert_eq!(Platform::from_os("macos"), Platform::Darwin);
        assert_eq!(
            Platform::from_os("plan9"),
            Platform::Unsupported("plan9".to_string())
        );
    }
}
