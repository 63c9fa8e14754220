use log::{debug, warn};

use super::{Backend, CommandRunner};
use crate::errors::{Result, TopologyError};
use crate::types::{CacheLevel, CacheRecord};

const CORE_KEYS: &[&str] = &["hw.perflevel0.physicalcpu", "hw.physicalcpu"];
const BRAND_KEY: &str = "machdep.cpu.brand_string";

/// (label, level, perflevel0 key, fallback key for machines without perf levels)
const CACHE_KEYS: &[(&str, CacheLevel, &str, &str)] = &[
    ("L1d", CacheLevel::L1, "hw.perflevel0.l1dcachesize", "hw.l1dcachesize"),
    ("L1i", CacheLevel::L1, "hw.perflevel0.l1icachesize", "hw.l1icachesize"),
    ("L2", CacheLevel::L2, "hw.perflevel0.l2cachesize", "hw.l2cachesize"),
    ("L3", CacheLevel::L3, "hw.perflevel0.l3cachesize", "hw.l3cachesize"),
];

pub struct DarwinBackend<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
}

impl<'a> DarwinBackend<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn sysctl_u64(&self, key: &str) -> Result<u64> {
        let out = self.runner.run(&self.program, &["-n", key])?;
        parse_sysctl_value(&self.program, key, &out)
    }

    /// First key that resolves wins; the last error is returned otherwise.
    fn sysctl_first(&self, keys: &[&str]) -> Result<u64> {
        let mut last_err = None;
        for key in keys {
            match self.sysctl_u64(key) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    debug!("[sysctl] {key}: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TopologyError::parse(&self.program, "sysctl key")))
    }
}

impl Backend for DarwinBackend<'_> {
    fn physical_core_count(&self) -> Result<u32> {
        let n = self.sysctl_first(CORE_KEYS)?;
        u32::try_from(n).map_err(|_| TopologyError::parse(&self.program, "physical core count"))
    }

    /// Never fails as a whole: a key that cannot be read becomes an unavailable record.
    fn cache_records(&self) -> Result<Vec<CacheRecord>> {
        let mut out = Vec::with_capacity(CACHE_KEYS.len());
        for &(label, level, key, fallback) in CACHE_KEYS {
            let rec = match self.sysctl_first(&[key, fallback]) {
                Ok(bytes) => CacheRecord::new(level, label, bytes),
                Err(e) => {
                    warn!("{label} cache size unavailable: {e}");
                    CacheRecord::unavailable(level, label)
                }
            };
            out.push(rec);
        }
        Ok(out)
    }

    fn processor_name(&self) -> String {
        match self.runner.run(&self.program, &["-n", BRAND_KEY]) {
            Ok(out) => out.trim().to_string(),
            Err(e) => {
                debug!("[sysctl] brand string unavailable: {e}");
                String::new()
            }
        }
    }

    fn isolates_failures(&self) -> bool {
        true
    }
}

/// `sysctl -n` prints the bare value; `sysctl key` prints `key: value`. Accept both.
pub fn parse_sysctl_value(program: &str, key: &str, text: &str) -> Result<u64> {
    let raw = text.trim();
    let raw = raw
        .strip_prefix(key)
        .and_then(|rest| rest.trim_start().strip_prefix(':'))
        .unwrap_or(raw)
        .trim();
    raw.parse::<u64>()
        .map_err(|_| TopologyError::parse(program, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::testing::ScriptedRunner;
    use crate::types::CacheSize;

    const SYSCTL: &str = "/usr/sbin/sysctl";

    fn apple_m1() -> ScriptedRunner {
        ScriptedRunner::new()
            .ok(SYSCTL, &["-n", "hw.perflevel0.physicalcpu"], "4\n")
            .ok(SYSCTL, &["-n", "hw.perflevel0.l1dcachesize"], "131072\n")
            .ok(SYSCTL, &["-n", "hw.perflevel0.l1icachesize"], "196608\n")
            .ok(SYSCTL, &["-n", "hw.perflevel0.l2cachesize"], "12582912\n")
            .ok(SYSCTL, &["-n", "hw.perflevel0.l3cachesize"], "8388608\n")
            .ok(SYSCTL, &["-n", BRAND_KEY], "Apple M1\n")
    }

    #[test]
    fn parses_bare_and_keyed_values() {
        assert_eq!(parse_sysctl_value(SYSCTL, "hw.l2cachesize", "4194304\n").unwrap(), 4194304);
        assert_eq!(
            parse_sysctl_value(SYSCTL, "hw.l2cachesize", "hw.l2cachesize: 4194304\n").unwrap(),
            4194304
        );
        assert!(parse_sysctl_value(SYSCTL, "hw.l2cachesize", "").is_err());
    }

    #[test]
    fn reads_all_perflevel0_keys() {
        let runner = apple_m1();
        let backend = DarwinBackend::new(&runner, SYSCTL);
        let recs = backend.cache_records().unwrap();
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[0].size, CacheSize::Bytes(131072));
        assert_eq!(recs[3].size, CacheSize::Bytes(8388608));
        assert_eq!(backend.physical_core_count().unwrap(), 4);
        assert_eq!(backend.processor_name(), "Apple M1");
    }

    #[test]
    fn one_failing_key_only_degrades_that_record() {
        let runner = apple_m1().fail(SYSCTL, &["-n", "hw.perflevel0.l2cachesize"]);
        let backend = DarwinBackend::new(&runner, SYSCTL);
        let recs = backend.cache_records().unwrap();
        assert_eq!(recs[2].label, "L2");
        assert_eq!(recs[2].size, CacheSize::Unavailable);
        assert_eq!(recs[0].size, CacheSize::Bytes(131072));
        assert_eq!(recs[3].size, CacheSize::Bytes(8388608));
    }

    #[test]
    fn falls_back_to_plain_keys_without_perf_levels() {
        let runner = ScriptedRunner::new()
            .ok(SYSCTL, &["-n", "hw.physicalcpu"], "8\n")
            .ok(SYSCTL, &["-n", "hw.l3cachesize"], "16777216\n");
        let backend = DarwinBackend::new(&runner, SYSCTL);
        assert_eq!(backend.physical_core_count().unwrap(), 8);
        let recs = backend.cache_records().unwrap();
        assert_eq!(recs[3].size, CacheSize::Bytes(16777216));
        assert_eq!(recs[0].size, CacheSize::Unavailable);
        assert!(runner.calls().contains(&"/usr/sbin/sysctl -n hw.perflevel0.l3cachesize".to_string()));
    }
}
