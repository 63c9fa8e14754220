use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Backend, CommandRunner};
use crate::errors::{Result, TopologyError};
use crate::types::{CacheLevel, CacheRecord};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

// "L1d cache:   393216 (12 instances)", "L2 cache: 4 M", "L3 cache: 8192K"
static CACHE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(L1d|L1i|L2|L3)\s+cache\s*:(.*)$").expect("cache line regex")
});

// <int> [unit] [(N instance[s])]
static SIZE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*([KMG](?:i?B)?|B)?\s*(?:\((\d+)\s+instances?\))?$")
        .expect("size value regex")
});

static CORES_PER_SOCKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*Core\(s\) per (?:socket|cluster)\s*:\s*(\d+)\s*$").expect("cores regex")
});

static SOCKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Socket\(s\)\s*:\s*(\d+)\s*$").expect("sockets regex"));

static MODEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Model name\s*:\s*(.*?)\s*$").expect("model name regex"));

pub struct LinuxBackend<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
}

impl<'a> LinuxBackend<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }
}

impl Backend for LinuxBackend<'_> {
    fn physical_core_count(&self) -> Result<u32> {
        let out = self.runner.run(&self.program, &[])?;
        parse_physical_cores(&self.program, &out)
    }

    fn cache_records(&self) -> Result<Vec<CacheRecord>> {
        let out = self.runner.run(&self.program, &["-B"])?;
        let records = parse_cache_records(&self.program, &out)?;
        debug!("[lscpu] {} cache records", records.len());
        Ok(records)
    }

    fn processor_name(&self) -> String {
        match self.runner.run(&self.program, &[]) {
            Ok(out) => parse_model_name(&out),
            Err(e) => {
                debug!("[lscpu] model name unavailable: {e}");
                String::new()
            }
        }
    }
}

/// Cores per socket, multiplied by the socket count when lscpu reports one.
pub fn parse_physical_cores(program: &str, text: &str) -> Result<u32> {
    let per_socket = first_capture(&CORES_PER_SOCKET, text)
        .ok_or_else(|| TopologyError::parse(program, "Core(s) per socket"))?
        .parse::<u32>()
        .map_err(|_| TopologyError::parse(program, "Core(s) per socket value"))?;

    let sockets = first_capture(&SOCKETS, text)
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1);

    Ok(per_socket.saturating_mul(sockets))
}

pub fn parse_cache_records(program: &str, text: &str) -> Result<Vec<CacheRecord>> {
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(caps) = CACHE_LINE.captures(line) else {
            continue;
        };
        let label = &caps[1];
        let Some(level) = CacheLevel::from_label(label) else {
            continue;
        };
        let (total, instances) = parse_size(&caps[2])
            .ok_or_else(|| TopologyError::parse(program, format!("{label} cache size")))?;
        out.push(split_instances(level, label, total, instances));
    }
    Ok(out)
}

/// Parses `<int> [unit] [(N instances)]` into (bytes as reported, instance count).
pub fn parse_size(value: &str) -> Option<(u64, Option<u32>)> {
    let caps = SIZE_VALUE.captures(value.trim())?;
    let n = caps[1].parse::<u64>().ok()?;
    let mult = match caps.get(2).map(|m| &m.as_str()[..1]) {
        None | Some("B") => 1,
        Some("K") => KIB,
        Some("M") => MIB,
        Some("G") => GIB,
        Some(_) => return None,
    };
    let instances = match caps.get(3) {
        Some(m) => Some(m.as_str().parse::<u32>().ok()?),
        None => None,
    };
    Some((n.checked_mul(mult)?, instances))
}

// lscpu's "(N instances)" figure is the total over all N copies.
fn split_instances(level: CacheLevel, label: &str, total: u64, instances: Option<u32>) -> CacheRecord {
    match instances {
        Some(n) if n > 0 && total % u64::from(n) == 0 => {
            CacheRecord::new(level, label, total / u64::from(n)).with_instances(n)
        }
        Some(n) => {
            debug!("[lscpu] {label} total {total} does not split over {n} instances, kept whole");
            CacheRecord::new(level, label, total).with_reported_instances(n)
        }
        None => CacheRecord::new(level, label, total),
    }
}

pub fn parse_model_name(text: &str) -> String {
    first_capture(&MODEL_NAME, text).unwrap_or_default()
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| re.captures(line).map(|c| c[1].to_string()))
}
