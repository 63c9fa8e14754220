use chrono::Utc;
use log::{debug, warn};
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::config::ResolverConfig;
use crate::errors::{Result, TopologyError};
use crate::types::{CacheLevel, CacheRecord, CacheReport, CacheSize, CacheSizes, Platform};

mod exec;
mod linux;
mod macos;
#[cfg(test)]
pub(crate) mod testing;

pub use exec::{CommandRunner, SystemRunner};
pub use linux::{parse_cache_records, parse_physical_cores, parse_size, LinuxBackend};
pub use macos::DarwinBackend;

/// What a platform has to provide for a resolution.
pub trait Backend {
    /// Divisor for the per-core levels (L1/L2).
    fn physical_core_count(&self) -> Result<u32>;

    fn cache_records(&self) -> Result<Vec<CacheRecord>>;

    /// Best effort, empty when unknown.
    fn processor_name(&self) -> String;

    /// Whether one failed query degrades a single value instead of the whole resolution.
    fn isolates_failures(&self) -> bool {
        false
    }
}

/// Fails every query without running anything.
pub struct UnsupportedBackend {
    os: String,
}

impl UnsupportedBackend {
    pub fn new(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }
}

impl Backend for UnsupportedBackend {
    fn physical_core_count(&self) -> Result<u32> {
        Err(TopologyError::UnsupportedPlatform(self.os.clone()))
    }

    fn cache_records(&self) -> Result<Vec<CacheRecord>> {
        Err(TopologyError::UnsupportedPlatform(self.os.clone()))
    }

    // OS-reported brand (Windows and friends).
    fn processor_name(&self) -> String {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::everything()),
        );
        sys.cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .unwrap_or_default()
    }
}

pub fn select_backend<'a>(
    platform: &Platform,
    runner: &'a dyn CommandRunner,
    config: &ResolverConfig,
) -> Box<dyn Backend + 'a> {
    match platform {
        Platform::Linux => Box::new(LinuxBackend::new(runner, config.lscpu.clone())),
        Platform::Darwin => Box::new(DarwinBackend::new(runner, config.sysctl.clone())),
        Platform::Unsupported(os) => Box::new(UnsupportedBackend::new(os.clone())),
    }
}

/// Sum of size × instances over the level's labels. No records means zero bytes.
pub fn aggregate(records: &[CacheRecord], level: CacheLevel) -> CacheSize {
    records
        .iter()
        .filter(|r| level.labels().contains(&r.label.as_str()))
        .fold(CacheSize::Bytes(0), |acc, r| acc.add(r.total()))
}

/// L1/L2 divided by cores (truncating), L3 untouched. `cores == None` means the
/// divisor could not be resolved on a backend that tolerates that.
pub fn normalize(level: CacheLevel, total: CacheSize, cores: Option<u32>) -> Result<CacheSize> {
    if !level.is_per_core() {
        return Ok(total);
    }
    let (CacheSize::Bytes(bytes), Some(cores)) = (total, cores) else {
        return Ok(CacheSize::Unavailable);
    };
    if cores == 0 {
        return Err(TopologyError::DivisionHazard { level });
    }
    Ok(CacheSize::Bytes(bytes / u64::from(cores)))
}

pub struct Resolver<'a> {
    platform: Platform,
    backend: Box<dyn Backend + 'a>,
    debug: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(platform: Platform, runner: &'a dyn CommandRunner, config: &ResolverConfig) -> Self {
        let backend = select_backend(&platform, runner, config);
        Self {
            platform,
            backend,
            debug: config.debug,
        }
    }

    pub fn with_backend(platform: Platform, backend: Box<dyn Backend + 'a>) -> Self {
        Self {
            platform,
            backend,
            debug: false,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn resolve(&self, level: CacheLevel) -> Result<CacheSize> {
        let records = self.backend.cache_records()?;
        let total = aggregate(&records, level);
        debug!("[resolve] {level} raw total {total}");
        if !level.is_per_core() || !total.is_available() {
            return Ok(total);
        }
        let cores = self.core_divisor()?;
        normalize(level, total, cores)
    }

    pub fn resolve_all(&self) -> Result<CacheSizes> {
        let records = self.backend.cache_records()?;
        self.sizes_from(&records).map(|(sizes, _)| sizes)
    }

    pub fn processor_name(&self) -> String {
        self.backend.processor_name()
    }

    pub fn report(&self) -> Result<CacheReport> {
        let records = self.backend.cache_records()?;
        let (caches, physical_cores) = self.sizes_from(&records)?;

        let diagnostics = if self.debug {
            let mut d: Vec<String> = records
                .iter()
                .map(|r| match r.reported_instances {
                    Some(n) => format!(
                        "[{}] {} = {} total over {n} reported instance(s)",
                        r.level, r.label, r.size
                    ),
                    None => format!(
                        "[{}] {} = {} x {} instance(s)",
                        r.level, r.label, r.size, r.instance_count
                    ),
                })
                .collect();
            d.push(format!("[divisor] physical cores = {physical_cores:?}"));
            Some(d)
        } else {
            None
        };

        Ok(CacheReport {
            platform: self.platform.to_string(),
            processor: self.processor_name(),
            physical_cores,
            logical_cpus: num_cpus::get() as u32,
            caches,
            records,
            generated_at: Utc::now().to_rfc3339(),
            diagnostics,
        })
    }

    fn core_divisor(&self) -> Result<Option<u32>> {
        match self.backend.physical_core_count() {
            Ok(n) => Ok(Some(n)),
            Err(e) if self.backend.isolates_failures() => {
                warn!("physical core count unavailable, L1/L2 left unresolved: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn sizes_from(&self, records: &[CacheRecord]) -> Result<(CacheSizes, Option<u32>)> {
        let needs_divisor = CacheLevel::ALL
            .into_iter()
            .any(|lvl| lvl.is_per_core() && aggregate(records, lvl).is_available());
        let cores = if needs_divisor {
            self.core_divisor()?
        } else {
            None
        };

        let mut sizes = CacheSizes::default();
        for level in CacheLevel::ALL {
            let size = match normalize(level, aggregate(records, level), cores) {
                Ok(s) => s,
                Err(e @ TopologyError::DivisionHazard { .. }) if self.backend.isolates_failures() => {
                    warn!("{e}");
                    CacheSize::Unavailable
                }
                Err(e) => return Err(e),
            };
            sizes.set(level, size);
        }
        Ok((sizes, cores))
    }
}

/// Resolve one level on this machine, configured from the environment.
pub fn resolve(level: CacheLevel) -> Result<CacheSize> {
    let config = ResolverConfig::from_env();
    let runner = SystemRunner::new(config.timeout);
    let resolver = Resolver::new(Platform::current(), &runner, &config);
    resolver.resolve(level)
}

pub fn resolve_all() -> Result<CacheSizes> {
    let config = ResolverConfig::from_env();
    let runner = SystemRunner::new(config.timeout);
    let resolver = Resolver::new(Platform::current(), &runner, &config);
    resolver.resolve_all()
}

pub fn processor_name() -> String {
    let config = ResolverConfig::from_env();
    let runner = SystemRunner::new(config.timeout);
    let resolver = Resolver::new(Platform::current(), &runner, &config);
    resolver.processor_name()
}
