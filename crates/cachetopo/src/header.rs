use log::debug;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::errors::Result;
use crate::types::{CacheLevel, CacheSizes};

pub fn render_header(sizes: &CacheSizes) -> String {
    let mut data = String::from("#pragma once\n");
    for level in CacheLevel::ALL {
        data.push_str(&format!(
            "constexpr const size_t L{}_CACHE_SIZE={};\n",
            level.number(),
            sizes.get(level)
        ));
    }
    data
}

/// Replaces `path` with a freshly rendered header; nothing from a previous run survives.
pub fn write_header(path: &Path, sizes: &CacheSizes) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut f = fs::File::create(path)?;
    f.write_all(render_header(sizes).as_bytes())?;
    f.flush()?;
    debug!("[header] wrote {}", path.display());
    Ok(())
}
