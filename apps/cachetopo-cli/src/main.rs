use anyhow::{Context, Result};
use cachetopo::{write_header, CacheLevel, Platform, Resolver, ResolverConfig, SystemRunner};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Level(CacheLevel),
    ProcessorName,
}

fn parse_query(s: &str) -> Result<Query, String> {
    match s.trim() {
        "4" => Ok(Query::ProcessorName),
        other => other.parse::<CacheLevel>().map(Query::Level),
    }
}

/// Print CPU cache sizes (L1/L2 per physical core, L3 shared) or write them as a C++ header.
#[derive(Debug, Parser)]
#[command(name = "cachetopo", version)]
struct Cli {
    /// 1, 2 or 3 prints that cache level in bytes; 4 prints the processor name
    #[arg(value_parser = parse_query, required_unless_present_any = ["header", "json"])]
    query: Option<Query>,

    /// Write L1/L2/L3_CACHE_SIZE constants to this file, replacing it
    #[arg(long, value_name = "PATH")]
    header: Option<PathBuf>,

    /// Print a JSON report of every level and the raw records
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let env = Env::default()
        .filter_or("CACHETOPO_LOG", "warn")
        .write_style_or("CACHETOPO_LOG_STYLE", "auto");
    env_logger::Builder::from_env(env).init();

    let cli = Cli::parse();
    let config = ResolverConfig::from_env();
    let runner = SystemRunner::new(config.timeout);
    let resolver = Resolver::new(Platform::current(), &runner, &config);

    match cli.query {
        Some(Query::Level(level)) => {
            let size = resolver
                .resolve(level)
                .with_context(|| format!("failed to retrieve {level} cache size"))?;
            println!("{size}");
        }
        Some(Query::ProcessorName) => println!("{}", resolver.processor_name()),
        None => {}
    }

    if let Some(path) = &cli.header {
        let sizes = resolver
            .resolve_all()
            .context("failed to retrieve cache sizes")?;
        write_header(path, &sizes).with_context(|| format!("write {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    if cli.json {
        let report = resolver.report().context("failed to build cache report")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_accepts_levels_and_name() {
        assert_eq!(parse_query("1"), Ok(Query::Level(CacheLevel::L1)));
        assert_eq!(parse_query("3"), Ok(Query::Level(CacheLevel::L3)));
        assert_eq!(parse_query("4"), Ok(Query::ProcessorName));
        assert!(parse_query("5").is_err());
    }

    #[test]
    fn level_is_required_without_other_outputs() {
        assert!(Cli::try_parse_from(["cachetopo"]).is_err());
        let cli = Cli::try_parse_from(["cachetopo", "--header", "out.h"]).unwrap();
        assert!(cli.query.is_none());
        let cli = Cli::try_parse_from(["cachetopo", "2"]).unwrap();
        assert_eq!(cli.query, Some(Query::Level(CacheLevel::L2)));
    }
}
