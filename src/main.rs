#![cfg_attr(test, allow(clippy::unwrap_used))]

mod cache;
mod config;
mod daemon;
mod datetime;
mod error;
mod humanfmt;
mod index;
mod inrelease;
mod log_once;
mod proxy;
mod sources_list;
mod upstream;

use std::collections::HashMap;
use std::io::Read as _;
use std::io::Write as _;
use std::net::IpAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use clap::Subcommand;
use log::{LevelFilter, debug, info, warn};
use simplelog::ConfigBuilder;
use simplelog::WriteLogger;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use tokio::runtime::Builder;

use crate::cache::InReleaseCache;
use crate::config::APP_NAME;
use crate::config::SnapshotConfig;
use crate::daemon::DaemonOptions;
use crate::daemon::daemonize;
use crate::datetime::format_list_datetime;
use crate::error::SnapshotError;
use crate::index::InReleaseIndex;
use crate::inrelease::InRelease;
use crate::proxy::ProxyState;
use crate::sources_list::inject_inrelease_path;
use crate::sources_list::parse_source_line;
use crate::upstream::Credentials;
use crate::upstream::UpstreamClient;

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Logging level
    #[arg(short, long, value_name = "SEVERITY")]
    log_level: Option<LevelFilter>,
    /// Skip timestamp in log messages
    #[arg(long, default_value = "false")]
    skip_log_timestamp: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the InRelease files of a suite, newest first
    List {
        /// Only list files published at or before this POSIX timestamp
        #[arg(short = 't', long, value_name = "POSIX")]
        cutoff_time: Option<i64>,
        /// Archive mirror URL
        #[arg(short, long, default_value = config::DEFAULT_MIRROR, value_name = "URL")]
        mirror: String,
        /// Suite name, e.g. jammy-updates
        #[arg(short, long, value_name = "NAME")]
        suite: String,
        /// Durable InRelease cache shared with other invocations
        #[arg(long, value_name = "PATH")]
        cache_file: Option<PathBuf>,
    },
    /// Print the InRelease file valid at the cutoff timestamp
    Select {
        /// POSIX timestamp the snapshot is pinned at
        #[arg(short = 't', long, value_name = "POSIX")]
        cutoff_time: i64,
        /// Archive mirror URL
        #[arg(short, long, default_value = config::DEFAULT_MIRROR, value_name = "URL")]
        mirror: String,
        /// Suite name, e.g. jammy-updates
        #[arg(short, long, value_name = "NAME")]
        suite: String,
        /// Durable InRelease cache shared with other invocations
        #[arg(long, value_name = "PATH")]
        cache_file: Option<PathBuf>,
    },
    /// Rewrite a sources.list to pin each suite to its snapshot InRelease
    Inject {
        /// POSIX timestamp the snapshot is pinned at
        #[arg(short = 't', long, value_name = "POSIX")]
        cutoff_time: i64,
        /// Output path, `-` for stdout
        #[arg(short, long, default_value = "-", value_name = "PATH")]
        output_file: String,
        /// Durable InRelease cache shared with other invocations
        #[arg(long, value_name = "PATH")]
        cache_file: Option<PathBuf>,
        /// Input sources.list, `-` for stdin
        #[arg(value_name = "INFILE")]
        infile: String,
    },
    /// Run the transparent snapshot proxy
    Serve {
        /// Address to listen on
        #[arg(long, default_value_t = config::DEFAULT_BIND_ADDRESS, value_name = "IP")]
        address: IpAddr,
        /// Port to listen on
        #[arg(long, default_value_t = config::DEFAULT_BIND_PORT, value_name = "PORT")]
        port: u16,
        /// POSIX timestamp the snapshot is pinned at
        #[arg(short = 't', long, value_name = "POSIX")]
        cutoff_time: i64,
        /// Durable InRelease cache shared with the CLI subcommands
        #[arg(long, value_name = "PATH")]
        cache_file: Option<PathBuf>,
        /// Drop privileges to this user before serving (fatal on failure)
        #[arg(long, value_name = "USER")]
        run_as: Option<String>,
        /// Write the daemon pid to this file
        #[arg(long, value_name = "PATH")]
        pid_file: Option<PathBuf>,
        /// Log to this file instead of the terminal
        #[arg(long, value_name = "PATH")]
        log_file: Option<PathBuf>,
        /// Fork and detach from the invoking process
        #[arg(long, default_value = "false")]
        background: bool,
        /// Start a new session, detaching from the controlling terminal
        #[arg(long, default_value = "false")]
        setsid: bool,
    },
}

fn init_logger(
    level: LevelFilter,
    skip_timestamp: bool,
    log_file: Option<&Path>,
) -> anyhow::Result<()> {
    let log_config = if skip_timestamp {
        ConfigBuilder::new().set_time_level(LevelFilter::Off).build()
    } else {
        simplelog::Config::default()
    };

    match log_file {
        Some(path) => {
            let file = std::fs::File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file `{}`", path.display()))?;
            WriteLogger::init(level, log_config, file)?;
        }
        None => TermLogger::init(level, log_config, TerminalMode::Mixed, ColorChoice::Auto)?,
    }

    Ok(())
}

fn load_cache(path: Option<PathBuf>) -> Result<InReleaseCache, SnapshotError> {
    let cache = InReleaseCache::new(path);
    cache.load()?;
    Ok(cache)
}

#[must_use]
fn list_line(hash: &str, published: i64) -> String {
    format!("{hash} {} ({published})", format_list_datetime(published))
}

async fn cmd_list(
    client: &UpstreamClient,
    cache: &InReleaseCache,
    mirror: String,
    suite: String,
    cutoff: Option<i64>,
) -> Result<(), SnapshotError> {
    let index = InReleaseIndex::new(client, mirror, suite, Some(cache));

    let mut files: Vec<InRelease> = index.inrelease_files().await?;
    if let Some(cutoff) = cutoff {
        files.retain(|f| f.published().is_some_and(|published| published <= cutoff));
    }
    files.sort_by_key(|f| std::cmp::Reverse(f.published()));

    for file in &files {
        if let Some(published) = file.published() {
            println!("{}", list_line(file.hash(), published));
        }
    }

    Ok(())
}

async fn cmd_select(
    client: &UpstreamClient,
    cache: &InReleaseCache,
    mirror: String,
    suite: String,
    cutoff: i64,
) -> Result<(), SnapshotError> {
    let index = InReleaseIndex::new(client, mirror, suite, Some(cache));

    if let Some(file) = index.get_inrelease_for_timestamp(cutoff).await? {
        if let Some(published) = file.published() {
            println!("{}", list_line(file.hash(), published));
        }
    }

    Ok(())
}

/// Rewrites every supported `deb`/`deb-src` line whose suite has a snapshot
/// `InRelease`; all other lines pass through unchanged.
async fn inject_sources_list(
    client: &UpstreamClient,
    cache: &InReleaseCache,
    input: &str,
    cutoff: i64,
) -> Result<String, SnapshotError> {
    let mut resolved: HashMap<(String, String), Option<String>> = HashMap::new();
    let mut output = String::new();

    for line in input.lines() {
        let mut emitted = false;

        if let Some(parsed) = parse_source_line(line) {
            let key = (parsed.mirror.to_string(), parsed.suite.to_string());

            let hash = match resolved.get(&key) {
                Some(hash) => hash.clone(),
                None => {
                    let index =
                        InReleaseIndex::new(client, key.0.clone(), key.1.clone(), Some(cache));
                    let hash = index
                        .get_inrelease_for_timestamp(cutoff)
                        .await?
                        .map(|file| file.hash().to_string());

                    if hash.is_none() {
                        warn!(
                            "No InRelease found for {} {} at cutoff {cutoff}, \
                             leaving line unchanged",
                            key.0, key.1
                        );
                    }

                    resolved.insert(key, hash.clone());
                    hash
                }
            };

            if let Some(hash) = hash {
                output.push_str(&inject_inrelease_path(line, &parsed, &hash));
                output.push('\n');
                emitted = true;
            }
        }

        if !emitted {
            output.push_str(line);
            output.push('\n');
        }
    }

    Ok(output)
}

fn run(command: Command) -> anyhow::Result<()> {
    /* Auth bootstrap: pick up private-archive credentials, silently empty
     * outside build environments. */
    let credentials = Credentials::from_sources_list(config::DEFAULT_SOURCES_LIST_PATH);

    match command {
        Command::List {
            cutoff_time,
            mirror,
            suite,
            cache_file,
        } => {
            let cache = load_cache(cache_file)?;
            let client = UpstreamClient::new(credentials);

            let runtime = Builder::new_current_thread().enable_all().build()?;
            runtime.block_on(cmd_list(&client, &cache, mirror, suite, cutoff_time))?;

            cache.save()?;
        }
        Command::Select {
            cutoff_time,
            mirror,
            suite,
            cache_file,
        } => {
            let cache = load_cache(cache_file)?;
            let client = UpstreamClient::new(credentials);

            let runtime = Builder::new_current_thread().enable_all().build()?;
            runtime.block_on(cmd_select(&client, &cache, mirror, suite, cutoff_time))?;

            cache.save()?;
        }
        Command::Inject {
            cutoff_time,
            output_file,
            cache_file,
            infile,
        } => {
            let input = if infile == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read standard input")?;
                buf
            } else {
                std::fs::read_to_string(&infile)
                    .with_context(|| format!("Failed to read `{infile}`"))?
            };

            let cache = load_cache(cache_file)?;
            let client = UpstreamClient::new(credentials);

            let runtime = Builder::new_current_thread().enable_all().build()?;
            let output =
                runtime.block_on(inject_sources_list(&client, &cache, &input, cutoff_time))?;

            if output_file == "-" {
                std::io::stdout()
                    .write_all(output.as_bytes())
                    .context("Failed to write standard output")?;
            } else {
                std::fs::write(&output_file, output)
                    .with_context(|| format!("Failed to write `{output_file}`"))?;
            }

            cache.save()?;
        }
        Command::Serve {
            address,
            port,
            cutoff_time,
            cache_file,
            run_as,
            pid_file,
            log_file,
            background,
            setsid,
        } => {
            let snapshot_config = SnapshotConfig {
                cutoff: cutoff_time,
                bind_addr: address,
                bind_port: port,
                cache_file,
            };

            /* Bind before daemonising so bind failures reach the invoker. */
            let listener = proxy::bind(&snapshot_config)?;

            daemonize(&DaemonOptions {
                background,
                setsid,
                pid_file,
                log_file,
                run_as,
            })?;

            info!("Snapshot cutoff pinned at {cutoff_time}");

            let cache = Arc::new(load_cache(snapshot_config.cache_file.clone())?);
            let client = UpstreamClient::new(credentials);
            let state = ProxyState {
                client,
                cache: Arc::clone(&cache),
                cutoff: snapshot_config.cutoff,
            };

            let runtime = Builder::new_multi_thread()
                .enable_all()
                .thread_name(concat!(env!("CARGO_PKG_NAME"), "-w"))
                .build()?;
            runtime.block_on(proxy::serve(listener, state))?;

            cache.save()?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let log_file = match &args.command {
        Command::Serve { log_file, .. } => log_file.clone(),
        _ => None,
    };

    if let Err(err) = init_logger(
        args.log_level.unwrap_or(DEFAULT_LOG_LEVEL),
        args.skip_log_timestamp,
        log_file.as_deref(),
    ) {
        eprintln!("{APP_NAME}: {err}");
        return ExitCode::FAILURE;
    }

    debug!("Logger initialized");

    scopeguard::defer! {
        debug!("Stopped.");
    }

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{APP_NAME}: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_line_test() {
        assert_eq!(
            list_line(
                "4f8878062744fae5ff91f1ad0f3efecc760514381bf029d06bdf7023cfc379ba",
                1_700_000_000
            ),
            "4f8878062744fae5ff91f1ad0f3efecc760514381bf029d06bdf7023cfc379ba \
             2023-11-14 22:13:20 (1700000000)"
        );
    }
}
