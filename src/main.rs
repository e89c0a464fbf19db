//! offcache - Inspect and use a journaled offline cache
//!
//! A small command-line front end over the offcache library: report and
//! maintain a cache directory, or fetch URLs through the cached remote API.

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;

use offcache::cache::CacheManager;
use offcache::cli::{fetch_policy, format_entry, format_stats, Cli, Command};
use offcache::intercept::CacheLayer;
use offcache::logging::{init_logging, LoggingConfig};
use offcache::remote::{CachedRemoteApi, HttpRemote, RemoteApi};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let logging = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    init_logging(&logging)?;

    let config = cli.cache_config()?;
    let cache = CacheManager::new(&config)?;

    match cli.command {
        Command::Stats => {
            println!("{}", format_stats(&cache.stats().await?));
        }
        Command::Sweep => {
            let removed = cache.sweep_expired().await?;
            println!("removed: {}", removed);
            println!("{}", format_stats(&cache.stats().await?));
        }
        Command::Clear => {
            cache.clear().await?;
            println!("Cleared {}", cache.directory().display());
        }
        Command::Inspect { key } => match cache.entry(&key).await? {
            Some(entry) => println!("{}", format_entry(&entry)),
            None => return Err(format!("No cache entry for key {}", key).into()),
        },
        Command::Fetch {
            url,
            ttl,
            offline_ttl,
            fresh,
        } => {
            let policy = fetch_policy(ttl, offline_ttl)?;
            let api = CachedRemoteApi::with_policy(
                HttpRemote::new(),
                CacheLayer::new(cache.clone()),
                policy,
            );

            // --fresh refreshes the plain entry; --offline-ttl opts into the
            // stale fallback, which is cached separately
            let body = if fresh {
                api.fetch_text_fresh(&url).await?
            } else if offline_ttl.is_some() {
                let fetched = api.fetch_text_offline(&url).await?;
                if fetched.is_stale {
                    eprintln!("warning: fetch failed, showing a stale cached copy");
                }
                fetched.data
            } else {
                api.fetch_text(&url).await?
            };
            print!("{}", body);
        }
    }

    cache.close().await?;
    Ok(())
}
