// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Bootstrap (C12, spec §4.12): parses credentials and config, builds the
//! full C1–C11 dependency graph, starts the AFK-driven listener controller,
//! serves the MCP stdio handshake, and drains everything on shutdown.

mod cli;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use zulip_mcp_config::{CliCredentialOverrides, Config};
use zulip_mcp_rest::{IdentityRegistry, RestClient};
use zulip_mcp_store::Store;
use zulip_mcp_tools::ToolContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(%err, "fatal startup error");
            eprintln!("zulip-mcp: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = zulip_mcp_config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(&config)?);
            return Ok(());
        }
        Some(Commands::Completions { shell }) => {
            cli::print_completions(shell);
            return Ok(());
        }
        Some(Commands::Migrate) => {
            let db_path = resolve_db_path(&cli, &config);
            Store::init(&db_path).with_context(|| format!("applying migrations to {}", db_path.display()))?;
            println!("migrations applied at {}", db_path.display());
            return Ok(());
        }
        Some(Commands::Serve) | None => {}
    }

    // §6: missing user credentials is a fatal startup error; missing bot
    // credentials only disables agent features (logged as a warning by
    // `resolve_credentials` itself).
    let overrides: CliCredentialOverrides = cli.credential_overrides();
    let credentials = zulip_mcp_config::resolve_credentials(&overrides, cli.zuliprc_path().as_deref())
        .context("resolving Zulip credentials")?;

    let db_path = resolve_db_path(&cli, &config);
    tracing::info!(path = %db_path.display(), "opening store");
    let store = Arc::new(Store::init(&db_path).with_context(|| format!("opening store at {}", db_path.display()))?);

    let identities = Arc::new(IdentityRegistry::new(credentials));
    let rest = Arc::new(RestClient::new(identities.clone(), store.clone(), config.rest.clone(), config.cache.clone()).context("building REST client")?);

    // C6/C7: the AFK-driven listener controller runs for the process
    // lifetime on its own tick interval, independent of the MCP stdio loop.
    let listener = zulip_mcp_listener::spawn(rest.clone(), store.clone(), config.listener.clone());

    let ctx = ToolContext::new(rest, store, config.agents.clone());
    let registry = Arc::new(zulip_mcp_tools::build_registry());

    tracing::info!(tools = registry.names().len(), "zulip-mcp ready, serving MCP over stdio");

    let serve = zulip_mcp_mcp::serve_stdio(registry, ctx);
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => {
            result.context("MCP server error")?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining background workers");
        }
    }

    // §5 cancellation: drain the listener (deregister its queue, exit its
    // loop) with a bounded deadline rather than blocking shutdown forever
    // on a stuck long-poll.
    let drained = tokio::time::timeout(std::time::Duration::from_secs(5), listener.shutdown()).await;
    if drained.is_err() {
        tracing::warn!("listener did not drain within the shutdown deadline");
    }

    Ok(())
}

/// `--db-path` > `ZULIP_MCP_DB_PATH` > config file `store.path` (spec §6).
fn resolve_db_path(cli: &Cli, config: &Config) -> std::path::PathBuf {
    cli.db_path
        .clone()
        .or_else(|| std::env::var_os("ZULIP_MCP_DB_PATH").map(std::path::PathBuf::from))
        .unwrap_or_else(|| config.store.path.clone())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// stdout is the MCP transport; all logs go to stderr, filtered by
/// `RUST_LOG` (default `info`), with verbosity bumped by repeated `-v`.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(std::io::stderr().is_terminal()).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(db_path: Option<&str>) -> Cli {
        Cli::parse_from(match db_path {
            Some(p) => vec!["zulip-mcp".to_string(), "--db-path".to_string(), p.to_string()],
            None => vec!["zulip-mcp".to_string()],
        })
    }

    // `ZULIP_MCP_DB_PATH` is process-global state; run the whole priority
    // chain as one test so parallel test threads can't interleave sets.
    #[test]
    fn db_path_priority_chain() {
        std::env::remove_var("ZULIP_MCP_DB_PATH");
        let cli = cli_with(None);
        assert_eq!(resolve_db_path(&cli, &Config::default()), Config::default().store.path);

        std::env::set_var("ZULIP_MCP_DB_PATH", "/env/path.db");
        let cli = cli_with(None);
        assert_eq!(resolve_db_path(&cli, &Config::default()), std::path::PathBuf::from("/env/path.db"));

        let cli = cli_with(Some("/flag/path.db"));
        assert_eq!(resolve_db_path(&cli, &Config::default()), std::path::PathBuf::from("/flag/path.db"));

        std::env::remove_var("ZULIP_MCP_DB_PATH");
    }
}
