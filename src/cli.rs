// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// AI-agent bridge to Zulip, exposed over the Model Context Protocol.
#[derive(Parser, Debug)]
#[command(name = "zulip-mcp", version, about)]
pub struct Cli {
    /// Path to an explicit config file (highest config-file priority).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Path to the embedded store database file (overrides config/env).
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Path to a `.zuliprc` credentials file (defaults to `~/.zuliprc`).
    #[arg(long, global = true)]
    pub zuliprc: Option<PathBuf>,

    /// User identity email (overrides ZULIP_EMAIL / zuliprc).
    #[arg(long, env = "ZULIP_EMAIL", global = true)]
    pub email: Option<String>,
    /// User identity API key (overrides ZULIP_API_KEY / zuliprc).
    #[arg(long, env = "ZULIP_API_KEY", global = true)]
    pub api_key: Option<String>,
    /// Zulip realm URL (overrides ZULIP_SITE / zuliprc).
    #[arg(long, env = "ZULIP_SITE", global = true)]
    pub site: Option<String>,
    /// Bot identity email (overrides ZULIP_BOT_EMAIL / zuliprc).
    #[arg(long, env = "ZULIP_BOT_EMAIL", global = true)]
    pub bot_email: Option<String>,
    /// Bot identity API key (overrides ZULIP_BOT_API_KEY / zuliprc).
    #[arg(long, env = "ZULIP_BOT_API_KEY", global = true)]
    pub bot_api_key: Option<String>,
    /// Bot display name (overrides ZULIP_BOT_NAME).
    #[arg(long, env = "ZULIP_BOT_NAME", global = true)]
    pub bot_name: Option<String>,

    /// Increase log verbosity (stderr only; stdout is reserved for MCP).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn credential_overrides(&self) -> zulip_mcp_config::CliCredentialOverrides {
        zulip_mcp_config::CliCredentialOverrides {
            email: self.email.clone(),
            api_key: self.api_key.clone(),
            site: self.site.clone(),
            bot_email: self.bot_email.clone(),
            bot_api_key: self.bot_api_key.clone(),
            bot_name: self.bot_name.clone(),
        }
    }

    pub fn zuliprc_path(&self) -> Option<PathBuf> {
        self.zuliprc.clone().or_else(zulip_mcp_config::default_zuliprc_path)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the MCP stdio server (default when no subcommand is given).
    Serve,

    /// Apply store migrations and exit, without starting the MCP handshake.
    Migrate,

    /// Print the fully merged configuration (file + env) as YAML and exit.
    ShowConfig,

    /// Generate shell completions for the given shell.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
