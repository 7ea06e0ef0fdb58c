// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-hooks CLI - module resolution, loading and bundling front-end

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_loader::bundler::Message;
use spacey_loader::{
    BundleRequest, Channel, Engine, EngineConfig, LoadContext, Platform, ResolveContext, VERSION,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

/// Event a served loader process accepts bundle requests on
const BUILD_EVENT: &str = "build";

/// Shared-state key the last bundle output is published under
const OUTPUT_KEY: &str = "output";

#[derive(Parser)]
#[command(
    name = "spacey-hooks",
    about = "Module resolution, loader dispatch and bundling for Spacey",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bundle an entry into a single artifact
    Bundle {
        /// Entry file
        entry: String,

        /// Only re-export these names (comma separated)
        #[arg(long, value_delimiter = ',')]
        exports: Option<Vec<String>>,

        /// Global variable name; produces a self-executing bundle
        #[arg(long)]
        global_name: Option<String>,

        /// Target platform (node, browser, neutral)
        #[arg(long)]
        platform: Option<String>,

        /// Write the artifact here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Resolve a specifier
    Resolve {
        /// Specifier to resolve
        specifier: String,

        /// Importing module
        #[arg(long)]
        parent: Option<String>,

        /// Import kind
        #[arg(long, default_value = "*")]
        kind: String,
    },

    /// Resolve and load a specifier, printing the produced source
    Load {
        /// Specifier to load
        specifier: String,

        /// Import kind
        #[arg(long, default_value = "*")]
        kind: String,
    },

    /// Run as a loader process over stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results or the channel
    let filter = if cli.verbose {
        "spacey_loader=debug,spacey_hooks=debug"
    } else {
        "spacey_loader=warn,spacey_hooks=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Command::Serve = cli.command {
        serve().await?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => EngineConfig::default(),
    };
    if let Some(cwd) = cli.cwd {
        config.cwd = Some(cwd);
    }
    let engine = Engine::builder().config(config).build()?;

    match cli.command {
        Command::Bundle {
            entry,
            exports,
            global_name,
            platform,
            out,
        } => {
            let platform = platform
                .map(|p| serde_json::from_value::<Platform>(serde_json::Value::String(p)))
                .transpose()
                .context("unknown platform")?;
            let request = BundleRequest {
                exports,
                global_name,
                platform,
                ..BundleRequest::new(entry)
            };
            bundle(&engine, request, out.as_deref()).await
        }
        Command::Resolve {
            specifier,
            parent,
            kind,
        } => {
            let context = match parent {
                Some(parent) => ResolveContext::new(parent),
                None => ResolveContext::default(),
            }
            .with_kind(kind);
            let resolution = engine.resolve_specifier(&specifier, context).await?;
            println!("{}", resolution.url);
            if resolution.builtin {
                eprintln!("{}", "(built-in)".dimmed());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { specifier, kind } => {
            let resolution = engine
                .resolve_specifier(&specifier, ResolveContext::default())
                .await?;
            let output = engine
                .load_url(&resolution.url, LoadContext::with_kind(kind))
                .await?;
            debug!("Loaded {} ({:?})", resolution.url, output.format);
            match output.source {
                Some(source) => println!("{}", source),
                None => eprintln!("{}", "(no source produced)".dimmed()),
            }
            for resource in &output.resources {
                eprintln!("{} {}", "resource".cyan(), resource.hash);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve => Ok(ExitCode::SUCCESS),
    }
}

fn read_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    EngineConfig::from_json_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn print_messages(label: &str, messages: &[Message], error: bool) {
    for message in messages {
        if error {
            eprintln!("{}: {}", label.red().bold(), message);
        } else {
            eprintln!("{}: {}", label.yellow().bold(), message);
        }
    }
}

async fn bundle(engine: &Engine, request: BundleRequest, out: Option<&Path>) -> anyhow::Result<ExitCode> {
    let output = engine.bundle(request).await?;

    print_messages("warning", &output.warnings, false);
    print_messages("error", &output.errors, true);
    if !output.errors.is_empty() {
        return Ok(ExitCode::FAILURE);
    }

    match out {
        Some(path) => {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(path, &output.code).await?;
            eprintln!(
                "{} {} ({} files)",
                "Bundled".green().bold(),
                path.display(),
                output.files.len()
            );
        }
        None => print!("{}", output.code),
    }
    Ok(ExitCode::SUCCESS)
}

/// Loader process mode
///
/// Waits for `initialize`, then bundles every `build` request. Each output
/// is published to the shared state under `output`.
async fn serve() -> anyhow::Result<()> {
    let channel = Channel::connect(tokio::io::stdin(), tokio::io::stdout());
    let engine = Engine::from_channel(channel.clone()).await?;
    info!("Loader process ready in {}", engine.cwd().display());

    while let Ok(args) = channel.once(BUILD_EVENT).await {
        let Some(request) = args.into_iter().next() else {
            continue;
        };
        let request: BundleRequest = match serde_json::from_value(request) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Ignoring malformed build request: {}", e);
                continue;
            }
        };
        let output = engine.bundle(request).await?;
        channel.state().set(OUTPUT_KEY, serde_json::to_value(&output)?)?;
    }

    debug!("Channel closed, exiting");
    Ok(())
}
