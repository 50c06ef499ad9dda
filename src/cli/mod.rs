// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::Context as _;
use clap::Parser;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::config::{Config, ResolveMethod};
use crate::orchestrator::BlockOrchestrator;
use crate::request::IpfsTrustlessRequest;
use crate::utils::logger::setup_logger;
use crate::utils::net::global_http_client;

/// Fetches a file from an untrusted IPFS gateway, verifying every block.
#[derive(Debug, Parser)]
#[command(name = "ipfs-fetch", version, about)]
pub struct Cli {
    /// `ipfs://<cid>/<path>` or a gateway URL
    pub url: Url,
    /// Configuration file, defaults to `$IPFS_TRUSTLESS_CONFIG`
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Resolve `ipfs://` URLs through the local node gateway
    #[arg(long)]
    pub local: bool,
    /// Gateway to resolve `ipfs://` URLs with
    #[arg(long)]
    pub gateway: Option<Url>,
    /// Only fetch the structure of the entity and report its size
    #[arg(long)]
    pub only_structure: bool,
    /// Write the body to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Configuration file overridden by the command line flags.
    pub fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if self.local {
            config.gateway.resolve_method = ResolveMethod::Local;
        }
        if let Some(gateway) = &self.gateway {
            match config.gateway.resolve_method {
                ResolveMethod::Gateway => config.gateway.public_gateway = gateway.clone(),
                ResolveMethod::Local => config.gateway.local_gateway = gateway.clone(),
            }
        }
        Ok(config)
    }

    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let mut orchestrator = BlockOrchestrator::from_config(&config);
        let request = IpfsTrustlessRequest::new(self.url.clone(), Arc::new(global_http_client()))
            .with_only_structure(self.only_structure);

        let mut out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
            )),
            None => Box::new(io::stdout().lock()),
        };
        let mut outcome = Ok(());
        let mut summary = None;
        orchestrator
            .build_response(request, |result| match result {
                Ok(chunk) => {
                    if let Err(e) = out.write_all(&chunk.body) {
                        outcome = Err(anyhow::Error::from(e).context("failed to write the body"));
                    }
                    if chunk.is_last_chunk {
                        summary = Some(chunk);
                    }
                }
                Err(e) => {
                    outcome = Err(anyhow::Error::from(e).context(format!("failed to fetch {}", self.url)));
                }
            })
            .await?;
        out.flush()?;
        outcome?;

        if let Some(last) = summary {
            eprintln!("status: {}", last.status);
            eprintln!("mime: {}", last.mime);
            eprintln!("total_size: {}", last.total_size);
            if let Some(location) = last.location {
                eprintln!("location: {location}");
            }
        }
        Ok(())
    }
}

pub fn main<ArgT>(args: impl IntoIterator<Item = ArgT>) -> anyhow::Result<()>
where
    ArgT: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config = cli.config()?;
    setup_logger(&config.log);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli.run(config))
}
