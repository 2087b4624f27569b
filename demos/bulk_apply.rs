// SPDX-License-Identifier: MIT OR Apache-2.0

//! Example: declarative bulk apply
//!
//! Reads a manifest file (or a directory of manifests) and converges the
//! ODAHU API to it. Credentials come from `~/.odahuflow/config` and the
//! environment.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=odahu_api=debug cargo run --example bulk_apply -- resources.yaml
//! cargo run --example bulk_apply -- resources/ --remove --interactive
//! ```
//!
//! `--interactive` allows the browser login when the stored credentials
//! are rejected; `ODAHUFLOWCTL_NONINTERACTIVE=true` still forbids it.

use std::path::PathBuf;
use std::process::ExitCode;

use odahu_api_rs::manifest::{parse_resources_dir, parse_resources_file};
use odahu_api_rs::{apply, ApiClient, Authenticator, ClientConfig, ConfigStore, Settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: bulk_apply <manifest file or directory> [--remove] [--interactive]");
        return ExitCode::from(2);
    };
    let flags: Vec<String> = args.collect();
    let is_removal = flags.iter().any(|a| a == "--remove");
    let interactive = flags.iter().any(|a| a == "--interactive");

    let changes = if path.is_dir() {
        parse_resources_dir(&path)
    } else {
        parse_resources_file(&path)
    };
    let changes = match changes {
        Ok(changes) => changes,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let client = match build_client(interactive) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to configure client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Applying {} resource(s) to {}...",
        changes.len(),
        client.config().base_url
    );

    let result = apply(&changes, &client, is_removal).await;
    println!("{result}");

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[allow(clippy::result_large_err)]
fn build_client(interactive: bool) -> odahu_api_rs::Result<ApiClient> {
    let store = ConfigStore::open_default()?;
    let settings = Settings::load(&store)?;
    let auth = Authenticator::from_settings(&settings)
        .with_store(store)
        .with_non_interactive(!interactive);
    ApiClient::new(ClientConfig::from(&settings), auth)
}
