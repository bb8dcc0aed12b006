mod cli;

use clap::Parser;
use log::{debug, error, info};
use std::path::{Path, PathBuf};

use crate::cli::CliArgs;
use netatmo_thermostat::config::{Config, ENV_REFRESH_TOKEN, load_env_file};
use netatmo_thermostat::{ClientError, NetatmoClient};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    applied: usize,
}

fn load_env(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        let applied = load_env_file(path)?;
        return Ok(Some(LoadedEnvFile {
            path: path.to_path_buf(),
            explicit: true,
            applied,
        }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    let applied = load_env_file(&default_path)?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
        applied,
    }))
}

fn run(args: &CliArgs) -> Result<(), ClientError> {
    let cfg = Config::from_env();
    debug!(
        "Config loaded (api_url={}, password_credentials={}, refresh_token={})",
        cfg.api_url,
        cfg.has_password_credentials(),
        cfg.refresh_token.is_some()
    );

    let client = NetatmoClient::new(&cfg)?;
    let outcome = cli::execute(&client, &args.command, args.json);

    // Surface a rotated refresh token even when the command itself failed.
    if let Some(token) = client.refresh_token() {
        if cfg.refresh_token.as_deref() != Some(token.as_str()) {
            info!("A new refresh token was issued; set {} to reuse it", ENV_REFRESH_TOKEN);
        }
        if args.show_refresh_token {
            eprintln!("{}={}", ENV_REFRESH_TOKEN, token);
        }
    }

    println!("{}", outcome?);
    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    let loaded_env = match load_env(args.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_level = if args.debug { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if args.debug {
        builder.filter_module("netatmo_thermostat", log::LevelFilter::Debug);
    }
    builder.format_timestamp_secs().init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        debug!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    debug!(
        "netatmo-thermostat {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&args) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
