// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::{Path, PathBuf};

use clap::{App, Arg};
use tokio::io::BufReader;
use tokio::runtime;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use appctl::config;
use appctl::control;
use appctl::procs::Supervisor;
use appctl::registry::Registry;
use appctl::Error;

const CONFIG: &str = "config";
const LOG_LEVEL: &str = "log-level";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }
}

fn main() {
    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name(CONFIG)
                .short("c")
                .long(CONFIG)
                .value_name("FILE")
                .default_value(config::DEFAULT_CONFIG_FILE)
                .help("program list, a default one is created if missing")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("FILTER")
                .default_value("warn")
                .help("diagnostics written to stderr, e.g. `info` or `appctl=debug`")
                .takes_value(true),
        )
        .get_matches();

    let filter = args.value_of(LOG_LEVEL).unwrap_or("warn");
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = PathBuf::from(
        args.value_of_os(CONFIG)
            .unwrap_or_else(|| config::DEFAULT_CONFIG_FILE.as_ref()),
    );

    let registry = match load_registry(&config_path) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    let result = runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(command_loop(registry)));

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

/// Creates the default configuration when there is none, then loads it
fn load_registry(path: &Path) -> Result<Registry, Error> {
    if !path.exists() {
        config::write_default(path)?;
        println!(
            "no configuration found, created {} with default programs",
            path.display()
        );
    }

    let registry = Registry::load(path)?;
    info!(path = %path.display(), programs = registry.list().len(), "configuration loaded");
    Ok(registry)
}

async fn command_loop(registry: Registry) -> Result<(), Error> {
    let mut supervisor = Supervisor::new();
    let input = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    control::run(input, &registry, &mut supervisor, &mut stdout).await
}
