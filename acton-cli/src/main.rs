//! Process entry point for an `acton-service`-based binary (spec §6
//! "Runtime CLI"): loads configuration for the named instance, boots a
//! [`Dispatcher`] with whatever Listeners the configuration asks for, and
//! runs until a shutdown signal arrives.
//!
//! This binary carries no application handlers of its own — it exposes only
//! the standard liveness/readiness probes. Real services embed
//! `acton-service` as a library and register their own handlers before
//! calling `Dispatcher::run`, the way `demos/rest_and_web.rs` and
//! `demos/chat.rs` do; `acton` is for deployments that are pure
//! configuration (an AMQP relay, a TCP proxy) with no custom routing.

use std::process::ExitCode;
use std::sync::Arc;

use acton_service::listeners::{AmqpListener, HttpListener, TcpListener};
use acton_service::prelude::*;
use clap::Parser;
use futures::FutureExt;

/// acton - runs an acton-service instance from configuration.
#[derive(Parser)]
#[command(name = "acton")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Instance name, used for log scoping and the config search path
    /// (`$XDG_CONFIG_HOME/acton-service/<name>/config.toml`).
    #[arg(short = 'n', long = "name")]
    name: Option<String>,
}

enum Failure {
    /// Config load, tracing init, or listener bind failed (spec: exit 1).
    Startup(anyhow::Error),
    /// The running instance panicked (spec: exit 2).
    Runtime(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::from(0),
        Err(Failure::Startup(e)) => {
            eprintln!("acton: startup failed: {e}");
            ExitCode::from(1)
        }
        Err(Failure::Runtime(e)) => {
            eprintln!("acton: unrecoverable runtime failure: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let service_name = cli.name.unwrap_or_else(|| "acton-service".to_string());

    let mut config = Config::load_for_service(&service_name).map_err(|e| Failure::Startup(e.into()))?;
    config.service.name = service_name;

    init_tracing(&config).map_err(|e| Failure::Startup(e.into()))?;

    let dispatcher = Dispatcher::new(config.router.as_ref(), GroupConfig::default())
        .await
        .map_err(|e| Failure::Startup(e.into()))?;

    dispatcher.router().register_restful(vec![Predicate::url("/health").unwrap()], health);
    dispatcher.router().register_restful(vec![Predicate::url("/ready").unwrap()], readiness);
    dispatcher.ensure_router_ready();

    let dispatcher = Arc::new(dispatcher);

    if let Some(http) = HttpListener::new(&config) {
        dispatcher.add_listener(Arc::new(http));
    }
    if let Some(tcp) = TcpListener::new(&config) {
        dispatcher.add_listener(Arc::new(tcp));
    }
    for rabbit in &config.rabbit {
        let amqp = AmqpListener::new(rabbit.clone()).map_err(|e| Failure::Startup(e.into()))?;
        dispatcher.add_listener(Arc::new(amqp));
    }

    let result = std::panic::AssertUnwindSafe(dispatcher.run())
        .catch_unwind()
        .await;

    shutdown_tracing();

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Failure::Startup(e.into())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic with no message".to_string());
            Err(Failure::Runtime(message))
        }
    }
}
