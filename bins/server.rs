use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use uuid::Uuid;

use server::{install_signal_handlers, run_until_shutdown, KvService, ServiceConfig, ShutdownSignal};

/// HTTP front end for an embedded key-value store
#[derive(Parser, Debug)]
#[command(name = "kvhttp")]
#[command(version)]
struct Args {
    /// Launch with a config file (falls back to CONFIG_PATH, then config.toml)
    #[arg(short = 'c', long = "cfg")]
    cfg: Option<PathBuf>,
}

fn init_logging() {
    // load .env first so RUST_LOG / LOG_FORMAT apply
    dotenv().ok();
    common::utils::logging::init_logging_from_env();
    info!(service = "kvhttp", event = "logger_init", "tracing subscriber initialized");
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(
            service = "kvhttp",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    let cfg = match configs::AppConfig::load(args.cfg.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(service = "kvhttp", event = "config_failed", error = %e, "unable to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let worker_threads = cfg.server.worker_threads;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(w) = worker_threads {
        builder.worker_threads(w);
    }
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "kvhttp", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "kvhttp",
        event = "start",
        %service_id,
        pid,
        version,
        threads = worker_threads.unwrap_or_default(),
        "kvhttp starting"
    );

    rt.block_on(async move {
        let service = KvService::new(ServiceConfig::from(&cfg));
        let shutdown = Arc::new(ShutdownSignal::new());

        if let Err(e) = install_signal_handlers(Arc::clone(&shutdown)) {
            error!(service = "kvhttp", event = "signal_setup_failed", error = %e, "unable to install signal handlers");
            return ExitCode::FAILURE;
        }

        match service.start().await {
            Ok(addr) => info!(service = "kvhttp", event = "listening", %addr, "accepting requests"),
            Err(e) => {
                error!(service = "kvhttp", event = "start_failed", error = %e, "unable to start server");
                return ExitCode::FAILURE;
            }
        }

        match run_until_shutdown(&service, &shutdown).await {
            Ok(()) => {
                info!(service = "kvhttp", event = "stop", %service_id, pid, "server stopped normally");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(service = "kvhttp", event = "stop_failed", error = %e, "server stopped with errors");
                ExitCode::FAILURE
            }
        }
    })
}
