use std::{process, sync::Arc};

use tokio::{signal, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use voicegen::{
    application::{
        delivery::{DeliveryWorker, FixedDelay, RetryPolicy},
        error::AppError,
        jobs::{IntakeLimits, JobDispatcher, work_queue},
        repos::JobStatusRepo,
    },
    config,
    domain::job_id::{JobIdGenerator, RandomJobIds},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        status_store::InMemoryJobStatusRepo,
        telemetry,
        transport::TcpConnector,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let statuses: Arc<dyn JobStatusRepo> = Arc::new(InMemoryJobStatusRepo::new());
    let ids: Arc<dyn JobIdGenerator> = Arc::new(RandomJobIds);
    let (queue, jobs) = work_queue();

    let retry: Arc<dyn RetryPolicy> = Arc::new(FixedDelay::new(settings.delivery.retry_delay));
    let worker = DeliveryWorker::new(TcpConnector::new(&settings.delivery), retry, &queue, jobs);
    let delivery = worker.subscribe();
    let worker_handle = spawn_delivery_worker(worker);

    let dispatcher = JobDispatcher::new(
        statuses,
        queue,
        ids,
        IntakeLimits {
            max_message_chars: settings.intake.max_message_chars,
        },
    );
    let state = HttpState {
        dispatcher,
        delivery,
        url_prefix: Arc::from(settings.results.url_prefix.as_str()),
    };

    let result = serve_http(&settings, state).await;

    worker_handle.abort();
    let _ = worker_handle.await;

    result
}

fn spawn_delivery_worker(worker: DeliveryWorker<TcpConnector>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = worker.run().await {
            error!(target = "voicegen::delivery", error = %err, "delivery worker stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state, settings.intake.max_request_bytes.get());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "voicegen::http",
        addr = %settings.server.addr,
        delivery_endpoint = %settings.delivery.endpoint,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "voicegen::http", "server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
