mod cli;

use std::sync::Arc;

use clap::Parser;
use kron_core::{AppConfig, ClusterClient};
use kron_engine::{
    run_watch_loop, ReconciliationEngine, RetentionCollector, RetentionPolicy, TriggerScheduler,
    WatchOptions,
};
use kron_kube::KubeClusterClient;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = kron_core::load_app_config(cli.config.as_deref(), &cli.overrides())?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let client = Arc::new(
        KubeClusterClient::connect(config.host.as_deref(), &config.namespace).await?,
    );

    match cli.command {
        None | Some(Commands::Server(_)) => serve(&config, client).await,
        Some(Commands::Templates) => list_templates(&config, client.as_ref()).await,
        Some(Commands::Gc) => collect_once(&config, client).await,
    }
}

async fn serve(config: &AppConfig, client: Arc<KubeClusterClient>) -> anyhow::Result<()> {
    let triggers = TriggerScheduler::new().await?;
    triggers.start().await?;
    let mut engine = ReconciliationEngine::new(
        Arc::clone(&client),
        triggers,
        config.template_selector.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collector = if config.gc_enabled {
        let collector = RetentionCollector::new(Arc::clone(&client), retention_policy(config));
        Some(tokio::spawn(collector.run(shutdown_rx.clone())))
    } else {
        tracing::info!("retention: garbage collection disabled");
        None
    };

    let options = WatchOptions {
        selector: config.template_selector.clone(),
        retry_max: config.watch_retry_max,
        retry_backoff_ms: config.watch_retry_backoff_ms,
    };
    tracing::info!(
        namespace = %config.namespace,
        selector = %options.selector,
        "kron: watching templates"
    );

    let result = {
        let watch_loop = run_watch_loop(Arc::clone(&client), &mut engine, &options, shutdown_rx);
        tokio::pin!(watch_loop);
        tokio::select! {
            result = &mut watch_loop => result,
            () = shutdown_signal() => {
                shutdown_tx.send(true).ok();
                watch_loop.await
            }
        }
    };

    shutdown_tx.send(true).ok();
    if let Some(handle) = collector {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "retention: collector task failed");
        }
    }
    engine.shutdown(config.drain_timeout()).await;

    result?;
    tracing::info!("kron: stopped");
    Ok(())
}

async fn list_templates(config: &AppConfig, client: &impl ClusterClient) -> anyhow::Result<()> {
    let mut templates = client.list_templates(&config.template_selector).await?;
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    for template in templates {
        println!(
            "{}\t{}",
            template.name,
            template.schedule.as_deref().unwrap_or("<none>")
        );
    }
    Ok(())
}

async fn collect_once(config: &AppConfig, client: Arc<KubeClusterClient>) -> anyhow::Result<()> {
    let report = RetentionCollector::new(client, retention_policy(config))
        .collect()
        .await?;
    println!(
        "examined {} deleted {} kept {} failed {}",
        report.examined, report.deleted, report.kept, report.failed
    );
    Ok(())
}

fn retention_policy(config: &AppConfig) -> RetentionPolicy {
    RetentionPolicy {
        max_age: config.gc_max_age(),
        interval: config.gc_interval(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
