use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pod_ownership::cli::{Cli, OutputFormat};
use pod_ownership::diagnostics;
use pod_ownership::handler::{JsonSink, LogSink, OwnershipSink, PodEventHandler};
use pod_ownership::kubernetes::{WatchFilter, create_client, watch_pods};
use pod_ownership::ownership::{ControllerKinds, KubeJobLookup, OwnershipResolver};
use pod_ownership::supervisor::{PipelineOptions, WatchSupervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = match create_client(cli.kubeconfig.as_deref()).await {
        Ok(client) => client,
        Err(e) => {
            error!("could not create client: {}", e);
            return Err(e.into());
        }
    };

    let kinds = ControllerKinds::default().with_extra(cli.extra_controller_kinds.iter().cloned());
    let lookup = KubeJobLookup::new(client.clone(), Duration::from_secs(cli.lookup_timeout));
    let resolver = OwnershipResolver::new(Some(lookup), kinds);
    let sink: Box<dyn OwnershipSink> = match cli.output {
        OutputFormat::Log => Box::new(LogSink),
        OutputFormat::Json => Box::new(JsonSink::new(std::io::stdout())),
    };
    let handler = Arc::new(PodEventHandler::new(resolver, sink));

    let watch_filter = WatchFilter {
        namespace: cli.namespace.clone(),
        node: cli.node.clone(),
        honor_resyncs: cli.honor_resyncs,
    };
    let options = PipelineOptions {
        sync_timeout: Duration::from_secs(cli.sync_timeout),
        max_in_flight: usize::from(cli.max_in_flight),
    };

    let mut supervisor = WatchSupervisor::new();

    let shutdown = CancellationToken::new();
    let diagnostics_task = if cli.no_diagnostics {
        None
    } else {
        Some(diagnostics::spawn(
            cli.diagnostics_addr,
            supervisor.ready(),
            shutdown.clone(),
        ))
    };

    supervisor.start(watch_pods(client, &watch_filter), handler, options);

    let result = tokio::select! {
        res = supervisor.wait() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            supervisor.stop();
            supervisor.wait().await
        }
    };

    shutdown.cancel();
    if let Some(task) = diagnostics_task {
        diagnostics::join(task).await;
    }

    if let Err(e) = &result {
        error!("pod watch failed: {}", e);
    }
    result?;
    Ok(())
}
