//! Enumeration orchestration -- assembly, bus wiring, and lifecycle.
//!
//! The [`Orchestrator`] is the central coordinator of `ironsight-daemon`.
//! It loads configuration, builds the event bus, graph, and shared
//! filters, registers services in dependency order, runs the quiescence
//! sampler, and manages graceful shutdown.
//!
//! # Startup Order (consumers before producers)
//!
//! 1. Resolver (subscribes NEWNAME, produces RESOLVED)
//! 2. Data manager (subscribes CHECKED, produces NEWNAME/NEWADDR/OUTPUT)
//! 3. Source workers (produce NEWNAME)
//!
//! Subscriptions are created inside each service's `start()`, so every
//! consumer must be up before the first source fetch completes --
//! events published to a topic nobody subscribes to are lost.
//! The RESOLVED -> CHECKED bridge and the report writer run as
//! controller-owned tasks outside the registry.
//!
//! # Quiescence
//!
//! Once per second the controller samples every service's activity flag
//! and the bus queue depths. After `quiescence_grace_secs` of continuous
//! quiet the enumeration is considered complete and shutdown begins.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ironsight_core::bus::EventBus;
use ironsight_core::config::IronsightConfig;
use ironsight_core::event::EnumRequest;
use ironsight_core::filter::DataSourceFilter;
use ironsight_core::metrics as m;
use ironsight_core::scope::ScopeMatcher;
use ironsight_core::service::ServiceRegistry;
use ironsight_datamgmt::DataManagerBuilder;
use ironsight_graph::{DataOptsWriter, GraphSink, MemoryGraph};
use ironsight_resolver::{HickoryClient, ResolverService};
use ironsight_sources::{builtin_sources, SourceService};

use crate::health::{aggregate_status, DaemonHealth, ServiceHealth};
use crate::metrics_server;
use crate::output;

/// The main enumeration orchestrator.
pub struct Orchestrator {
    config: IronsightConfig,
    run_id: Uuid,
    bus: Arc<EventBus>,
    scope: Arc<ScopeMatcher>,
    graph: Arc<MemoryGraph>,
    services: ServiceRegistry,
    start_time: Instant,
    /// Cancels controller-owned tasks (bridge, report writer).
    tasks_quit: CancellationToken,
    task_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Orchestrator {
    /// Load configuration from disk and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read, fails
    /// validation, or any component fails to initialize. Configuration
    /// is the only fatal error surface of the pipeline.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = IronsightConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when CLI overrides have been applied.
    pub async fn build_from_config(config: IronsightConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        // Scope construction compiles every root's pattern; failure here is fatal.
        let scope = Arc::new(
            ScopeMatcher::new(&config.scope.domains, &config.scope.blacklist)
                .map_err(|e| anyhow::anyhow!("scope construction failed: {}", e))?,
        );

        let run_id = Uuid::new_v4();
        let bus = Arc::new(EventBus::new());
        let graph = Arc::new(MemoryGraph::new());
        let source_filter = Arc::new(DataSourceFilter::new());
        let mut services = ServiceRegistry::new();

        // Resolver first (consumer of NEWNAME)
        tracing::info!("initializing resolver");
        let dns = Arc::new(HickoryClient::new(&config.resolver));
        let resolver = ResolverService::new(dns, Arc::clone(&bus), &config.resolver);
        services
            .register(Box::new(resolver))
            .map_err(|e| anyhow::anyhow!("failed to register resolver: {}", e))?;

        // Data manager (consumer of CHECKED)
        tracing::info!("initializing data manager");
        let mut builder = DataManagerBuilder::new()
            .bus(Arc::clone(&bus))
            .scope(Arc::clone(&scope))
            .graph(Arc::clone(&graph))
            .source_filter(Arc::clone(&source_filter))
            .output_tick(Duration::from_secs(config.enumeration.output_tick_secs));

        if !config.graph.data_opts_path.is_empty() {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.graph.data_opts_path)
                .map_err(|e| anyhow::anyhow!("failed to open data opts file: {}", e))?;
            let sink: Arc<dyn GraphSink> = Arc::new(DataOptsWriter::new(Box::new(file)));
            builder = builder.extra_sink(sink);
            tracing::info!(path = %config.graph.data_opts_path, "graph operation log enabled");
        }

        let manager = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build data manager: {}", e))?;
        services
            .register(Box::new(manager))
            .map_err(|e| anyhow::anyhow!("failed to register data manager: {}", e))?;

        // Source workers last: their first publish must find subscribers
        if config.sources.enabled {
            let client = ironsight_sources::http::build_client(&config.sources)
                .map_err(|e| anyhow::anyhow!("failed to build http client: {}", e))?;
            for source in builtin_sources(&config.sources.names) {
                tracing::info!(source = source.name(), "initializing data source");
                let worker = SourceService::new(
                    source,
                    client.clone(),
                    Arc::clone(&scope),
                    Arc::clone(&bus),
                    Arc::clone(&source_filter),
                );
                services
                    .register(Box::new(worker))
                    .map_err(|e| anyhow::anyhow!("failed to register source: {}", e))?;
            }
        }

        tracing::info!(
            run_id = %run_id,
            domains = config.scope.domains.len(),
            services = services.count(),
            "orchestrator initialized"
        );

        if config.metrics.enabled {
            record_daemon_metrics(services.count());
        }

        Ok(Self {
            config,
            run_id,
            bus,
            scope,
            graph,
            services,
            start_time: Instant::now(),
            tasks_quit: CancellationToken::new(),
            task_handles: Vec::new(),
        })
    }

    /// Start all services and run until quiescence or a shutdown signal.
    pub async fn run(&mut self) -> Result<()> {
        // Controller-owned tasks go up before any producer
        let bridge = spawn_resolved_bridge(
            Arc::clone(&self.bus),
            Arc::clone(&self.scope),
            self.tasks_quit.clone(),
        );
        self.task_handles.push(bridge);

        let report_target = output::open_report_target(&self.config.general.output_file)
            .map_err(|e| anyhow::anyhow!("failed to open output target: {}", e))?;
        let report = output::spawn_report_writer(
            self.bus.subscribe_output(),
            report_target,
            self.tasks_quit.clone(),
        );
        self.task_handles.push(report);

        tracing::info!("starting all services");
        if let Err(e) = self.services.start_all().await {
            tracing::warn!("startup failed, rolling back already-started services");
            if let Err(stop_err) = self.services.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            self.tasks_quit.cancel();
            return Err(e.into());
        }

        let reason = self.wait_for_completion().await?;
        tracing::info!(reason, "beginning shutdown");

        self.shutdown().await
    }

    /// Pause every service; in-flight operations complete first.
    pub fn pause(&self) {
        tracing::info!("pausing enumeration");
        self.services.pause_all();
    }

    /// Resume all paused services.
    pub fn resume(&self) {
        tracing::info!("resuming enumeration");
        self.services.resume_all();
    }

    /// The unique id of this enumeration run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let statuses = self.services.health_check_all().await;
        let services: Vec<ServiceHealth> = statuses
            .into_iter()
            .map(|(name, status)| ServiceHealth { name, status })
            .collect();

        DaemonHealth {
            status: aggregate_status(&services),
            uptime_secs: self.start_time.elapsed().as_secs(),
            services,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &IronsightConfig {
        &self.config
    }

    /// Block until the pipeline goes quiescent or a signal arrives.
    ///
    /// Returns a short description of what ended the run.
    async fn wait_for_completion(&self) -> Result<&'static str> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

        let grace = Duration::from_secs(self.config.enumeration.quiescence_grace_secs);
        let mut sampler = tokio::time::interval(Duration::from_secs(1));
        sampler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut quiet_for = Duration::ZERO;

        loop {
            tokio::select! {
                _ = sigterm.recv() => return Ok("SIGTERM"),
                _ = sigint.recv() => return Ok("SIGINT"),
                _ = sampler.tick() => {
                    let pending = self.bus.pending_events();
                    let busy = self.services.any_activity() || pending > 0;
                    if busy {
                        quiet_for = Duration::ZERO;
                    } else {
                        quiet_for += Duration::from_secs(1);
                    }

                    if self.config.metrics.enabled {
                        self.record_sampler_metrics();
                    }

                    tracing::trace!(
                        pending,
                        quiet_secs = quiet_for.as_secs(),
                        "quiescence sample"
                    );
                    if quiet_for >= grace {
                        return Ok("quiescent");
                    }
                }
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_sampler_metrics(&self) {
        metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(self.start_time.elapsed().as_secs() as f64);
        metrics::gauge!(m::GRAPH_NODES).set(self.graph.node_count() as f64);
        metrics::gauge!(m::GRAPH_EDGES).set(self.graph.edge_count() as f64);
    }

    /// Perform graceful shutdown.
    ///
    /// Services stop in registration order (producers first, consumers
    /// last) so the data manager can drain remaining events. In-flight
    /// external calls get `shutdown_grace_secs` before being abandoned.
    async fn shutdown(&mut self) -> Result<()> {
        let grace = Duration::from_secs(self.config.enumeration.shutdown_grace_secs);

        tracing::info!("stopping all services");
        match tokio::time::timeout(grace, self.services.stop_all()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "service stop reported errors"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "shutdown grace elapsed, abandoning in-flight work"
                );
            }
        }

        self.tasks_quit.cancel();
        for task in self.task_handles.drain(..) {
            let _ = task.await;
        }

        tracing::info!(
            run_id = %self.run_id,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "enumeration finished"
        );
        Ok(())
    }
}

/// Bridge RESOLVED events onto CHECKED, dropping blacklisted names.
///
/// This is the controller's scope gate between validation and data
/// management: everything else about a request passes through untouched.
pub fn spawn_resolved_bridge(
    bus: Arc<EventBus>,
    scope: Arc<ScopeMatcher>,
    quit: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut sub = bus.subscribe_resolved();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = quit.cancelled() => break,
                msg = sub.recv() => {
                    let Some(req) = msg else { break };
                    if scope.is_blacklisted(&req.name) {
                        tracing::debug!(name = %req.name, "dropping blacklisted name");
                        continue;
                    }
                    bus.publish_checked(EnumRequest::clone(&req)).await;
                }
            }
        }
        tracing::debug!("resolved bridge exited");
    })
}

/// Record daemon-level metrics (build info, registered services).
#[allow(clippy::cast_precision_loss)]
fn record_daemon_metrics(service_count: usize) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    metrics::gauge!(m::DAEMON_SERVICES_REGISTERED).set(service_count as f64);
}
