/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Builds the database, cache, job queue and probe engine from config
/// - Schedules every active endpoint on startup
/// - Runs the background retention and suppression sweeps
/// - Shuts the queue down cleanly on Ctrl-C
pub mod retention;


pub use retention::{RetentionCleanup, RetentionPolicy};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::alerts::{DuplicateSuppressor, NotificationDispatcher, SenderRegistry};
use crate::cache::Cache;
use crate::config::Config;
use crate::database::{Database, open_database};
use crate::endpoints::EndpointRegistry;
use crate::events::EventBus;
use crate::monitoring::{HttpClient, ProbeEngine, ReqwestClient};
use crate::scheduler::{JobQueue, LocalJobQueue, Scheduler};
use crate::stats::StatisticsEngine;

/// Main orchestrator for the Beacon service
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    cache: Cache,
    events: EventBus,
    dispatcher: Arc<NotificationDispatcher>,
    engine: Arc<ProbeEngine>,
    queue: Arc<LocalJobQueue>,
    scheduler: Arc<Scheduler>,
    registry: Arc<EndpointRegistry>,
    stats: Arc<StatisticsEngine>,
    task_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Orchestrator {
    /// Create and start a new orchestrator
    /// This is a convenience method that creates and immediately runs the orchestrator
    pub async fn start(config: Config) -> Result<()> {
        let mut orchestrator = Self::new(config).await?;
        orchestrator.run().await
    }

    /// Create a new orchestrator instance backed by the configured database
    /// and real HTTP clients
    pub async fn new(config: Config) -> Result<Self> {
        info!("Opening database at {}...", config.database.path.display());
        let database = Arc::new(open_database(&config.database.path, config.database.pool_size).await?);

        let client = Arc::new(ReqwestClient::new(&config.probe.user_agent)?);
        let senders = SenderRegistry::with_defaults(
            reqwest::Client::builder().user_agent(&config.probe.user_agent).build()?,
        );

        Ok(Self::with_components(config, database, client, senders).await)
    }

    /// Wire the service around caller-supplied persistence and transports
    pub async fn with_components(
        config: Config,
        database: Arc<dyn Database>,
        client: Arc<dyn HttpClient>,
        senders: SenderRegistry,
    ) -> Self {
        let config = Arc::new(config);
        let cache = Cache::connect(&config.cache).await;
        let events = EventBus::new();

        let suppressor = Arc::new(DuplicateSuppressor::new(Duration::from_secs(
            config.alerts.suppression_window_seconds,
        )));
        let dispatcher = Arc::new(NotificationDispatcher::new(database.clone(), senders, suppressor));

        let engine = Arc::new(ProbeEngine::new(
            database.clone(),
            client,
            dispatcher.clone(),
            events.clone(),
            cache.clone(),
        ));
        let queue = Arc::new(LocalJobQueue::new(engine.clone(), &config.queue));
        let scheduler = Arc::new(Scheduler::new(queue.clone(), database.clone()));
        let registry = Arc::new(EndpointRegistry::new(database.clone(), scheduler.clone(), events.clone()));
        let stats = Arc::new(StatisticsEngine::new(database.clone(), cache.clone()));

        Self {
            config,
            database,
            cache,
            events,
            dispatcher,
            engine,
            queue,
            scheduler,
            registry,
            stats,
            task_handles: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn engine(&self) -> &Arc<ProbeEngine> {
        &self.engine
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        self.queue.clone()
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<StatisticsEngine> {
        &self.stats
    }

    /// Schedule stored endpoints and start the background sweeps
    pub async fn start_background(&mut self) -> Result<()> {
        let scheduled = self.scheduler.schedule_all_active().await?;
        info!("Found {} active endpoints", scheduled);

        let retention_policy = RetentionPolicy::from(&self.config.retention);
        info!("Retention policy: check results={}d", retention_policy.check_result_days);
        let retention_cleanup = RetentionCleanup::new(self.database.clone(), retention_policy);
        self.task_handles.push(retention_cleanup.start_periodic_cleanup());

        let sweep_every = Duration::from_secs(self.config.alerts.sweep_interval_seconds);
        self.task_handles.push(self.dispatcher.suppressor().spawn_sweeper(sweep_every));

        let status = self.cache.status().await;
        info!(backend = %status.backend, connected = status.connected, "Cache ready");
        Ok(())
    }

    /// Run until Ctrl-C, then stop scheduling and drain background tasks
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting Beacon orchestrator...");
        self.start_background().await?;
        info!("Orchestrator started successfully - probing endpoints");

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }

        info!("Shutdown requested");
        self.shutdown().await;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        self.queue.shutdown().await;
        for handle in self.task_handles.drain(..) {
            handle.abort();
        }
        info!("Orchestrator stopped");
    }
}
