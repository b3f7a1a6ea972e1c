//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::OrchestratorError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::reconciler;

/// Run the orchestrator
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OrchestratorError> {
    info!("Initializing stagehand orchestrator...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(options.lifecycle.clone());

    // Initialize the app state; the workers hold their own handles to it
    let _app_state = match init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start orchestrator: {}", e);
            shutdown_manager.shutdown(&shutdown_tx).await?;
            return Err(e);
        }
    };

    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    shutdown_manager.shutdown(&shutdown_tx).await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, OrchestratorError> {
    let app_state = Arc::new(AppState::init(options).await?);

    if options.enable_reconciler {
        init_reconciler_worker(
            options.reconciler.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    if options.enable_server {
        init_socket_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(app_state)
}

fn init_reconciler_worker(
    options: reconciler::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), OrchestratorError> {
    info!("Initializing reconciler worker...");

    let manager = app_state.manager.clone();
    let rollback_manager = app_state.rollback_manager.clone();
    let monitor = app_state.monitor.clone();

    let reconciler_handle = tokio::spawn(async move {
        reconciler::run(
            &options,
            manager,
            rollback_manager,
            monitor,
            |wait| tokio::time::sleep(wait),
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_reconciler_worker_handle(reconciler_handle)?;
    Ok(())
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), OrchestratorError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(app_state.collector.clone(), app_state.monitor.clone());

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    lifecycle_options: LifecycleOptions,
    socket_server_handle: Option<JoinHandle<Result<(), OrchestratorError>>>,
    reconciler_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(lifecycle_options: LifecycleOptions) -> Self {
        Self {
            lifecycle_options,
            socket_server_handle: None,
            reconciler_worker_handle: None,
        }
    }

    pub fn with_reconciler_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), OrchestratorError> {
        if self.reconciler_worker_handle.is_some() {
            return Err(OrchestratorError::ShutdownError(
                "reconciler_handle already set".to_string(),
            ));
        }
        self.reconciler_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), OrchestratorError>>,
    ) -> Result<(), OrchestratorError> {
        if self.socket_server_handle.is_some() {
            return Err(OrchestratorError::ShutdownError(
                "server_handle already set".to_string(),
            ));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(
        &mut self,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Result<(), OrchestratorError> {
        let _ = shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), OrchestratorError> {
        info!("Shutting down stagehand orchestrator...");

        // 1. Reconciler worker
        if let Some(handle) = self.reconciler_worker_handle.take() {
            handle
                .await
                .map_err(|e| OrchestratorError::ShutdownError(e.to_string()))?;
        }

        // 2. Socket server
        if let Some(handle) = self.socket_server_handle.take() {
            handle
                .await
                .map_err(|e| OrchestratorError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
