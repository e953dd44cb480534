//! HTTP server assembly for Conduit

mod health;
mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use conduit_config::Config;
use conduit_llm::Orchestrator;
use conduit_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::rate_limit::RateLimitState;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    orchestrator: Orchestrator,
    shutdown: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// Runs one discovery pass before returning and starts the discovery
    /// and retraining loops.
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator or the rate limiter cannot be
    /// built from the configuration
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let orchestrator = Orchestrator::from_config(&config)?;
        orchestrator.discover().await;

        let shutdown = CancellationToken::new();
        let background = orchestrator.start_background(&shutdown);

        let mut app = Router::new();

        // Health check
        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        app = app.merge(conduit_llm::llm_router(orchestrator.clone()));

        // Tracing
        app = app.layer(TraceLayer::new_for_http());

        // Rate limiting
        if let Some(ref rl_config) = config.server.rate_limit {
            let state = RateLimitState {
                limiter: Arc::new(conduit_ratelimit::create_request_limiter(rl_config)?),
                metrics: Metrics::new(),
            };
            app = app.layer(axum::middleware::from_fn(move |req, next| {
                let state = state.clone();
                async move { rate_limit::rate_limit_middleware(state, req, next).await }
            }));
        }

        Ok(Self {
            router: app,
            listen_address,
            orchestrator,
            shutdown,
            background,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Handle to the routing core behind the endpoints
    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Consume the server and return the inner router
    ///
    /// Background loops keep running until the returned token is cancelled.
    #[must_use]
    pub fn into_router(self) -> (Router, CancellationToken) {
        (self.router, self.shutdown)
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered, then stops the
    /// background loops.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let background_shutdown = self.shutdown.clone();
        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("graceful shutdown initiated");
        })
        .await?;

        background_shutdown.cancel();
        for handle in self.background {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        Ok(())
    }
}
