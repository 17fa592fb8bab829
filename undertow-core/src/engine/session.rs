//! Explicitly owned engine session.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::types::SessionSettings;
use super::{EngineError, TransferEngine, spawn_simulated_engine};
use crate::config::UndertowConfig;

/// Owns an engine for the lifetime of a service.
///
/// Settings are applied once at creation. Call [`EngineSession::shutdown`]
/// to stop the engine; dropping an open session schedules a shutdown on the
/// current runtime as a last resort.
pub struct EngineSession {
    engine: Arc<dyn TransferEngine>,
    closed: AtomicBool,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("engine", &self.engine)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EngineSession {
    /// Wraps `engine` and applies session settings derived from `config`.
    ///
    /// # Errors
    /// - `EngineError::SessionClosed` - Engine stopped before settings applied
    pub async fn open(
        engine: Arc<dyn TransferEngine>,
        config: &UndertowConfig,
    ) -> Result<Self, EngineError> {
        let settings = SessionSettings::from_config(config);
        debug!(
            "Applying session settings: ports {:?}, {} connections",
            settings.listen_ports, settings.connections_limit
        );
        engine.apply_settings(settings).await?;
        info!("Engine session opened");

        Ok(Self {
            engine,
            closed: AtomicBool::new(false),
        })
    }

    /// Opens a session on a fresh simulated engine.
    pub async fn simulated(config: &UndertowConfig) -> Result<Self, EngineError> {
        let engine = spawn_simulated_engine(config.simulation.clone());
        Self::open(Arc::new(engine), config).await
    }

    pub fn engine(&self) -> Arc<dyn TransferEngine> {
        self.engine.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops the engine. Idempotent.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Engine session closing");
        self.engine.shutdown().await
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!("Engine session dropped without shutdown");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let engine = self.engine.clone();
            runtime.spawn(async move {
                let _ = engine.shutdown().await;
            });
        }
    }
}

/// Runs `f` against a session opened on `engine`, shutting it down on every
/// exit path including errors returned by `f`.
pub async fn with_session<F, Fut, T>(
    engine: Arc<dyn TransferEngine>,
    config: &UndertowConfig,
    f: F,
) -> Result<T, EngineError>
where
    F: FnOnce(Arc<dyn TransferEngine>) -> Fut,
    Fut: Future<Output = T>,
{
    let session = EngineSession::open(engine, config).await?;
    let output = f(session.engine()).await;
    if let Err(e) = session.shutdown().await {
        warn!("Engine shutdown failed: {}", e);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;

    fn simulated() -> (SimulatedEngine, Arc<dyn TransferEngine>) {
        let engine = spawn_simulated_engine(UndertowConfig::for_testing().simulation);
        (engine.clone(), Arc::new(engine))
    }

    #[tokio::test]
    async fn test_open_applies_settings_once() {
        let config = UndertowConfig::for_testing();
        let (handle, engine) = simulated();
        let session = EngineSession::open(engine, &config).await.unwrap();

        let snapshot = handle.inspect().await.unwrap();
        assert_eq!(snapshot.settings, Some(SessionSettings::from_config(&config)));

        session.shutdown().await.unwrap();
        session.shutdown().await.unwrap();
        assert!(session.is_closed());
        assert!(matches!(
            handle.torrents().await,
            Err(EngineError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_with_session_releases_on_error_path() {
        let config = UndertowConfig::for_testing();
        let (handle, engine) = simulated();

        let result: Result<Result<(), &str>, _> =
            with_session(engine, &config, |_engine| async { Err("boom") }).await;
        assert_eq!(result.unwrap(), Err("boom"));
        assert!(matches!(
            handle.torrents().await,
            Err(EngineError::SessionClosed)
        ));
    }
}
