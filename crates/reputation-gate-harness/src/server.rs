// crates/reputation-gate-harness/src/server.rs
// ============================================================================
// Module: Stub Server Thread
// Description: Background HTTP server plumbing shared by store stand-ins.
// Purpose: Bind synchronously, serve on a dedicated runtime, stop on demand.
// Dependencies: axum, tokio
// ============================================================================

//! ## Overview
//! Stub servers bind their socket on the caller's thread so bind failures
//! surface immediately, then serve on a dedicated thread with its own tokio
//! runtime. Shutdown is broadcast on a watch channel that both the accept
//! loop and long-running handlers observe.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use std::thread;

use axum::Router;
use tokio::runtime::Builder;
use tokio::sync::watch;

use crate::error::HarnessError;

// ============================================================================
// SECTION: Shutdown Signal
// ============================================================================

/// Receiver side of a stub server's shutdown broadcast.
#[derive(Clone)]
pub struct ShutdownSignal {
    /// Watch receiver flipped to `true` on stop.
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been requested.
    pub async fn requested(mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

// ============================================================================
// SECTION: Server Thread
// ============================================================================

/// Handle for a stub server running on its own thread.
pub struct ServerThread {
    /// Bound local address.
    addr: SocketAddr,
    /// Shutdown broadcast sender.
    shutdown: watch::Sender<bool>,
    /// Serving thread, taken on join.
    join: Option<thread::JoinHandle<()>>,
}

impl ServerThread {
    /// Returns the bound local address.
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Requests shutdown and joins the serving thread.
    pub fn stop(&mut self) -> Result<(), HarnessError> {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            join.join().map_err(|_| HarnessError::ServerThread("server thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for ServerThread {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Binds `bind` and serves the router built by `app` on a dedicated thread.
///
/// # Errors
///
/// Returns [`HarnessError::Bind`] when the socket cannot be bound, and
/// [`HarnessError::ServerThread`] when the serving thread cannot be spawned.
pub fn spawn_server<F>(name: &str, bind: SocketAddr, app: F) -> Result<ServerThread, HarnessError>
where
    F: FnOnce(ShutdownSignal) -> Router + Send + 'static,
{
    let listener = StdTcpListener::bind(bind).map_err(|source| HarnessError::Bind {
        addr: bind,
        source,
    })?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = ShutdownSignal {
        rx: shutdown_rx,
    };
    let thread_name = name.to_string();
    let join = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let runtime = match Builder::new_multi_thread().worker_threads(2).enable_all().build()
            {
                Ok(runtime) => runtime,
                Err(error) => {
                    tracing::error!(server = %thread_name, %error, "stub runtime build failed");
                    return;
                }
            };
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(error) => {
                        tracing::error!(server = %thread_name, %error, "stub listener adopt failed");
                        return;
                    }
                };
                let app = app(signal.clone());
                let server = axum::serve(listener, app).with_graceful_shutdown(signal.requested());
                if let Err(error) = server.await {
                    tracing::error!(server = %thread_name, %error, "stub server failed");
                }
            });
        })
        .map_err(|err| HarnessError::ServerThread(format!("spawn {name} failed: {err}")))?;
    tracing::debug!(server = name, %addr, "stub server listening");
    Ok(ServerThread {
        addr,
        shutdown: shutdown_tx,
        join: Some(join),
    })
}
