//! API listener.
//!
//! Accepts connections and serves each one as HTTP/1.1 on its own task.

use crate::api::routes;
use crate::state::AppState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// HTTP server for the JSON API and the client page.
pub struct ApiServer {
    listener: TcpListener,
    state: AppState,
}

impl ApiServer {
    /// Bind the listening socket.
    pub async fn bind(address: SocketAddr, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;

        info!(
            listen = %listener.local_addr()?,
            static_dir = ?state.static_files().map(|f| f.root().display().to_string()),
            "api server bound"
        );

        Ok(Self { listener, state })
    }

    /// The bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    ///
    /// Connections already accepted are left to finish on their own tasks.
    #[instrument(skip_all, name = "api_server")]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("api server starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr),
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }

                _ = shutdown.recv() => {
                    info!("api server shutting down");
                    break;
                }
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let state = self.state.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();
            let io = TokioIo::new(stream);

            let service = service_fn(move |req| routes::handle(req, state.clone()));

            let result = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await;

            let duration = start_time.elapsed();
            match result {
                Ok(()) => debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    "connection completed"
                ),
                Err(e) => debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    error = %e,
                    "connection ended with error"
                ),
            }
        });
    }
}
