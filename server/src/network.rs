//! Server network layer: TCP listener and per-connection task spawning

use crate::config::ServerConfig;
use crate::connection::{write_outbound, ConnectionSession, SessionOutcome};
use crate::error::ServerError;
use crate::session_state::SessionState;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Accepts players and runs one game session task per connection
pub struct Server {
    listener: TcpListener,
    state: Arc<SessionState>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            state: Arc::new(SessionState::new(config.max_players)),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(
            "Server started: first to {} points wins, shapes last {}ms",
            self.config.game.max_score,
            self.config.shape_lifetime.as_millis()
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New client connected: {}", addr);
                    self.spawn_session(stream, addr).await;
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Registers the connection and spawns its writer and session tasks
    async fn spawn_session(&self, stream: TcpStream, addr: SocketAddr) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let Some(id) = self.state.register(addr, outbound_tx.clone()).await else {
            warn!("Server full, refusing client {}", addr);
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let (read_half, write_half) = stream.into_split();
        let writer = tokio::spawn(write_outbound(write_half, outbound_rx));

        let session = ConnectionSession::new(
            id,
            addr,
            BufReader::new(read_half),
            outbound_tx,
            Arc::clone(&self.state),
            &self.config,
        );
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            match session.run().await {
                Ok(report) => match report.outcome {
                    SessionOutcome::Won => {
                        info!("Session {} ({}) won with {} points", id, addr, report.final_score)
                    }
                    SessionOutcome::GameOver => {
                        info!("Session {} ({}) ended with {} points", id, addr, report.final_score)
                    }
                    SessionOutcome::Disconnected => {
                        info!("Session {} ({}) left with {} points", id, addr, report.final_score)
                    }
                },
                Err(e) => error!("Error with client {}: {}", addr, e),
            }

            // Dropping the last sender lets the writer flush and close the socket
            state.unregister(id).await;

            match writer.await {
                Ok(Ok(())) => debug!("Connection to {} closed", addr),
                Ok(Err(e)) => debug!("Failed to write to {}: {}", addr, e),
                Err(e) => error!("Writer task for {} failed: {}", addr, e),
            }
        });
    }
}
