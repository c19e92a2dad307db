//! # Shape Rush Game Server
//!
//! This library implements the authoritative server for a multiplayer reflex
//! game. Every connected player is shown a stream of green and red circles,
//! clicks them, and gains or loses points. The first player to reach the
//! winning score ends the game for everyone.
//!
//! ## Core Responsibilities
//!
//! ### Per-Connection Game Loop
//! Each player runs an independent loop: announce a shape, wait up to one
//! shape lifetime for a click, update the score. Players never wait on each
//! other and shape cadence differs per connection.
//!
//! ### Game-Over Coordination
//! Exactly one session may declare the game over. The declaration is an
//! atomic compare-and-set on a shared flag, so two players crossing the
//! threshold at the same instant still produce a single winner and a single
//! broadcast.
//!
//! ### Broadcasting
//! The winner pushes `GAME_OVER` to every registered connection. Sessions
//! blocked in a read notice the flag once their current wait ends and then
//! send their own final notice.
//!
//! ## Architecture Design
//!
//! ### One Task Per Connection
//! The accept loop spawns a session task and a writer task for every
//! connection. The session task owns the read half and the score. The
//! writer task owns the write half and drains an unbounded queue, which both
//! the session and the broadcaster feed.
//!
//! ### Explicit Shared State
//! [`session_state::SessionState`] is created once and passed to every
//! session in an `Arc`. It holds the active session set (behind a lock) and
//! the game-over flag (an atomic). Nothing else is shared.
//!
//! ### Text Protocol
//! Messages are single lines over TCP:
//! - `SHAPE <r> <g> <b> <x> <y> <radius>` server to client
//! - `SCORE <n>` server to client
//! - `GAME_OVER` server to client
//! - `CLICK <r> <g> <b>` client to server
//!
//! ## Module Organization
//!
//! - `config`: listener address, shape lifetime, capacity and game rules
//! - `connection`: the per-connection state machine and outbound writer
//! - `error`: server-wide and per-session error types
//! - `network`: TCP listener and task spawning
//! - `session_state`: active sessions, game-over flag and broadcast
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod network;
pub mod session_state;
