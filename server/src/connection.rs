//! Per-connection game loop
//!
//! Each connected player gets one [`ConnectionSession`] running in its own
//! task. A round is: announce a shape, wait up to one shape lifetime for a
//! click, score it. The loop ends when the shared game-over flag is set or
//! the player's own score reaches the winning threshold.
//!
//! Outgoing lines go through an unbounded channel drained by
//! [`write_outbound`], so game-over broadcasts from other sessions reach the
//! socket even while this session is blocked waiting for a click.

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::session_state::{SessionId, SessionState};
use log::{debug, info, warn};
use shared::{
    ClickEvent, ClientMessage, Color, ProtocolError, ScoreTracker, ServerMessage, ShapeGenerator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How a session left its game loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// This session crossed the threshold first and declared game over
    Won,
    /// The game ended, either by another winner or after losing the race
    GameOver,
    /// The peer closed the connection mid-game
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub id: SessionId,
    pub outcome: SessionOutcome,
    pub final_score: i32,
}

/// Result of waiting for one click
#[derive(Debug)]
enum Response {
    Expired,
    Click(ClickEvent),
    Malformed { line: String, error: ProtocolError },
    Closed,
}

pub struct ConnectionSession<R> {
    id: SessionId,
    peer: SocketAddr,
    lines: Lines<R>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    state: Arc<SessionState>,
    generator: ShapeGenerator,
    score: ScoreTracker,
    shape_lifetime: Duration,
    max_score: i32,
}

impl<R: AsyncBufRead + Unpin> ConnectionSession<R> {
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        reader: R,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        state: Arc<SessionState>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            id,
            peer,
            lines: reader.lines(),
            outbound,
            state,
            generator: ShapeGenerator::new(&config.game),
            score: ScoreTracker::new(config.game.score_delta),
            shape_lifetime: config.shape_lifetime,
            max_score: config.game.max_score,
        }
    }

    /// Replaces the shape generator, e.g. with a seeded one
    pub fn with_generator(mut self, generator: ShapeGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn score(&self) -> i32 {
        self.score.score()
    }

    /// Runs the game loop until game over or disconnect
    ///
    /// Send and receive failures end this session only and are returned as
    /// errors; no step is retried. On every exit, including the peer closing
    /// its side, a final `GAME_OVER` is queued for this connection even if a
    /// broadcast already delivered one.
    pub async fn run(mut self) -> Result<SessionReport, SessionError> {
        let mut outcome = SessionOutcome::GameOver;

        while !self.state.is_game_over() && !self.score.has_reached(self.max_score) {
            let shape = self.generator.generate();
            self.send(ServerMessage::Shape(shape))?;
            debug!("Sent shape to {}: {:?}", self.peer, shape);

            match self.await_response().await? {
                Response::Expired => {
                    debug!("Client {} did not click in time", self.peer);
                }
                Response::Click(click) => {
                    let score = self.score.apply(Color::from(click.color));
                    self.send(ServerMessage::Score(score))?;
                    debug!("Updated score for {}: {}", self.peer, score);
                }
                Response::Malformed { line, error } => {
                    warn!(
                        "Ignoring malformed message from {}: {:?} ({})",
                        self.peer, line, error
                    );
                }
                Response::Closed => {
                    info!("Client {} disconnected", self.peer);
                    // A half-closed peer can still read; a fully closed one just drops it
                    let _ = self.send(ServerMessage::GameOver);
                    return Ok(self.report(SessionOutcome::Disconnected));
                }
            }

            if !self.state.is_game_over()
                && self.score.has_reached(self.max_score)
                && self.state.try_declare_game_over()
            {
                info!("Client {} won the game with {} points", self.peer, self.score());
                outcome = SessionOutcome::Won;
                self.state.broadcast_game_over().await;
            }
        }

        self.send(ServerMessage::GameOver)?;
        info!("Client {} finished the game with {} points", self.peer, self.score());
        Ok(self.report(outcome))
    }

    /// Waits up to one shape lifetime for the next line from the client
    async fn await_response(&mut self) -> Result<Response, SessionError> {
        // Lines::next_line is cancel safe, so a timeout never drops a partial line
        let line = match timeout(self.shape_lifetime, self.lines.next_line()).await {
            Err(_) => return Ok(Response::Expired),
            Ok(result) => result?,
        };

        let Some(line) = line else {
            return Ok(Response::Closed);
        };

        Ok(match line.parse::<ClientMessage>() {
            Ok(ClientMessage::Click(click)) => Response::Click(click),
            Err(error) => Response::Malformed { line, error },
        })
    }

    fn send(&self, message: ServerMessage) -> Result<(), SessionError> {
        self.outbound
            .send(message)
            .map_err(|_| SessionError::OutboundClosed)
    }

    fn report(&self, outcome: SessionOutcome) -> SessionReport {
        SessionReport {
            id: self.id,
            outcome,
            final_score: self.score(),
        }
    }
}

/// Writes queued messages to the connection, one per line
///
/// Finishes once every sender for the queue is dropped, then shuts down the
/// write side. Stops at the first I/O error, which in turn makes further
/// sends on the queue fail.
pub async fn write_outbound<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) -> std::io::Result<()> {
    while let Some(message) = outbound.recv().await {
        let line = format!("{}\n", message);
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }

    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameConfig, Rgb, Shape};
    use tokio::io::{duplex, BufReader};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    fn test_config(shape_lifetime: Duration, max_score: i32) -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            shape_lifetime,
            max_players: 8,
            game: GameConfig {
                max_score,
                ..GameConfig::default()
            },
        }
    }

    /// Registers a session and returns it together with its outbound queue
    async fn registered_session<R: AsyncBufRead + Unpin>(
        state: &Arc<SessionState>,
        reader: R,
        config: &ServerConfig,
    ) -> (ConnectionSession<R>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.register(test_addr(), tx.clone()).await.unwrap();
        let session =
            ConnectionSession::new(id, test_addr(), reader, tx, Arc::clone(state), config);
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn is_shape(message: &ServerMessage) -> bool {
        matches!(message, ServerMessage::Shape(_))
    }

    #[tokio::test]
    async fn test_five_green_clicks_win() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 50);
        let reader = Builder::new()
            .read(b"CLICK 0 255 0\n")
            .read(b"CLICK 0 255 0\n")
            .read(b"CLICK 0 255 0\n")
            .read(b"CLICK 0 255 0\n")
            .read(b"CLICK 0 255 0\n")
            .build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        let report = session.run().await.unwrap();
        assert_eq!(report.outcome, SessionOutcome::Won);
        assert_eq!(report.final_score, 50);
        assert!(state.is_game_over());

        let messages = drain(&mut rx);
        let scores: Vec<i32> = messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Score(score) => Some(*score),
                _ => None,
            })
            .collect();
        assert_eq!(scores, vec![10, 20, 30, 40, 50]);
        assert_eq!(messages.iter().filter(|m| is_shape(m)).count(), 5);

        // Broadcast notice followed by the session's own final notice
        assert_eq!(
            &messages[messages.len() - 2..],
            &[ServerMessage::GameOver, ServerMessage::GameOver]
        );
    }

    #[tokio::test]
    async fn test_shape_precedes_score_each_round() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 20);
        let reader = Builder::new()
            .read(b"CLICK 0 255 0\n")
            .read(b"CLICK 0 255 0\n")
            .build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        session.run().await.unwrap();

        let messages = drain(&mut rx);
        assert!(is_shape(&messages[0]));
        assert_eq!(messages[1], ServerMessage::Score(10));
        assert!(is_shape(&messages[2]));
        assert_eq!(messages[3], ServerMessage::Score(20));
    }

    #[tokio::test]
    async fn test_red_click_below_zero() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 50);
        let reader = Builder::new().read(b"CLICK 255 0 0\n").build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        let report = session.run().await.unwrap();
        assert_eq!(report.outcome, SessionOutcome::Disconnected);
        assert_eq!(report.final_score, -10);

        let messages = drain(&mut rx);
        assert!(messages.contains(&ServerMessage::Score(-10)));
        assert!(!state.is_game_over());
    }

    #[tokio::test]
    async fn test_malformed_click_is_ignored() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 50);
        let reader = Builder::new()
            .read(b"CLICK abc\n")
            .read(b"HELLO\n")
            .read(b"CLICK 0 255 0\n")
            .build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        let report = session.run().await.unwrap();
        assert_eq!(report.final_score, 10);

        let messages = drain(&mut rx);
        // Two ignored rounds, one scored round, one round cut short by EOF
        assert_eq!(messages.iter().filter(|m| is_shape(m)).count(), 4);
        assert_eq!(
            messages.iter().filter(|m| !is_shape(m)).collect::<Vec<_>>(),
            vec![&ServerMessage::Score(10), &ServerMessage::GameOver]
        );
    }

    #[tokio::test]
    async fn test_other_color_sends_unchanged_score() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 50);
        let reader = Builder::new().read(b"CLICK 0 0 255\n").build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        let report = session.run().await.unwrap();
        assert_eq!(report.final_score, 0);
        assert!(drain(&mut rx).contains(&ServerMessage::Score(0)));
    }

    #[tokio::test]
    async fn test_timeout_forfeits_shape() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_millis(20), 50);
        let reader = Builder::new()
            .wait(Duration::from_millis(150))
            .read(b"CLICK 0 255 0\n")
            .build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        let report = session.run().await.unwrap();
        assert_eq!(report.final_score, 10);

        let messages = drain(&mut rx);
        let first_score = messages
            .iter()
            .position(|m| *m == ServerMessage::Score(10))
            .unwrap();

        // Expired rounds produce a new shape and nothing else
        assert!(first_score >= 2);
        assert!(messages[..first_score].iter().all(is_shape));
    }

    #[tokio::test]
    async fn test_disconnect_still_sends_final_notice() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 50);
        let reader = Builder::new().build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        let report = session.run().await.unwrap();
        assert_eq!(report.outcome, SessionOutcome::Disconnected);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 2);
        assert!(is_shape(&messages[0]));
        assert_eq!(messages[1], ServerMessage::GameOver);
        assert!(!state.is_game_over());
    }

    #[tokio::test]
    async fn test_late_joiner_gets_game_over_immediately() {
        let state = Arc::new(SessionState::new(8));
        assert!(state.try_declare_game_over());

        let config = test_config(Duration::from_secs(5), 50);
        let reader = Builder::new().build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;

        let report = session.run().await.unwrap();
        assert_eq!(report.outcome, SessionOutcome::GameOver);
        assert_eq!(drain(&mut rx), vec![ServerMessage::GameOver]);
    }

    #[tokio::test]
    async fn test_closed_outbound_ends_session() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 50);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let session = ConnectionSession::new(
            1,
            test_addr(),
            BufReader::new(Builder::new().build()),
            tx,
            Arc::clone(&state),
            &config,
        );

        assert!(matches!(
            session.run().await,
            Err(SessionError::OutboundClosed)
        ));
    }

    #[tokio::test]
    async fn test_waiting_session_notices_game_over() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_millis(50), 50);

        // The client end stays open and silent for the whole test
        let (_client, server_end) = duplex(1024);
        let (session, mut rx) =
            registered_session(&state, BufReader::new(server_end), &config).await;
        let task = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(state.try_declare_game_over());
        state.broadcast_game_over().await;

        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome, SessionOutcome::GameOver);
        assert_eq!(report.final_score, 0);

        let messages = drain(&mut rx);
        assert_eq!(messages.last(), Some(&ServerMessage::GameOver));
        assert_eq!(
            messages
                .iter()
                .filter(|m| **m == ServerMessage::GameOver)
                .count(),
            2
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_winners_single_declaration() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 30);

        let mut tasks = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..2 {
            // The loser may stop before reading all of its clicks
            let reader: &'static [u8] = b"CLICK 0 255 0\nCLICK 0 255 0\nCLICK 0 255 0\n";
            let (session, rx) = registered_session(&state, reader, &config).await;
            receivers.push(rx);
            tasks.push(tokio::spawn(session.run()));
        }

        let mut winners = 0;
        for task in tasks {
            let report = task.await.unwrap().unwrap();
            if report.outcome == SessionOutcome::Won {
                winners += 1;
            } else {
                assert_eq!(report.outcome, SessionOutcome::GameOver);
            }
        }
        assert_eq!(winners, 1);

        for rx in receivers.iter_mut() {
            assert_eq!(drain(rx).last(), Some(&ServerMessage::GameOver));
        }
    }

    #[tokio::test]
    async fn test_seeded_generator_controls_shapes() {
        let state = Arc::new(SessionState::new(8));
        let config = test_config(Duration::from_secs(5), 50);
        let reader = Builder::new().build();
        let (session, mut rx) = registered_session(&state, BufReader::new(reader), &config).await;
        let session = session.with_generator(ShapeGenerator::seeded(&config.game, 5));

        session.run().await.unwrap();

        let expected = ShapeGenerator::seeded(&config.game, 5).generate();
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::Shape(expected), ServerMessage::GameOver]
        );
    }

    #[tokio::test]
    async fn test_write_outbound_emits_lines() {
        let (tx, rx) = mpsc::unbounded_channel();
        let shape = Shape {
            color: Color::from(Rgb::GREEN),
            x: 100,
            y: 200,
            radius: 40,
        };
        tx.send(ServerMessage::Shape(shape)).unwrap();
        tx.send(ServerMessage::Score(10)).unwrap();
        tx.send(ServerMessage::GameOver).unwrap();
        drop(tx);

        let writer = Builder::new()
            .write(b"SHAPE 0 255 0 100 200 40\n")
            .write(b"SCORE 10\n")
            .write(b"GAME_OVER\n")
            .build();

        write_outbound(writer, rx).await.unwrap();
    }
}
