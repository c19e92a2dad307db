//! Game rules and wire protocol shared by the server and its clients.
//!
//! Nothing in here performs I/O: shapes are generated from a caller-owned
//! RNG, scores are plain integers and messages are converted to and from
//! single text lines.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SCREEN_WIDTH: i32 = 800;
pub const SCREEN_HEIGHT: i32 = 600;
pub const MIN_RADIUS: i32 = 30;
pub const MAX_RADIUS: i32 = 50;
pub const MAX_SCORE: i32 = 50;
pub const SCORE_DELTA: i32 = 10;

/// Raw color triple as it appears on the wire.
///
/// Components are kept as `i32` because clients may report anything,
/// including values outside `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: i32,
    pub g: i32,
    pub b: i32,
}

impl Rgb {
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: i32, g: i32, b: i32) -> Self {
        Self { r, g, b }
    }
}

/// Scoring category of a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Green,
    Red,
    Other(Rgb),
}

impl Color {
    pub fn rgb(self) -> Rgb {
        match self {
            Color::Green => Rgb::GREEN,
            Color::Red => Rgb::RED,
            Color::Other(rgb) => rgb,
        }
    }
}

impl From<Rgb> for Color {
    fn from(rgb: Rgb) -> Self {
        if rgb == Rgb::GREEN {
            Color::Green
        } else if rgb == Rgb::RED {
            Color::Red
        } else {
            Color::Other(rgb)
        }
    }
}

/// A circle announced to one player for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub color: Color,
    pub x: i32,
    pub y: i32,
    pub radius: i32,
}

impl Shape {
    /// True if the whole circle lies inside a `width` x `height` canvas.
    pub fn is_on_canvas(&self, width: i32, height: i32) -> bool {
        self.radius > 0
            && self.x - self.radius >= 0
            && self.x + self.radius <= width
            && self.y - self.radius >= 0
            && self.y + self.radius <= height
    }
}

/// A click reported by a client. Only the reported color matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub color: Rgb,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("radius range {min}..={max} is invalid")]
    InvalidRadius { min: i32, max: i32 },
    #[error("canvas {width}x{height} cannot fit a shape of radius {radius}")]
    CanvasTooSmall { width: i32, height: i32, radius: i32 },
    #[error("winning score must be positive, got {0}")]
    InvalidMaxScore(i32),
    #[error("score delta must be positive, got {0}")]
    InvalidScoreDelta(i32),
}

/// Tunable rules of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub canvas_width: i32,
    pub canvas_height: i32,
    pub min_radius: i32,
    pub max_radius: i32,
    /// Score a player must reach to win the game for everyone.
    pub max_score: i32,
    /// Points gained for a green click and lost for a red one.
    pub score_delta: i32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            canvas_width: SCREEN_WIDTH,
            canvas_height: SCREEN_HEIGHT,
            min_radius: MIN_RADIUS,
            max_radius: MAX_RADIUS,
            max_score: MAX_SCORE,
            score_delta: SCORE_DELTA,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_radius <= 0 || self.min_radius > self.max_radius {
            return Err(ConfigError::InvalidRadius {
                min: self.min_radius,
                max: self.max_radius,
            });
        }
        if self.max_radius > self.canvas_width / 2 || self.max_radius > self.canvas_height / 2 {
            return Err(ConfigError::CanvasTooSmall {
                width: self.canvas_width,
                height: self.canvas_height,
                radius: self.max_radius,
            });
        }
        if self.max_score <= 0 {
            return Err(ConfigError::InvalidMaxScore(self.max_score));
        }
        if self.score_delta <= 0 {
            return Err(ConfigError::InvalidScoreDelta(self.score_delta));
        }
        Ok(())
    }
}

/// Produces random green or red circles that fit fully on the canvas.
///
/// Every session owns its own generator, so no RNG state is shared
/// between connections.
pub struct ShapeGenerator<R = StdRng> {
    rng: R,
    width: i32,
    height: i32,
    min_radius: i32,
    max_radius: i32,
}

impl ShapeGenerator<StdRng> {
    pub fn new(config: &GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: &GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ShapeGenerator<R> {
    pub fn with_rng(config: &GameConfig, rng: R) -> Self {
        Self {
            rng,
            width: config.canvas_width,
            height: config.canvas_height,
            min_radius: config.min_radius,
            max_radius: config.max_radius.max(config.min_radius),
        }
    }

    pub fn generate(&mut self) -> Shape {
        let color = if self.rng.gen_bool(0.5) {
            Color::Green
        } else {
            Color::Red
        };

        let radius = self.rng.gen_range(self.min_radius..=self.max_radius);
        // Keep the ranges non-empty even for a canvas that failed validation
        let x = self
            .rng
            .gen_range(radius..=(self.width - radius).max(radius));
        let y = self
            .rng
            .gen_range(radius..=(self.height - radius).max(radius));

        Shape {
            color,
            x,
            y,
            radius,
        }
    }
}

/// Applies one click to a score using the default delta.
pub fn apply_click(score: i32, color: Color) -> i32 {
    apply_click_with_delta(score, color, SCORE_DELTA)
}

/// Green adds `delta`, red subtracts it, anything else leaves the score
/// alone. There is no floor at zero.
pub fn apply_click_with_delta(score: i32, color: Color, delta: i32) -> i32 {
    match color {
        Color::Green => score.saturating_add(delta),
        Color::Red => score.saturating_sub(delta),
        Color::Other(_) => score,
    }
}

/// Score of a single player.
#[derive(Debug, Clone)]
pub struct ScoreTracker {
    score: i32,
    delta: i32,
}

impl ScoreTracker {
    pub fn new(delta: i32) -> Self {
        Self { score: 0, delta }
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    /// Applies a click and returns the new score.
    pub fn apply(&mut self, color: Color) -> i32 {
        self.score = apply_click_with_delta(self.score, color, self.delta);
        self.score
    }

    pub fn has_reached(&self, max_score: i32) -> bool {
        self.score >= max_score
    }
}

impl Default for ScoreTracker {
    fn default() -> Self {
        Self::new(SCORE_DELTA)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("{command} expects {expected} fields, got {found}")]
    WrongArity {
        command: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("field `{field}` is not an integer: `{value}`")]
    InvalidNumber { field: &'static str, value: String },
}

/// Messages sent from the server to a player, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    Shape(Shape),
    Score(i32),
    GameOver,
}

/// Messages sent from a player to the server, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    Click(ClickEvent),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Shape(shape) => {
                let rgb = shape.color.rgb();
                write!(
                    f,
                    "SHAPE {} {} {} {} {} {}",
                    rgb.r, rgb.g, rgb.b, shape.x, shape.y, shape.radius
                )
            }
            ServerMessage::Score(score) => write!(f, "SCORE {}", score),
            ServerMessage::GameOver => f.write_str("GAME_OVER"),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Click(click) => {
                write!(f, "CLICK {} {} {}", click.color.r, click.color.g, click.color.b)
            }
        }
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<i32, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Splits a line on single spaces
///
/// A trailing `\r` and trailing empty fields are dropped. Any other empty
/// field is kept, so doubled or leading spaces make the line malformed.
fn split_fields(line: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = line.trim_end_matches('\r').split(' ').collect();
    while parts.last() == Some(&"") {
        parts.pop();
    }
    parts
}

fn expect_arity(
    command: &'static str,
    parts: &[&str],
    expected: usize,
) -> Result<(), ProtocolError> {
    if parts.len() != expected {
        return Err(ProtocolError::WrongArity {
            command,
            expected,
            found: parts.len(),
        });
    }
    Ok(())
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts = split_fields(line);
        match parts.as_slice() {
            [] => Err(ProtocolError::Empty),
            ["CLICK", ..] => {
                expect_arity("CLICK", &parts, 4)?;
                let color = Rgb::new(
                    parse_field("r", parts[1])?,
                    parse_field("g", parts[2])?,
                    parse_field("b", parts[3])?,
                );
                Ok(ClientMessage::Click(ClickEvent { color }))
            }
            [other, ..] => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts = split_fields(line);
        match parts.as_slice() {
            [] => Err(ProtocolError::Empty),
            ["SHAPE", ..] => {
                expect_arity("SHAPE", &parts, 7)?;
                let rgb = Rgb::new(
                    parse_field("r", parts[1])?,
                    parse_field("g", parts[2])?,
                    parse_field("b", parts[3])?,
                );
                Ok(ServerMessage::Shape(Shape {
                    color: Color::from(rgb),
                    x: parse_field("x", parts[4])?,
                    y: parse_field("y", parts[5])?,
                    radius: parse_field("radius", parts[6])?,
                }))
            }
            ["SCORE", ..] => {
                expect_arity("SCORE", &parts, 2)?;
                Ok(ServerMessage::Score(parse_field("score", parts[1])?))
            }
            ["GAME_OVER", ..] => {
                expect_arity("GAME_OVER", &parts, 1)?;
                Ok(ServerMessage::GameOver)
            }
            [other, ..] => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}
