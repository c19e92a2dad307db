//! Headless player for trying out a running server.
//!
//! Clicks every green shape after a fixed reaction delay and ignores red
//! ones, printing each server message as it arrives.

use clap::Parser;
use log::{info, warn};
use shared::{ClickEvent, ClientMessage, Color, ServerMessage};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short = 's', long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Delay before clicking a green shape, in milliseconds
    #[clap(short = 'r', long, default_value = "300")]
    reaction_ms: u64,

    /// Also click red shapes
    #[clap(long)]
    click_red: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        match line.parse::<ServerMessage>() {
            Ok(ServerMessage::Shape(shape)) => {
                println!(
                    "Shape: {:?} at ({}, {}) r={}",
                    shape.color, shape.x, shape.y, shape.radius
                );

                let wanted = match shape.color {
                    Color::Green => true,
                    Color::Red => args.click_red,
                    Color::Other(_) => false,
                };
                if !wanted {
                    continue;
                }

                sleep(Duration::from_millis(args.reaction_ms)).await;
                let click = ClientMessage::Click(ClickEvent {
                    color: shape.color.rgb(),
                });
                write_half.write_all(format!("{}\n", click).as_bytes()).await?;
            }
            Ok(ServerMessage::Score(score)) => println!("Score: {}", score),
            Ok(ServerMessage::GameOver) => {
                println!("Game over!");
                break;
            }
            Err(e) => warn!("Unexpected message {:?}: {}", line, e),
        }
    }

    info!("Test client finished");
    Ok(())
}
