use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::GameConfig;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then runs the accept loop until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "12345")]
        port: u16,
        /// Milliseconds a shape stays clickable
        #[clap(short = 't', long, default_value = "2000")]
        shape_lifetime_ms: u64,
        /// Score that wins the game
        #[clap(short, long, default_value = "50")]
        max_score: i32,
        /// Maximum number of simultaneous players
        #[clap(long, default_value = "64")]
        max_players: usize,
        /// Canvas width
        #[clap(long, default_value = "800")]
        width: i32,
        /// Canvas height
        #[clap(long, default_value = "600")]
        height: i32,
        /// Smallest shape radius
        #[clap(long, default_value = "30")]
        min_radius: i32,
        /// Largest shape radius
        #[clap(long, default_value = "50")]
        max_radius: i32,
        /// Points won for green and lost for red
        #[clap(long, default_value = "10")]
        score_delta: i32,
    }

    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        shape_lifetime: Duration::from_millis(args.shape_lifetime_ms),
        max_players: args.max_players,
        game: GameConfig {
            canvas_width: args.width,
            canvas_height: args.height,
            min_radius: args.min_radius,
            max_radius: args.max_radius,
            max_score: args.max_score,
            score_delta: args.score_delta,
        },
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    };

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
