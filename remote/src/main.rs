use clap::Parser;
use log::{error, info};
use remote::network::{LeaveReason, RemoteClient};
use shared::{
    AddressResolver, HttpAddressResolver, HttpRegistry, Matchmaker, NetplayConfig, NetplayError,
    Registry, TransportMode,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Join a Pong Force match", long_about = None)]
struct Args {
    /// Room code from the host
    #[arg(required_unless_present = "host_addr")]
    code: Option<String>,

    /// Connect straight to a host started with --offline, skipping the registry
    #[arg(long)]
    host_addr: Option<SocketAddr>,

    /// Name shown to the other player
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// TOML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Matchmaking service base URL
    #[arg(short = 'r', long)]
    registry_url: Option<String>,

    /// direct or relay
    #[arg(short = 't', long)]
    transport: Option<TransportMode>,

    /// Frames per second for input sampling
    #[arg(long)]
    tick_rate: Option<u32>,
}

impl Args {
    fn apply(&self, config: &mut NetplayConfig) {
        if let Some(url) = &self.registry_url {
            config.registry_url = url.clone();
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
    }
}

async fn join_session<R, A>(
    config: NetplayConfig,
    matchmaker: Matchmaker<R, A>,
    args: &Args,
) -> Result<(), NetplayError>
where
    R: Registry,
    A: AddressResolver,
{
    let mut client = RemoteClient::new(config, matchmaker, &args.name);
    match (args.host_addr, &args.code) {
        (Some(addr), _) => {
            client.connect(addr).await?;
            println!("Connected to host at {}", addr);
        }
        (None, Some(code)) => {
            let info = client.join(code).await?;
            println!("Joined room {} as {}", info.room_code, info.player_name);
        }
        (None, None) => {
            return Err(NetplayError::InvalidRoomCode {
                code: String::new(),
            })
        }
    }

    let stopper = client.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, leaving...");
            stopper.stop();
        }
    });

    let outcome = client.run().await?;
    let score = outcome
        .last_snapshot
        .as_ref()
        .map(|s| format!("{} - {}", s.scores[0], s.scores[1]))
        .unwrap_or_else(|| "no score".to_string());
    match outcome.reason {
        LeaveReason::MatchEnded => match outcome.last_snapshot.as_ref().and_then(|s| s.winner) {
            Some(winner) => println!("Player {} wins {}", winner, score),
            None => println!("Match ended at {}", score),
        },
        LeaveReason::HostLeft(message) => println!("Host left: {} ({})", message, score),
        LeaveReason::ConnectionLost(reason) => {
            let error = NetplayError::TransportClosed { reason };
            eprintln!("{}", error.user_message());
        }
        LeaveReason::Stopped => println!("You left the match at {}", score),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut config = NetplayConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!("Starting remote ({} mode)...", config.transport);
    info!("Matchmaking service: {}", config.registry_url);

    let registry = HttpRegistry::new(
        &config.registry_url,
        config.registry_timeout(),
        config.relay_timeout(),
    )?;
    let matchmaker = Matchmaker::new(
        Arc::new(registry),
        HttpAddressResolver::new(config.registry_timeout()),
        config.registry_timeout(),
    );

    if let Err(e) = join_session(config, matchmaker, &args).await {
        error!("{}", e);
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    Ok(())
}
