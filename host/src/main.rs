use clap::Parser;
use host::network::Host;
use log::{error, info, warn};
use shared::{
    AddressResolver, FixedAddresses, HttpAddressResolver, HttpRegistry, Matchmaker,
    MemoryRegistry, NetplayConfig, NetplayError, Registry, TransportMode,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Host a Pong Force match", long_about = None)]
struct Args {
    /// Name shown to the other player
    #[arg(short = 'n', long, default_value = "Host")]
    name: String,

    /// TOML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Matchmaking service base URL
    #[arg(short = 'r', long)]
    registry_url: Option<String>,

    /// TCP port for direct connections
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// direct or relay
    #[arg(short = 't', long)]
    transport: Option<TransportMode>,

    /// Points needed to win
    #[arg(short = 'w', long)]
    win_score: Option<u32>,

    /// Simulation ticks per second
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Skip the matchmaking service; remotes connect with --host-addr
    #[arg(long)]
    offline: bool,
}

impl Args {
    fn apply(&self, config: &mut NetplayConfig) {
        if let Some(url) = &self.registry_url {
            config.registry_url = url.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(win_score) = self.win_score {
            config.win_score = win_score;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
    }
}

async fn host_session<R, A>(
    config: NetplayConfig,
    matchmaker: Matchmaker<R, A>,
    name: &str,
) -> Result<(), NetplayError>
where
    R: Registry,
    A: AddressResolver + Clone,
{
    let mut host = Host::new(config, matchmaker, name);
    let room = host.open().await?;
    println!("Room code: {}", room.code);
    println!("Share this code with the other player.");

    let stopper = host.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, ending session...");
            stopper.stop();
        }
    });

    let result = host.run().await?;
    match result.winner {
        Some(winner) => println!(
            "Player {} wins {} - {}",
            winner, result.scores[0], result.scores[1]
        ),
        None => println!(
            "Match ended at {} - {}",
            result.scores[0], result.scores[1]
        ),
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

    info!("Starting host ({} mode)...", config.transport);

    let outcome = if args.offline {
        if config.transport == TransportMode::Relay {
            warn!("Relay mode with --offline: no other process can reach this room");
        }
        let matchmaker = Matchmaker::new(
            Arc::new(MemoryRegistry::new()),
            FixedAddresses::loopback(),
            config.registry_timeout(),
        );
        host_session(config, matchmaker, &args.name).await
    } else {
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
        host_session(config, matchmaker, &args.name).await
    };

    if let Err(e) = outcome {
        error!("{}", e);
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    Ok(())
}
