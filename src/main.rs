use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use keytrans_crypto::signing::{self, KeyPair};
use keytrans_crypto::vrf::VrfPrivateKey;
use tracing_subscriber::filter::LevelFilter;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
enum KeyAlgorithm {
    #[default]
    P256,
    Ed25519,
}

#[derive(Parser, Debug)]
#[command(name = "keytrans", about = "Key transparency server utilities")]
struct Args {
    /// Use verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a signing keypair and a VRF keypair.
    GenerateKeys {
        /// The signature algorithm to generate a signing keypair for.
        #[arg(long, value_enum, default_value_t)]
        algorithm: KeyAlgorithm,
    },
}

impl Args {
    fn init_tracing(&self) {
        let level_filter = match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        tracing_subscriber::fmt()
            .with_max_level(level_filter)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.init_tracing();
    tracing::debug!("args: {args:?}");

    match args.command {
        Command::GenerateKeys { algorithm } => {
            let KeyPair { public, private } = match algorithm {
                KeyAlgorithm::P256 => signing::generate_p256_pair(),
                KeyAlgorithm::Ed25519 => signing::generate_ed25519_pair(),
            };
            println!("Signing public key: {public}");
            println!("Signing private key: {private}");

            let vrf_private = VrfPrivateKey::generate();
            println!("VRF public key: {}", vrf_private.public_key());
            println!("VRF private key: {vrf_private}");
        }
    }

    Ok(())
}
