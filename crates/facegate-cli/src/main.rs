use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facegate", about = "FaceGate terminal authentication CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from a photo
    Enroll {
        #[arg(short, long)]
        username: String,
        /// Account number, stored verbatim
        #[arg(short, long)]
        account_number: String,
        #[arg(short, long)]
        pin: String,
        /// Path to the face photo (any decodable raster format)
        #[arg(long)]
        photo: PathBuf,
    },
    /// Verify a PIN + photo against the enrolled template
    Verify {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        pin: String,
        #[arg(long)]
        photo: PathBuf,
    },
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.facegate.FaceGate1",
    default_service = "org.facegate.FaceGate1",
    default_path = "/org/facegate/FaceGate1"
)]
trait FaceGate {
    async fn enroll(
        &self,
        username: &str,
        account_number: &str,
        pin: &str,
        photo: Vec<u8>,
    ) -> zbus::Result<()>;

    async fn verify(&self, username: &str, pin: &str, photo: Vec<u8>) -> zbus::Result<bool>;

    async fn status(&self) -> zbus::Result<String>;
}

fn read_photo(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading photo {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::system()
        .await
        .context("connecting to the system bus — is facegated running?")?;
    let proxy = FaceGateProxy::new(&conn).await?;

    match cli.command {
        Commands::Enroll {
            username,
            account_number,
            pin,
            photo,
        } => {
            let bytes = read_photo(&photo)?;
            proxy
                .enroll(&username, &account_number, &pin, bytes)
                .await
                .context("enrollment failed")?;
            println!("Enrolled '{username}'.");
        }
        Commands::Verify {
            username,
            pin,
            photo,
        } => {
            let bytes = read_photo(&photo)?;
            let granted = proxy
                .verify(&username, &pin, bytes)
                .await
                .context("verification failed")?;
            if granted {
                println!("Access granted.");
            } else {
                println!("Access denied.");
                std::process::exit(1);
            }
        }
        Commands::Status => {
            let status = proxy.status().await.context("status query failed")?;
            println!("{status}");
        }
    }

    Ok(())
}
