use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fieldgate_core::{BtleCentral, LinkConfig, LinkManager, ResolverOverride};
use fieldgate_types::SignalQuality;

#[derive(Parser)]
#[command(name = "fieldgate")]
#[command(author, version, about = "BLE link tool for the Fieldgate gateway", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby BLE peripherals
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Connect to a device and show its classification and endpoints
    Info {
        /// Device address (MAC address or UUID)
        #[arg(short, long)]
        device: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Connect to a keyboard and echo decoded input
    Keys {
        /// Device address (MAC address or UUID)
        #[arg(short, long)]
        device: String,

        /// How long to listen, in seconds (0 = until Ctrl-C)
        #[arg(short, long, default_value = "0")]
        seconds: u64,
    },

    /// Record the device's audio stream to a WAV file
    Record {
        /// Device address (MAC address or UUID)
        #[arg(short, long)]
        device: String,

        /// Output WAV path (absolute)
        #[arg(short, long)]
        output: PathBuf,

        /// Capture length in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,

        /// PCM sample rate written into the WAV header
        #[arg(long, default_value = "16000")]
        sample_rate: u32,

        /// Substring of a service UUID to force as the audio endpoint
        #[arg(long)]
        service: Option<String>,

        /// Substring of a characteristic UUID to force as the audio endpoint
        #[arg(long)]
        characteristic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scan { timeout, format } => scan(timeout, &format).await,
        Commands::Info { device, format } => info(&device, &format).await,
        Commands::Keys { device, seconds } => keys(&device, seconds).await,
        Commands::Record {
            device,
            output,
            seconds,
            sample_rate,
            service,
            characteristic,
        } => {
            record(
                &device,
                &output,
                seconds,
                sample_rate,
                ResolverOverride {
                    service,
                    characteristic,
                },
            )
            .await
        }
    }
}

async fn link_with_config(config: LinkConfig) -> Result<LinkManager> {
    let stack = Arc::new(
        BtleCentral::new()
            .await
            .context("Failed to initialize the Bluetooth adapter")?,
    );
    let link = LinkManager::with_config(stack, config);
    link.begin();
    Ok(link)
}

async fn scan(timeout: u64, format: &str) -> Result<()> {
    let link = link_with_config(LinkConfig {
        scan_duration: Duration::from_secs(timeout),
        ..LinkConfig::default()
    })
    .await?;

    tracing::info!("Scanning for BLE devices ({timeout}s)...");
    let results = link.scan_devices().await?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No devices found");
        return Ok(());
    }
    for result in &results {
        let name = if result.name.is_empty() {
            "(unnamed)"
        } else {
            &result.name
        };
        println!(
            "{:>4} dBm  {:<9} {:<24} {}  {}",
            result.rssi_dbm,
            format!("({})", SignalQuality::from_rssi(result.rssi_dbm).description()),
            name,
            result.address,
            result.profile
        );
    }
    Ok(())
}

async fn info(device: &str, format: &str) -> Result<()> {
    let link = link_with_config(LinkConfig::default()).await?;
    link.connect_to_device(device, None).await?;

    let status = link.status().await;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Name:      {}", status.name);
        println!("Address:   {}", status.address);
        println!("Signal:    {} dBm", status.rssi_dbm);
        println!("Profile:   {}", status.profile_label);
        match status.audio_endpoint {
            Some(endpoint) => println!(
                "Audio:     {} / {} (handle {})",
                endpoint.service, endpoint.characteristic, endpoint.handle
            ),
            None => println!("Audio:     none"),
        }
        if status.pairing_hint {
            println!("Note:      HID device; bonding may be required for input");
        }
    }

    link.disconnect_now().await;
    Ok(())
}

async fn keys(device: &str, seconds: u64) -> Result<()> {
    let link = link_with_config(LinkConfig::default()).await?;
    link.connect_to_device(device, None).await?;

    let status = link.status().await;
    if !status.is_hid {
        link.disconnect_now().await;
        anyhow::bail!("{} is not a HID device", device);
    }
    println!("Listening for keyboard input (Ctrl-C to stop)...");

    let deadline = (seconds > 0).then(|| tokio::time::Instant::now() + Duration::from_secs(seconds));
    let mut printed = 0usize;
    loop {
        let sleep = tokio::time::sleep(Duration::from_millis(100));
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sleep => {}
        }
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            break;
        }
        link.tick().await;
        if !link.status().await.connected {
            eprintln!("Connection lost");
            break;
        }
        let text = link.keyboard_input_text();
        if text.len() > printed {
            print!("{}", &text[printed..]);
            use std::io::Write;
            std::io::stdout().flush().ok();
            printed = text.len();
        }
    }

    println!();
    link.disconnect_now().await;
    Ok(())
}

async fn record(
    device: &str,
    output: &PathBuf,
    seconds: u64,
    sample_rate: u32,
    audio_override: ResolverOverride,
) -> Result<()> {
    let link = link_with_config(LinkConfig {
        sample_rate,
        audio_override,
        ..LinkConfig::default()
    })
    .await?;
    link.connect_to_device(device, None).await?;

    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.cancel();
            }
        });
    }

    println!("Recording {seconds}s to {}...", output.display());
    let result = link
        .record_audio_to_wav(output, Duration::from_secs(seconds), stop)
        .await;
    link.disconnect_now().await;

    let summary = result?;
    println!(
        "Wrote {} bytes ({} received, {} dropped)",
        summary.bytes_written, summary.received_bytes, summary.dropped_bytes
    );
    if let Some(note) = summary.note {
        println!("Note: {note}");
    }
    Ok(())
}
