//! Bridge monitor example
//!
//! Keeps a link to the board alive, prints every decoded line, saves each
//! completed camera frame and forwards lines typed on stdin as commands.
//!
//! Run with: cargo run --example bridge_monitor
//!
//! For the IMU + camera firmware:
//!   cargo run --example bridge_monitor -- --sensors --out ./frames
//!
//! To connect to a specific board:
//!   cargo run --example bridge_monitor -- --address 02:7B:B9:31:62:1A

use std::path::PathBuf;
use tinyml_ble_bridge::{
    Bridge, BridgeConfig, DeviceFilter, DeviceProfile, ImageExporter, Result,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,tinyml_ble_bridge=info".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let profile = if args.iter().any(|arg| arg == "--sensors") {
        DeviceProfile::SensorSuite
    } else {
        DeviceProfile::Inference
    };
    let out_dir = args
        .iter()
        .position(|arg| arg == "--out")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = BridgeConfig::for_profile(profile);
    if let Some(address) = args
        .iter()
        .position(|arg| arg == "--address")
        .and_then(|i| args.get(i + 1))
    {
        config = config.with_device_filter(DeviceFilter::Address(address.clone()));
    }

    println!("TinyML BLE Bridge");
    println!("=================");
    println!("Profile: {:?}", profile);
    println!("Frames:  {}", out_dir.display());
    println!("Type a line and press enter to send it as a command.\n");

    let bridge = Bridge::with_btleplug(config).await?;
    let (_id, mut lines) = bridge.attach_lines();

    let exporter = ImageExporter::new(out_dir);
    let mut images = bridge.subscribe_images();
    let saver = tokio::spawn(async move {
        loop {
            match images.recv().await {
                Ok(image) => match exporter.export(&image) {
                    Ok(()) => println!(
                        "Saved {} and {}",
                        exporter.bin_path().display(),
                        exporter.hex_path().display()
                    ),
                    Err(e) => eprintln!("Could not save frame: {}", e),
                },
                Err(RecvError::Lagged(n)) => eprintln!("Skipped {} frames", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    bridge.start();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => println!("{}", line),
                None => break,
            },
            input = stdin.next_line() => match input? {
                Some(command) if !command.trim().is_empty() => {
                    if !bridge.is_connected() {
                        println!("(not connected, command dropped)");
                    }
                    bridge.send_command(command.trim()).await?;
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\nShutting down...");
    bridge.stop().await;
    saver.abort();

    Ok(())
}
