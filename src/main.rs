use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use dlt645_rs::util::hex::{encode_hex, parse_hex_lenient};
use dlt645_rs::{
    connect, disconnect, init_logger, init_logger_with_default, log_debug, log_error, log_info,
    log_warn, parse_communication_address, CommunicationRate, DateTime, ReadDataRequest, ReadTime,
    SerialConfig,
};

#[derive(Parser)]
#[command(name = "dlt645-cli")]
#[command(about = "CLI tool for DL/T 645-2007 electricity meters")]
struct Cli {
    /// JSON file with the serial configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    port: Option<String>,
    #[arg(short, long)]
    baudrate: Option<u32>,
    /// Meter address, up to 12 decimal digits
    #[arg(short, long, value_parser = parse_u64)]
    address: Option<u64>,
    /// Seconds without traffic before the port is closed
    #[arg(long)]
    idle_timeout: Option<u64>,
    /// Default log filter when RUST_LOG is unset, e.g. debug
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    ReadData {
        #[arg(value_parser = parse_u32)]
        marker: u32,
        #[arg(long)]
        blocks: Option<u8>,
        /// Start of a historical read, e.g. 2024-05-17T08:30
        #[arg(long, requires = "blocks", value_parser = parse_time)]
        time: Option<NaiveDateTime>,
    },
    WriteData {
        #[arg(value_parser = parse_u32)]
        marker: u32,
        /// Data domain as hex; separators such as spaces are ignored
        data: String,
        #[arg(long, default_value_t = 2)]
        permission: u8,
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        password: u32,
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        operator: u32,
    },
    ReadAddress,
    WriteAddress {
        #[arg(value_parser = parse_u64)]
        address: u64,
    },
    BroadcastTime {
        /// Defaults to the local time
        #[arg(long, value_parser = parse_time)]
        time: Option<NaiveDateTime>,
    },
    Freeze {
        #[arg(value_parser = parse_u8)]
        month: u8,
        #[arg(value_parser = parse_u8)]
        day: u8,
        #[arg(value_parser = parse_u8)]
        hour: u8,
        #[arg(value_parser = parse_u8)]
        minute: u8,
    },
    ChangeRate {
        baudrate: u32,
    },
    ChangePassword {
        #[arg(value_parser = parse_u32)]
        marker: u32,
        old_permission: u8,
        #[arg(value_parser = parse_u32)]
        old_password: u32,
        new_permission: u8,
        #[arg(value_parser = parse_u32)]
        new_password: u32,
    },
    ClearDemand {
        permission: u8,
        #[arg(value_parser = parse_u32)]
        password: u32,
        #[arg(value_parser = parse_u32, default_value = "0")]
        operator: u32,
    },
    ClearAmmeter {
        permission: u8,
        #[arg(value_parser = parse_u32)]
        password: u32,
        #[arg(value_parser = parse_u32, default_value = "0")]
        operator: u32,
    },
    ClearEvent {
        #[arg(value_parser = parse_u32)]
        marker: u32,
        permission: u8,
        #[arg(value_parser = parse_u32)]
        password: u32,
        #[arg(value_parser = parse_u32, default_value = "0")]
        operator: u32,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    u32::try_from(parse_u64(s)?).map_err(|_| format!("'{s}' does not fit into 32 bits"))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    u8::try_from(parse_u64(s)?).map_err(|_| format!("'{s}' does not fit into 8 bits"))
}

fn parse_time(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| format!("invalid time '{s}': {e}"))
}

fn parse_data(s: &str) -> Result<Vec<u8>, String> {
    parse_hex_lenient(s).map_err(|e| format!("invalid data '{s}': {e}"))
}

fn load_config(cli: &Cli) -> anyhow::Result<SerialConfig> {
    let mut config = match &cli.config {
        Some(path) => SerialConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            if cli.port.is_none() {
                log_warn("No config file or --port given, using the default port");
            }
            SerialConfig::default()
        }
    };
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(baudrate) = cli.baudrate {
        config.baudrate = baudrate;
    }
    if let Some(address) = cli.address {
        config.slave_address = address;
    }
    if let Some(secs) = cli.idle_timeout {
        config.idle_timeout = Duration::from_secs(secs);
    }
    log_debug(&format!("Effective configuration: {config:?}"));
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.log_level {
        Some(level) => init_logger_with_default(level),
        None => init_logger(),
    }

    let result = run(cli).await;
    if let Err(e) = &result {
        log_error(&format!("{e:#}"));
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let port = config.port.clone();
    let mut client = connect(config)
        .await
        .with_context(|| format!("connecting to {port}"))?;
    log_info(&format!("Connected to meter {} on {port}", client.slave_address()));

    let output = match cli.command {
        Commands::ReadData {
            marker,
            blocks,
            time,
        } => {
            let request = match (blocks, time) {
                (Some(q), Some(t)) => ReadDataRequest::new(marker).at(q, ReadTime::from_naive(&t)),
                (Some(q), None) => ReadDataRequest::new(marker).with_blocks(q),
                _ => ReadDataRequest::new(marker),
            };
            client.read_data(&request).await?
        }
        Commands::WriteData {
            marker,
            data,
            permission,
            password,
            operator,
        } => {
            let data = parse_data(&data).map_err(anyhow::Error::msg)?;
            client
                .write_data(marker, permission, password, operator, &data)
                .await?
        }
        Commands::ReadAddress => {
            let raw = client.read_communication_address().await?;
            println!("{:012}", parse_communication_address(&raw)?);
            raw
        }
        Commands::WriteAddress { address } => {
            client.write_communication_address(address).await?
        }
        Commands::BroadcastTime { time } => {
            let time = time.unwrap_or_else(|| chrono::Local::now().naive_local());
            client.broadcast_timing(DateTime::from(time)).await?;
            log_info(&format!("Broadcast time {time}"));
            Vec::new()
        }
        Commands::Freeze {
            month,
            day,
            hour,
            minute,
        } => client.freeze(month, day, hour, minute).await?,
        Commands::ChangeRate { baudrate } => {
            let rate = CommunicationRate::from_baudrate(baudrate)?;
            client.change_communication_rate(rate.flag()).await?
        }
        Commands::ChangePassword {
            marker,
            old_permission,
            old_password,
            new_permission,
            new_password,
        } => {
            client
                .change_password(
                    marker,
                    old_permission,
                    old_password,
                    new_permission,
                    new_password,
                )
                .await?
        }
        Commands::ClearDemand {
            permission,
            password,
            operator,
        } => {
            client
                .clear_maximum_demand(permission, password, operator)
                .await?
        }
        Commands::ClearAmmeter {
            permission,
            password,
            operator,
        } => client.clear_ammeter(permission, password, operator).await?,
        Commands::ClearEvent {
            marker,
            permission,
            password,
            operator,
        } => {
            client
                .clear_event(marker, permission, password, operator)
                .await?
        }
    };

    if !output.is_empty() {
        println!("{}", encode_hex(&output));
    }
    disconnect(&mut client).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_data_accepts_separated_hex() {
        let cli = Cli::try_parse_from([
            "dlt645-cli",
            "--log-level",
            "debug",
            "write-data",
            "0x04000101",
            "12 34-56:78",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::WriteData { marker, data, .. } => {
                assert_eq!(marker, 0x0400_0101);
                assert_eq!(parse_data(&data).unwrap(), vec![0x12, 0x34, 0x56, 0x78]);
            }
            _ => panic!("expected write-data"),
        }
    }

    #[test]
    fn test_write_data_rejects_odd_hex() {
        assert!(parse_data("123").is_err());
        assert!(parse_data("zz").is_err());
    }
}
