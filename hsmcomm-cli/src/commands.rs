//! Command execution.

use crate::Commands;
use colored::Colorize;
use hsmcomm_client::Client;
use hsmcomm_protocol::Transport;
use std::fmt::Write;
use std::time::Instant;

/// Executes a command and returns the formatted output.
pub fn execute<T: Transport>(
    client: &mut Client<T>,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Info => {
            let comm = client.comm();
            Ok(format!(
                "{} client {} connected to server {}",
                "OK".green(),
                comm.client_id().to_string().cyan(),
                comm.server_id().to_string().cyan()
            ))
        }

        Commands::Ping { count } => {
            let mut out = String::new();
            for i in 1..=count {
                let start = Instant::now();
                client.keep_alive()?;
                let elapsed = start.elapsed();
                writeln!(out, "{} seq={} time={:?}", "PONG".green(), i, elapsed)?;
            }
            Ok(out.trim_end().to_string())
        }

        Commands::Echo { data } => {
            let echoed = client.echo(data.as_bytes())?;
            Ok(String::from_utf8_lossy(&echoed).into_owned())
        }

        Commands::Call { kind, payload } => {
            let data = parse_hex(&payload)?;
            let response = client.call(kind, &data)?;
            let status = if response.is_ok() {
                response.status.to_string().green()
            } else {
                response.status.to_string().red()
            };
            Ok(format!(
                "type=0x{:04X} seq={} status={} payload={}",
                response.kind,
                response.seq,
                status,
                format_hex(&response.payload)
            ))
        }
    }
}

/// Parses a message type given in decimal or with a `0x` prefix.
pub fn parse_kind(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid message type '{}': {}", s, e))
}

fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid hex payload '{}'", s));
    }
    if s.len() % 2 != 0 {
        return Err("hex payload must have an even number of digits".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

fn format_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("0x0A01").unwrap(), 0x0A01);
        assert_eq!(parse_kind("260").unwrap(), 0x0104);
        assert!(parse_kind("0x10000").is_err());
        assert!(parse_kind("ping").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex("de ad BE ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x01, 0xab]), "01ab");
    }
}
