mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, DeviceArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "canlink", version, about = "CAN-over-USB adapter CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    device: DeviceArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.device, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from(["canlink", "send", "0x301", "0A", "--node", "2"])
            .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.identifier, "0x301");
                assert_eq!(args.payload.as_deref(), Some("0A"));
                assert_eq!(args.node, 2);
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_ack_flags() {
        let err = Cli::try_parse_from(["canlink", "send", "0x301", "--no-ack", "--require-ack"])
            .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn device_defaults_to_adapter_ids() {
        let cli = Cli::try_parse_from(["canlink", "probe"]).expect("probe args should parse");
        assert_eq!(cli.device.vid, 0x5458);
        assert_eq!(cli.device.pid, 0x1222);
        assert_eq!(cli.device.interface, 1);
        assert!(!cli.device.simulate);
    }

    #[test]
    fn device_flags_are_global() {
        let cli = Cli::try_parse_from([
            "canlink",
            "listen",
            "--simulate",
            "--vid",
            "0x1234",
            "--pid",
            "4660",
        ])
        .expect("device flags should parse after the subcommand");
        assert!(cli.device.simulate);
        assert_eq!(cli.device.vid, 0x1234);
        assert_eq!(cli.device.pid, 0x1234);
    }

    #[test]
    fn parses_repeated_verify_fields() {
        let cli = Cli::try_parse_from([
            "canlink",
            "verify",
            "--field",
            "node=1",
            "--field",
            "can_type=0",
            "--timeout",
            "2s",
        ])
        .expect("verify args should parse");

        match cli.command {
            Command::Verify(args) => {
                assert_eq!(
                    args.fields,
                    vec![
                        ("node".to_string(), "1".to_string()),
                        ("can_type".to_string(), "0".to_string()),
                    ]
                );
            }
            other => panic!("expected verify, got {other:?}"),
        }
    }

    #[test]
    fn rejects_field_without_value_separator() {
        let err = Cli::try_parse_from(["canlink", "verify", "--field", "node"])
            .expect_err("field without '=' should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
