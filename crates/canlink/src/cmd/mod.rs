use std::future::Future;
use std::time::Duration;

use canlink_bus::BusConfig;
use canlink_frame::Marker;
use canlink_transport::{DeviceSelector, DEFAULT_INTERFACE};
use clap::{Args, Subcommand, ValueEnum};
use tokio::runtime::Handle;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod probe;
pub mod send;
pub mod session;
pub mod verify;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one DATA frame and wait for the adapter's acknowledgement.
    Send(SendArgs),
    /// Print frames received during a time window.
    Listen(ListenArgs),
    /// Wait for a new frame with the expected field values.
    Verify(VerifyArgs),
    /// Open the adapter and report link counters.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => block_on(|handle| send::run(args, device, format, handle)),
        Command::Listen(args) => block_on(|handle| listen::run(args, device, format, handle)),
        Command::Verify(args) => block_on(|handle| verify::run(args, device, format, handle)),
        Command::Probe(args) => block_on(|handle| probe::run(args, device, format, handle)),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F>(command: impl FnOnce(Handle) -> F) -> CliResult<i32>
where
    F: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    let handle = runtime.handle().clone();
    runtime.block_on(command(handle))
}

/// Adapter selection, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// USB vendor id of the adapter (decimal or 0x-prefixed hex).
    #[arg(
        long,
        global = true,
        env = "CANLINK_VID",
        value_parser = parse_usb_id,
        default_value = "0x5458"
    )]
    pub vid: u16,
    /// USB product id of the adapter (decimal or 0x-prefixed hex).
    #[arg(
        long,
        global = true,
        env = "CANLINK_PID",
        value_parser = parse_usb_id,
        default_value = "0x1222"
    )]
    pub pid: u16,
    /// Interface carrying the bulk endpoints.
    #[arg(long, global = true, env = "CANLINK_INTERFACE", default_value_t = DEFAULT_INTERFACE)]
    pub interface: u8,
    /// Use an in-memory adapter that acknowledges every frame.
    #[arg(long, global = true)]
    pub simulate: bool,
}

impl DeviceArgs {
    pub fn selector(&self) -> DeviceSelector {
        DeviceSelector {
            vendor_id: self.vid,
            product_id: self.pid,
            interface: self.interface,
        }
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig::default().with_selector(self.selector())
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum MarkerArg {
    Data,
    Ack,
}

impl From<MarkerArg> for Marker {
    fn from(arg: MarkerArg) -> Self {
        match arg {
            MarkerArg::Data => Marker::Data,
            MarkerArg::Ack => Marker::Ack,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// CAN identifier (decimal or 0x-prefixed hex).
    pub identifier: String,
    /// Payload as hex bytes, e.g. FF00AA55 or "FF 00 AA 55".
    pub payload: Option<String>,
    /// Node byte of the frame.
    #[arg(long, default_value_t = 1)]
    pub node: u8,
    /// CAN type byte of the frame.
    #[arg(long, default_value_t = 0)]
    pub kind: u8,
    /// Declared data length. Default: payload byte count.
    #[arg(long)]
    pub length: Option<u8>,
    /// Do not wait for an acknowledgement.
    #[arg(long, conflicts_with = "require_ack")]
    pub no_ack: bool,
    /// Exit with a timeout status if no acknowledgement arrives.
    #[arg(long)]
    pub require_ack: bool,
    /// Time to wait for the acknowledgement (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub ack_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Only collect frames with this identifier.
    #[arg(long)]
    pub identifier: Option<String>,
    /// Only print frames with this marker.
    #[arg(long, value_enum)]
    pub marker: Option<MarkerArg>,
    /// How long to listen (e.g. 5s, 500ms). Ctrl-C ends early.
    #[arg(long, default_value = "5s")]
    pub duration: String,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Expected payload; `XX` matches any byte.
    #[arg(long)]
    pub payload: Option<String>,
    /// Expected CAN identifier (decimal or 0x-prefixed hex).
    #[arg(long)]
    pub identifier: Option<String>,
    /// Expected field value as NAME=VALUE. Repeatable.
    #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
    /// Give up after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// How long to read before reporting counters (e.g. 250ms).
    #[arg(long, default_value = "250ms")]
    pub window: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_usb_id(input: &str) -> Result<u16, String> {
    let trimmed = input.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => trimmed.parse::<u16>(),
    };
    parsed.map_err(|_| format!("invalid USB id: {input}"))
}

fn parse_field(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {input:?}")),
    }
}

/// Parse `500ms`, `5s` or a bare number of seconds.
pub fn parse_duration(label: &str, input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, format!("{label} must not be empty")));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid {label} value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(
            USAGE,
            format!("{label} must be greater than zero"),
        ));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
