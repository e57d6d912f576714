use std::time::Duration;

use tokio::runtime::Handle;
use tracing::warn;

use crate::cmd::session::build_bus;
use crate::cmd::{parse_duration, DeviceArgs, ProbeArgs};
use crate::exit::{bus_error, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_probe, OutputFormat, ProbeOutput};

pub async fn run(
    args: ProbeArgs,
    device: &DeviceArgs,
    format: OutputFormat,
    handle: Handle,
) -> CliResult<i32> {
    let window: Duration = parse_duration("window", &args.window)?;
    let bus = build_bus(device, device.bus_config(), handle)?;

    let connected = bus.connect().await;
    if connected {
        bus.start().map_err(|err| bus_error("start failed", err))?;
        tokio::time::sleep(window).await;
    } else {
        warn!(device = %device.selector(), "adapter not available");
    }
    let stats = bus.transport_stats();
    bus.stop().await;

    let out = ProbeOutput::new(
        device.selector().to_string(),
        device.simulate,
        connected,
        stats,
    );
    print_probe(&out, format);

    Ok(if connected { SUCCESS } else { TRANSPORT_ERROR })
}
