use std::time::Duration;

use canlink_bus::{parse_identifier, CanBus};
use canlink_frame::{Frame, Marker};
use tokio::runtime::Handle;
use tracing::info;

use crate::cmd::session::open_bus;
use crate::cmd::{parse_duration, DeviceArgs, ListenArgs};
use crate::exit::{criteria_error, CliResult, SUCCESS};
use crate::output::{print_frames, OutputFormat};

pub async fn run(
    args: ListenArgs,
    device: &DeviceArgs,
    format: OutputFormat,
    handle: Handle,
) -> CliResult<i32> {
    let duration = parse_duration("duration", &args.duration)?;
    let identifier = args
        .identifier
        .as_deref()
        .map(parse_identifier)
        .transpose()
        .map_err(|err| criteria_error("invalid identifier", err))?;
    let marker = args.marker.map(Marker::from);

    let bus = open_bus(device, device.bus_config(), handle).await?;
    let frames = match identifier {
        Some(identifier) => {
            bus.collect_until(identifier, marker.unwrap_or(Marker::Data), window_end(duration))
                .await
        }
        None => drain_window(&bus, marker, duration).await,
    };
    bus.stop().await;

    info!(count = frames.len(), "listen finished");
    print_frames(&frames, format);
    Ok(SUCCESS)
}

/// Resolves when the duration ends or on Ctrl-C.
async fn window_end(duration: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
}

/// Listen until the window ends, then take what the message window holds.
async fn drain_window(bus: &CanBus, marker: Option<Marker>, duration: Duration) -> Vec<Frame> {
    window_end(duration).await;
    bus.recent_frames(bus.window().capacity())
        .into_iter()
        .filter(|frame| marker.is_none_or(|m| frame.marker == m))
        .collect()
}
