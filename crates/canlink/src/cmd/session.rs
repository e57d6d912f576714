use std::sync::Arc;

use canlink_bus::{BusConfig, CanBus};
use canlink_transport::{LinkOpener, LoopbackDevice};
use tokio::runtime::Handle;
use tracing::debug;

use crate::cmd::DeviceArgs;
use crate::exit::{bus_error, CliError, CliResult, TRANSPORT_ERROR};

/// Build a bus for the selected adapter without connecting.
pub fn build_bus(device: &DeviceArgs, config: BusConfig, handle: Handle) -> CliResult<CanBus> {
    let opener = opener(device)?;
    Ok(CanBus::new(config, opener, handle))
}

/// Build, connect and start receiving.
pub async fn open_bus(device: &DeviceArgs, config: BusConfig, handle: Handle) -> CliResult<CanBus> {
    let bus = build_bus(device, config, handle)?;
    if !bus.connect().await {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("adapter {} not available", device.selector()),
        ));
    }
    bus.start().map_err(|err| bus_error("start failed", err))?;
    debug!(device = %device.selector(), simulated = device.simulate, "bus started");
    Ok(bus)
}

fn opener(device: &DeviceArgs) -> CliResult<Arc<dyn LinkOpener>> {
    if device.simulate {
        let loopback = LoopbackDevice::new().with_auto_ack(true);
        return Ok(Arc::new(loopback.opener()));
    }
    usb_opener()
}

#[cfg(feature = "usb")]
fn usb_opener() -> CliResult<Arc<dyn LinkOpener>> {
    let opener = canlink_transport::RusbOpener::new()
        .map_err(|err| crate::exit::transport_error("usb init failed", err))?;
    Ok(Arc::new(opener))
}

#[cfg(not(feature = "usb"))]
fn usb_opener() -> CliResult<Arc<dyn LinkOpener>> {
    Err(CliError::new(
        crate::exit::USAGE,
        "built without USB support; rebuild with --features usb or pass --simulate",
    ))
}
