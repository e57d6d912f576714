use std::sync::Arc;
use std::time::Duration;

use rusb::{Context, DeviceHandle, Direction, TransferType, UsbContext};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{DeviceSelector, LinkOpener, UsbLink};

/// Opens the adapter through libusb.
#[derive(Clone)]
pub struct RusbOpener {
    context: Context,
}

impl RusbOpener {
    pub fn new() -> Result<Self> {
        let context = Context::new().map_err(usb_error)?;
        Ok(Self { context })
    }
}

impl LinkOpener for RusbOpener {
    fn open(&self, selector: &DeviceSelector) -> Result<Arc<dyn UsbLink>> {
        let not_found = || TransportError::DeviceNotFound {
            vendor_id: selector.vendor_id,
            product_id: selector.product_id,
        };

        let devices = self.context.devices().map_err(usb_error)?;
        let device = devices
            .iter()
            .find(|d| {
                d.device_descriptor()
                    .map(|desc| {
                        desc.vendor_id() == selector.vendor_id
                            && desc.product_id() == selector.product_id
                    })
                    .unwrap_or(false)
            })
            .ok_or_else(not_found)?;

        let mut handle = device.open().map_err(usb_error)?;
        if let Err(err) = handle.set_active_configuration(1) {
            debug!(error = %err, "keeping active configuration");
        }

        let config = device.active_config_descriptor().map_err(usb_error)?;
        let missing = |direction| TransportError::EndpointNotFound {
            interface: selector.interface,
            direction,
        };
        let interface = config
            .interfaces()
            .find(|i| i.number() == selector.interface)
            .ok_or_else(|| missing("any"))?;
        let setting = interface
            .descriptors()
            .find(|d| d.setting_number() == 0)
            .ok_or_else(|| missing("any"))?;

        let mut ep_in = None;
        let mut ep_out = None;
        for endpoint in setting.endpoint_descriptors() {
            if endpoint.transfer_type() != TransferType::Bulk {
                continue;
            }
            match endpoint.direction() {
                Direction::In => {
                    ep_in.get_or_insert(endpoint.address());
                }
                Direction::Out => {
                    ep_out.get_or_insert(endpoint.address());
                }
            }
        }
        let ep_in = ep_in.ok_or_else(|| missing("in"))?;
        let ep_out = ep_out.ok_or_else(|| missing("out"))?;

        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            debug!(error = %err, "kernel driver auto-detach unavailable");
        }
        handle
            .claim_interface(selector.interface)
            .map_err(usb_error)?;

        let link = RusbLink {
            handle,
            context: self.context.clone(),
            selector: *selector,
            bus: device.bus_number(),
            address: device.address(),
            ep_in,
            ep_out,
        };
        info!(device = %link.describe(), ep_in, ep_out, "usb link opened");
        Ok(Arc::new(link))
    }
}

/// Claimed interface with its bulk endpoints. Released on drop.
pub struct RusbLink {
    handle: DeviceHandle<Context>,
    context: Context,
    selector: DeviceSelector,
    bus: u8,
    address: u8,
    ep_in: u8,
    ep_out: u8,
}

impl UsbLink for RusbLink {
    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle
            .read_bulk(self.ep_in, buf, timeout)
            .map_err(usb_error)
    }

    fn write_bulk(&self, data: &[u8], timeout: Duration) -> Result<usize> {
        self.handle
            .write_bulk(self.ep_out, data, timeout)
            .map_err(usb_error)
    }

    fn is_present(&self) -> bool {
        match self.context.devices() {
            Ok(devices) => devices
                .iter()
                .any(|d| d.bus_number() == self.bus && d.address() == self.address),
            Err(_) => false,
        }
    }

    fn describe(&self) -> String {
        format!(
            "usb {} bus {:03} address {:03}",
            self.selector, self.bus, self.address
        )
    }
}

impl Drop for RusbLink {
    fn drop(&mut self) {
        if let Err(err) = self.handle.release_interface(self.selector.interface) {
            debug!(error = %err, "failed to release usb interface");
        }
    }
}

fn usb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::NoDevice => TransportError::Disconnected,
        other => TransportError::Usb(other),
    }
}
