use canlink_bus::{parse_identifier, AckOutcome, PayloadPattern};
use canlink_frame::{hex_identifier, hex_payload};
use tokio::runtime::Handle;

use crate::cmd::session::open_bus;
use crate::cmd::{parse_duration, DeviceArgs, SendArgs};
use crate::exit::{
    bus_error, criteria_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR, USAGE,
};
use crate::output::{print_send, OutputFormat, SendOutput};

pub async fn run(
    args: SendArgs,
    device: &DeviceArgs,
    format: OutputFormat,
    handle: Handle,
) -> CliResult<i32> {
    let identifier = parse_identifier(&args.identifier)
        .map_err(|err| criteria_error("invalid identifier", err))?;
    let payload = parse_payload(args.payload.as_deref().unwrap_or(""))?;
    let length = args
        .length
        .unwrap_or_else(|| u8::try_from(payload.len()).unwrap_or(u8::MAX));
    let ack_timeout = parse_duration("ack timeout", &args.ack_timeout)?;

    let config = device.bus_config().with_ack_timeout(ack_timeout);
    let bus = open_bus(device, config, handle).await?;

    let result = if args.no_ack {
        bus.send(args.node, args.kind, identifier, length, &payload)
            .await
            .map_err(|err| bus_error("send failed", err))
            .and_then(|sent| {
                if sent {
                    Ok(None)
                } else {
                    Err(CliError::new(
                        TRANSPORT_ERROR,
                        format!("send failed: frame {} not written", hex_identifier(identifier)),
                    ))
                }
            })
    } else {
        bus.send_confirmed(args.node, args.kind, identifier, length, &payload)
            .await
            .map(Some)
            .map_err(|err| bus_error("send failed", err))
    };
    bus.stop().await;
    let outcome = result?;

    let out = SendOutput {
        identifier: hex_identifier(identifier),
        length,
        payload: hex_payload(&payload),
        acknowledged: outcome.map(|o| o.is_acknowledged()),
        ack_tick: match outcome {
            Some(AckOutcome::Acknowledged { tick }) => Some(tick),
            _ => None,
        },
    };
    print_send(&out, format);

    if args.require_ack && out.acknowledged != Some(true) {
        return Ok(TIMEOUT);
    }
    Ok(SUCCESS)
}

/// Concrete payload bytes. Wildcards are not allowed when sending.
fn parse_payload(text: &str) -> CliResult<Vec<u8>> {
    let pattern =
        PayloadPattern::parse(text).map_err(|err| criteria_error("invalid payload", err))?;
    pattern
        .exact_bytes()
        .ok_or_else(|| CliError::new(USAGE, format!("invalid payload: {text:?} contains XX")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_accepts_separators() {
        assert_eq!(parse_payload("FF 00-aa:55").unwrap(), vec![0xFF, 0x00, 0xAA, 0x55]);
        assert!(parse_payload("").unwrap().is_empty());
    }

    #[test]
    fn payload_rejects_wildcards_and_garbage() {
        assert_eq!(parse_payload("FFXX").unwrap_err().code, USAGE);
        assert_eq!(parse_payload("F").unwrap_err().code, USAGE);
        assert_eq!(parse_payload("zz").unwrap_err().code, USAGE);
    }
}
