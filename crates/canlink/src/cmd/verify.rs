use canlink_bus::{Criteria, Verdict};
use tokio::runtime::Handle;

use crate::cmd::session::open_bus;
use crate::cmd::{parse_duration, DeviceArgs, VerifyArgs};
use crate::exit::{criteria_error, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_verdict, OutputFormat, VerifyOutput};

pub async fn run(
    args: VerifyArgs,
    device: &DeviceArgs,
    format: OutputFormat,
    handle: Handle,
) -> CliResult<i32> {
    let criteria = build_criteria(&args)?;
    let timeout = parse_duration("timeout", &args.timeout)?;

    let bus = open_bus(device, device.bus_config(), handle).await?;
    let described = criteria.to_string();
    let verdict = bus.verify(criteria, timeout).await;
    bus.stop().await;

    print_verdict(&VerifyOutput::new(described, &verdict), format);
    Ok(match verdict {
        Verdict::Matched(_) => SUCCESS,
        Verdict::NoFramesSeen => TIMEOUT,
        Verdict::NoMatchAmongSeen { .. } => FAILURE,
    })
}

/// `--field` pairs first, then `--payload` and `--identifier`, which replace
/// a field given the same way.
fn build_criteria(args: &VerifyArgs) -> CliResult<Criteria> {
    let mut criteria = Criteria::from_fields(args.fields.iter().map(|(k, v)| (k, v)))
        .map_err(|err| criteria_error("invalid field", err))?;
    if let Some(payload) = &args.payload {
        criteria = criteria
            .payload(payload)
            .map_err(|err| criteria_error("invalid payload", err))?;
    }
    if let Some(identifier) = &args.identifier {
        criteria = criteria
            .identifier(identifier)
            .map_err(|err| criteria_error("invalid identifier", err))?;
    }
    Ok(criteria)
}
