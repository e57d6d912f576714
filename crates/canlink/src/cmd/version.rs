use canlink_frame::FRAME_SIZE;
use canlink_transport::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("canlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: canlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("CANLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("CANLINK_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("features: usb={}, cli=true", cfg!(feature = "usb"));
    println!("frame_size: {FRAME_SIZE}");
    println!(
        "default_device: {DEFAULT_VENDOR_ID:04x}:{DEFAULT_PRODUCT_ID:04x}"
    );

    Ok(SUCCESS)
}
