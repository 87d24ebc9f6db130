use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("gpgbridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: gpgbridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("GPGBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("GPGBRIDGE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "default_max_message: {}",
        gpgbridge_frame::DEFAULT_MAX_MESSAGE
    );
    println!(
        "default_max_payload: {}",
        gpgbridge_client::DEFAULT_MAX_PAYLOAD
    );
    println!("features: client=true, cli=true");

    Ok(SUCCESS)
}
