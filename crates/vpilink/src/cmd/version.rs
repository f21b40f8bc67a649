use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("vpilink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: vpilink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("VPILINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "transports: {}",
        if cfg!(unix) {
            "seqpacket, unix-stream, tcp"
        } else {
            "tcp"
        }
    );
    println!("max_frame_len: {}", vpilink_host::MAX_FRAME_LEN);

    Ok(SUCCESS)
}
