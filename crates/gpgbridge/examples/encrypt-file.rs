//! Encrypt a file to one recipient and print the armored result.
//!
//! Run with:
//!   cargo run --example encrypt-file -- <recipient> <file> [host-program]
//!
//! The host program defaults to `gpgme-json` on `PATH`.

use gpgbridge::{ClientConfig, Endpoint};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let (Some(recipient), Some(file)) = (args.next(), args.next()) else {
        eprintln!("usage: encrypt-file <recipient> <file> [host-program]");
        std::process::exit(64);
    };
    let host = args.next().unwrap_or_else(|| "gpgme-json".to_string());

    let data = std::fs::read(&file)?;
    let context = gpgbridge::init(ClientConfig::with_endpoint(Endpoint::native_host(host))).await?;
    eprintln!("Connected over {}", context.connection().transport_name());

    match context.encrypt(&data, &recipient).await {
        Ok(answer) => print!("{}", answer.data),
        Err(err) => eprintln!("encrypt failed ({}): {err}", err.code()),
    }

    context.connection().disconnect();
    Ok(())
}
