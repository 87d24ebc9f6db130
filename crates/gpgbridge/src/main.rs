mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, ConnectArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "gpgbridge",
    version,
    about = "Encrypt, decrypt and sign through a native crypto engine"
)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "GPGBRIDGE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.connect, format).await;

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encrypt_with_recipients() {
        let cli = Cli::try_parse_from([
            "gpgbridge",
            "encrypt",
            "-r",
            "alice@example.org",
            "--recipient",
            "bob@example.org",
            "--data",
            "hello",
        ])
        .expect("encrypt args should parse");

        match cli.command {
            Command::Encrypt(args) => {
                assert_eq!(args.recipient.len(), 2);
                assert_eq!(args.input.data.as_deref(), Some("hello"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn encrypt_requires_recipient() {
        let err = Cli::try_parse_from(["gpgbridge", "encrypt", "--data", "hello"])
            .expect_err("missing recipient should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_conflicting_input_args() {
        let err = Cli::try_parse_from([
            "gpgbridge",
            "decrypt",
            "--data",
            "x",
            "--file",
            "/tmp/in.asc",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_host_and_socket_together() {
        let err = Cli::try_parse_from([
            "gpgbridge",
            "--host",
            "gpgme-json",
            "--socket",
            "/tmp/engine.sock",
            "info",
        ])
        .expect_err("host and socket conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gpgbridge",
            "sign",
            "-k",
            "KEY",
            "--detached",
            "--socket",
            "/tmp/engine.sock",
            "--format",
            "json",
        ])
        .expect("sign args should parse");

        assert_eq!(
            cli.connect.socket.as_deref(),
            Some(std::path::Path::new("/tmp/engine.sock"))
        );
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(matches!(cli.command, Command::Sign(ref args) if args.detached));
    }
}
