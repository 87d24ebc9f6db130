use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use gpgbridge_client::{init, ClientConfig, Context, Endpoint};

use crate::exit::{client_error, config_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod crypto;
pub mod info;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encrypt input to one or more recipients.
    Encrypt(EncryptArgs),
    /// Decrypt input.
    Decrypt(DecryptArgs),
    /// Sign input.
    Sign(SignArgs),
    /// Probe the engine and print connection details.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(
    command: Command,
    connect: &ConnectArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    match command {
        Command::Encrypt(args) => crypto::encrypt(args, connect, format).await,
        Command::Decrypt(args) => crypto::decrypt(args, connect, format).await,
        Command::Sign(args) => crypto::sign(args, connect, format).await,
        Command::Info(args) => info::run(args, connect, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the engine. Shared by every command that talks to one.
#[derive(Args, Debug, Default)]
pub struct ConnectArgs {
    /// Native host program to spawn.
    #[arg(long, value_name = "PROGRAM", env = "GPGBRIDGE_HOST", global = true)]
    pub host: Option<PathBuf>,

    /// Argument passed to the native host (repeatable).
    #[arg(long = "host-arg", value_name = "ARG", global = true, allow_hyphen_values = true)]
    pub host_args: Vec<String>,

    /// Unix domain socket of a running engine.
    #[arg(
        long,
        value_name = "PATH",
        env = "GPGBRIDGE_SOCKET",
        global = true,
        conflicts_with = "host"
    )]
    pub socket: Option<PathBuf>,

    /// JSON configuration file. Flags override its values.
    #[arg(long, value_name = "FILE", env = "GPGBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Largest transport message in bytes.
    #[arg(long, value_name = "BYTES", global = true)]
    pub max_message_size: Option<usize>,

    /// Largest accepted input in bytes.
    #[arg(long, value_name = "BYTES", global = true)]
    pub max_payload_size: Option<usize>,

    /// How long to wait for the engine to answer its probe (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", global = true)]
    pub timeout: Option<String>,
}

impl ConnectArgs {
    /// Build the client configuration: file first, then flags on top.
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)
                .map_err(|err| config_error(&format!("config {}", path.display()), err))?,
            None => ClientConfig::default(),
        };

        if let Some(program) = &self.host {
            config.endpoint = Endpoint::NativeHost {
                program: program.clone(),
                args: self.host_args.clone(),
            };
        } else if let Some(path) = &self.socket {
            config.endpoint = Endpoint::socket(path);
        } else if !self.host_args.is_empty() {
            if let Endpoint::NativeHost { args, .. } = &mut config.endpoint {
                args.clone_from(&self.host_args);
            }
        }

        if let Some(size) = self.max_message_size {
            config.max_message_size = size;
        }
        if let Some(size) = self.max_payload_size {
            config.max_payload_size = size;
        }
        if let Some(timeout) = &self.timeout {
            config = config.with_connect_timeout(parse_duration(timeout)?);
        }

        config
            .validate()
            .map_err(|err| config_error("invalid configuration", err))?;
        Ok(config)
    }

    pub async fn connect(&self) -> CliResult<Context> {
        let config = self.client_config()?;
        init(config)
            .await
            .map_err(|err| client_error("connect failed", err))
    }
}

/// Where command input comes from. Defaults to stdin.
#[derive(Args, Debug, Default)]
pub struct InputArgs {
    /// Literal input.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read input from a file.
    #[arg(long, short = 'f', conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

impl InputArgs {
    pub fn read(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(path) = &self.file {
            return std::fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("failed reading stdin", err))?;
        Ok(buf)
    }
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Recipient key (fingerprint, key id or address). Repeatable.
    #[arg(long, short = 'r', value_name = "KEY", required = true)]
    pub recipient: Vec<String>,
    /// Additionally sign with this key. Repeatable.
    #[arg(long, value_name = "KEY")]
    pub sign_with: Vec<String>,
    /// Skip the trust check on recipient keys.
    #[arg(long)]
    pub always_trust: bool,
    /// Hide recipient key ids in the output.
    #[arg(long)]
    pub wildcard: bool,
    /// Write binary ciphertext instead of armor.
    #[arg(long)]
    pub binary: bool,
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Signing key.
    #[arg(long, short = 'k', value_name = "KEY")]
    pub key: String,
    /// Produce a detached signature.
    #[arg(long)]
    pub detached: bool,
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    /// List operations still pending after the probe.
    #[arg(long)]
    pub pending: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
