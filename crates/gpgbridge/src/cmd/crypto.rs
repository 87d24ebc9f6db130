use gpgbridge_client::{Context, EncryptOptions, SignMode};
use tracing::debug;

use crate::cmd::{ConnectArgs, DecryptArgs, EncryptArgs, SignArgs};
use crate::exit::{client_error, io_error, CliResult, SUCCESS};
use crate::output::{print_data, OutputFormat};

pub async fn encrypt(
    args: EncryptArgs,
    connect: &ConnectArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let data = args.input.read()?;
    let context = connect.connect().await?;

    let mut options = EncryptOptions::default()
        .always_trust(args.always_trust)
        .wildcard(args.wildcard);
    for key in &args.sign_with {
        options = options.sign_with(key.clone());
    }

    let result = if args.binary {
        context
            .encrypt_binary(&data, &args.recipient, &options)
            .await
            .map(|cipher| cipher.to_vec())
    } else {
        context
            .encrypt_with(&data, &args.recipient, &options)
            .await
            .map(|answer| answer.data.into_bytes())
    };
    finish(&context, "encrypt", result, format)
}

pub async fn decrypt(
    args: DecryptArgs,
    connect: &ConnectArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let data = args.input.read()?;
    let context = connect.connect().await?;

    let result = context.decrypt(&data).await.map(|plain| plain.data.to_vec());
    finish(&context, "decrypt", result, format)
}

pub async fn sign(
    args: SignArgs,
    connect: &ConnectArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let data = args.input.read()?;
    let context = connect.connect().await?;

    let mode = if args.detached {
        SignMode::Detached
    } else {
        SignMode::Clearsign
    };
    let result = context
        .sign(&data, &args.key, mode)
        .await
        .map(|answer| answer.data.into_bytes());
    finish(&context, "sign", result, format)
}

fn finish(
    context: &Context,
    operation: &str,
    result: gpgbridge_client::Result<Vec<u8>>,
    format: OutputFormat,
) -> CliResult<i32> {
    context.connection().disconnect();
    let output = result.map_err(|err| client_error(&format!("{operation} failed"), err))?;
    debug!(operation, size = output.len(), "writing result");
    print_data(operation, &output, format)
        .map_err(|err| io_error("failed writing output", err))?;
    Ok(SUCCESS)
}
