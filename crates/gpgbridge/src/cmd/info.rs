use std::time::Instant;

use gpgbridge_client::EngineInfo;
use serde::Serialize;

use crate::cmd::{ConnectArgs, InfoArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{human_size, key_value_table, OutputFormat};

#[derive(Serialize)]
struct PendingInfo {
    id: u64,
    kind: String,
    state: String,
    age_ms: u128,
}

#[derive(Serialize)]
struct InfoOutput {
    endpoint: String,
    transport: &'static str,
    engine: EngineInfo,
    round_trip_ms: f64,
    max_message_size: usize,
    chunk_size: usize,
    max_payload_size: usize,
    max_response_size: usize,
    pending: Option<Vec<PendingInfo>>,
    connected: bool,
}

pub async fn run(args: InfoArgs, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let context = connect.connect().await?;

    let start = Instant::now();
    let engine = context.version().await;
    let round_trip_ms = (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;

    let pending = args.pending.then(|| {
        context
            .connection()
            .pending_operations()
            .into_iter()
            .map(|op| PendingInfo {
                id: op.id.get(),
                kind: op.kind.to_string(),
                state: op.state.to_string(),
                age_ms: op.age.as_millis(),
            })
            .collect()
    });

    context.connection().disconnect();
    let engine = engine.map_err(|err| client_error("engine probe failed", err))?;

    let config = context.config();
    let out = InfoOutput {
        endpoint: config.endpoint.to_string(),
        transport: context.connection().transport_name(),
        engine,
        round_trip_ms,
        max_message_size: config.max_message_size,
        chunk_size: config.chunk_size(),
        max_payload_size: config.max_payload_size,
        max_response_size: config.max_response_size,
        pending,
        connected: true,
    };

    print_info(&out, format);
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut rows = vec![
                ("Endpoint", out.endpoint.clone()),
                ("Transport", out.transport.to_string()),
                ("Engine", format!("{} {}", out.engine.name, out.engine.version)),
                ("Protocols", out.engine.protocols.join(", ")),
                ("Round trip", format!("{:.2}ms", out.round_trip_ms)),
                ("Max message", human_size(out.max_message_size)),
                ("Chunk body", format!("{} B", out.chunk_size)),
                ("Max payload", human_size(out.max_payload_size)),
                ("Max response", human_size(out.max_response_size)),
            ];
            if let Some(pending) = &out.pending {
                rows.push(("Pending", pending.len().to_string()));
            }
            println!("{}", key_value_table(&rows));
        }
        OutputFormat::Pretty => {
            println!("Connection Info:");
            println!("  Endpoint:     {}", out.endpoint);
            println!("  Transport:    {}", out.transport);
            println!("  Engine:       {} {}", out.engine.name, out.engine.version);
            println!("  Protocols:    {}", out.engine.protocols.join(", "));
            println!("  Round trip:   {:.2}ms", out.round_trip_ms);
            println!(
                "  Limits:       message {} (chunk body {} B) / payload {} / response {}",
                human_size(out.max_message_size),
                out.chunk_size,
                human_size(out.max_payload_size),
                human_size(out.max_response_size)
            );
            if let Some(pending) = &out.pending {
                println!("  Pending:      {}", pending.len());
                for op in pending {
                    println!("    #{} {} {} {}ms", op.id, op.kind, op.state, op.age_ms);
                }
            }
        }
        OutputFormat::Raw => {
            println!("{}", out.engine.version);
        }
    }
}
