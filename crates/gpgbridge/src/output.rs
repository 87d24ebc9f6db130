use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DataOutput<'a> {
    operation: &'a str,
    size: usize,
    data: Option<&'a str>,
}

/// Print the result of a crypto operation to stdout.
pub fn print_data(operation: &str, data: &[u8], format: OutputFormat) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write_data(&mut out, operation, data, format)
}

/// Write the result of a crypto operation.
///
/// Only `json` wraps the data; every other format writes it unchanged so
/// the output can be piped into the next command.
pub fn write_data<W: Write>(
    out: &mut W,
    operation: &str,
    data: &[u8],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let value = DataOutput {
                operation,
                size: data.len(),
                data: std::str::from_utf8(data).ok(),
            };
            serde_json::to_writer(&mut *out, &value)?;
            out.write_all(b"\n")?;
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => out.write_all(data)?,
    }
    out.flush()
}

/// Render label/value rows as a two-column table.
pub fn key_value_table(rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"]);
    for (label, value) in rows {
        table.add_row(vec![label.to_string(), value.clone()]);
    }
    table
}

pub fn human_size(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * KIB;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MiB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{} KiB", bytes / KIB)
    } else {
        format!("{bytes} B")
    }
}
