use std::io::IsTerminal;

use canlink_bus::Verdict;
use canlink_frame::{Frame, FrameField};
use canlink_transport::TransportStats;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct FrameOutput {
    pub marker: &'static str,
    pub header: String,
    pub tick: u32,
    pub node: u8,
    pub kind: u8,
    pub identifier: String,
    pub length: u8,
    pub payload: String,
    pub checksum: String,
}

impl From<&Frame> for FrameOutput {
    fn from(frame: &Frame) -> Self {
        Self {
            marker: frame.marker.name(),
            header: frame.field(FrameField::Marker),
            tick: frame.tick,
            node: frame.node,
            kind: frame.kind,
            identifier: frame.field(FrameField::Identifier),
            length: frame.length,
            payload: frame.field(FrameField::Payload),
            checksum: frame.field(FrameField::Checksum),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct SendOutput {
    pub identifier: String,
    pub length: u8,
    pub payload: String,
    /// `None` when the acknowledgement was not requested.
    pub acknowledged: Option<bool>,
    pub ack_tick: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct VerifyOutput {
    pub criteria: String,
    pub result: &'static str,
    pub observed: Option<u64>,
    pub frame: Option<FrameOutput>,
}

impl VerifyOutput {
    pub fn new(criteria: String, verdict: &Verdict) -> Self {
        let (result, observed) = match verdict {
            Verdict::Matched(_) => ("matched", None),
            Verdict::NoFramesSeen => ("no_frames_seen", Some(0)),
            Verdict::NoMatchAmongSeen { observed } => ("no_match", Some(*observed)),
        };
        Self {
            criteria,
            result,
            observed,
            frame: verdict.frame().map(FrameOutput::from),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ProbeOutput {
    pub device: String,
    pub simulated: bool,
    pub connected: bool,
    pub reads: u64,
    pub read_timeouts: u64,
    pub read_errors: u64,
    pub frames_received: u64,
    pub frames_rejected: u64,
}

impl ProbeOutput {
    pub fn new(device: String, simulated: bool, connected: bool, stats: TransportStats) -> Self {
        Self {
            device,
            simulated,
            connected,
            reads: stats.reads,
            read_timeouts: stats.read_timeouts,
            read_errors: stats.read_errors,
            frames_received: stats.frames_received,
            frames_rejected: stats.frames_rejected,
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn key_value_table(rows: Vec<(&str, String)>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"]);
    for (key, value) in rows {
        table.add_row(vec![key.to_string(), value]);
    }
    table
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Print frames one JSON object per line, as one table, or as text blocks.
pub fn print_frames(frames: &[Frame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for frame in frames {
                print_json(&FrameOutput::from(frame));
            }
        }
        OutputFormat::Table => {
            if frames.is_empty() {
                println!("no frames");
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "MARKER", "TICK", "NODE", "KIND", "CAN ID", "LEN", "PAYLOAD", "CRC32",
                ]);
            for frame in frames {
                let out = FrameOutput::from(frame);
                table.add_row(vec![
                    out.marker.to_string(),
                    out.tick.to_string(),
                    out.node.to_string(),
                    out.kind.to_string(),
                    out.identifier,
                    out.length.to_string(),
                    out.payload,
                    out.checksum,
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!("{frame}");
            }
        }
    }
}

pub fn print_send(out: &SendOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let table = key_value_table(vec![
                ("identifier", out.identifier.clone()),
                ("length", out.length.to_string()),
                ("payload", out.payload.clone()),
                ("acknowledged", optional(out.acknowledged)),
                ("ack tick", optional(out.ack_tick)),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match (out.acknowledged, out.ack_tick) {
            (Some(true), Some(tick)) => {
                println!("sent {} [{}], acknowledged at tick {tick}", out.identifier, out.payload)
            }
            (Some(_), _) => {
                println!("sent {} [{}], no acknowledgement", out.identifier, out.payload)
            }
            (None, _) => println!("sent {} [{}]", out.identifier, out.payload),
        },
    }
}

pub fn print_verdict(out: &VerifyOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut rows = vec![
                ("criteria", out.criteria.clone()),
                ("result", out.result.to_string()),
                ("observed", optional(out.observed)),
            ];
            if let Some(frame) = &out.frame {
                rows.push(("can id", frame.identifier.clone()));
                rows.push(("payload", frame.payload.clone()));
                rows.push(("tick", frame.tick.to_string()));
            }
            println!("{}", key_value_table(rows));
        }
        OutputFormat::Pretty => match &out.frame {
            Some(frame) => println!(
                "matched {} [{}] at tick {} ({})",
                frame.identifier, frame.payload, frame.tick, out.criteria
            ),
            None => println!(
                "{} after {} frames ({})",
                out.result,
                optional(out.observed),
                out.criteria
            ),
        },
    }
}

pub fn print_probe(out: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Adapter:");
            println!("  Device:           {}", out.device);
            println!("  Simulated:        {}", out.simulated);
            println!("  Connected:        {}", out.connected);
            println!(
                "  Reads:            {} ({} idle, {} errors)",
                out.reads, out.read_timeouts, out.read_errors
            );
            println!(
                "  Frames:           {} received, {} rejected",
                out.frames_received, out.frames_rejected
            );
        }
    }
}
