//! Record Formatter
//!
//! Formats interpreted trace records for display

use std::collections::HashSet;

use anyhow::{bail, Result};
use colored::Colorize;
use nanok_trace::RecordKind;

use crate::{Event, TraceRecord};

const KINDS: [RecordKind; 13] = [
    RecordKind::Swap,
    RecordKind::Preempt,
    RecordKind::Ready,
    RecordKind::Block,
    RecordKind::TaskSet,
    RecordKind::Create,
    RecordKind::Terminate,
    RecordKind::IsrEnter,
    RecordKind::IsrExit,
    RecordKind::Idle,
    RecordKind::Latency,
    RecordKind::Fatal,
    RecordKind::TargetInfo,
];

pub struct RecordFormatter {
    show_timestamps: bool,
    json_format: bool,
    filters: Option<HashSet<RecordKind>>,
}

impl RecordFormatter {
    pub fn new(show_timestamps: bool, json_format: bool) -> Self {
        Self {
            show_timestamps,
            json_format,
            filters: None,
        }
    }

    /// Only show the named kinds. Names are matched without regard to case
    /// or `-`/`_`; "isr" selects both interrupt records and "sched" every
    /// run queue change.
    pub fn set_filters(&mut self, names: &[String]) -> Result<()> {
        let mut filters = HashSet::new();
        for name in names {
            let name = name.to_lowercase().replace('-', "_");
            match name.as_str() {
                "isr" => filters.extend([RecordKind::IsrEnter, RecordKind::IsrExit]),
                "sched" => filters.extend([
                    RecordKind::Swap,
                    RecordKind::Preempt,
                    RecordKind::Ready,
                    RecordKind::Block,
                    RecordKind::TaskSet,
                ]),
                _ => match KINDS.iter().find(|k| k.name().eq_ignore_ascii_case(&name)) {
                    Some(kind) => {
                        filters.insert(*kind);
                    }
                    None => bail!("unknown record kind '{name}'"),
                },
            }
        }
        self.filters = Some(filters);
        Ok(())
    }

    /// Render one record, or `None` if the filter hides it. Fatal and
    /// target records always pass.
    pub fn format_record(&self, record: &TraceRecord) -> Result<Option<String>> {
        let kind = record.event.kind();
        if let (Some(filters), Some(kind)) = (&self.filters, kind) {
            if !kind.is_non_maskable() && !filters.contains(&kind) {
                return Ok(None);
            }
        }

        if self.json_format {
            return Ok(Some(serde_json::to_string(record)?));
        }

        let mut line = String::new();
        if record.lost > 0 {
            line.push_str(&format!("{} ", format!("<{} lost>", record.lost).red()));
        }
        if self.show_timestamps {
            line.push_str(&format!("[{:010}] ", record.timestamp).dimmed().to_string());
        }
        let name = kind.map_or("RAW", RecordKind::name);
        let colored_name = match &record.event {
            Event::Swap { .. } | Event::Preempt { .. } => name.bright_green(),
            Event::Ready { .. } | Event::Block { .. } | Event::TaskSet { .. } => name.bright_cyan(),
            Event::Create { .. } | Event::Terminate { .. } => name.bright_blue(),
            Event::IsrEnter { .. } | Event::IsrExit { .. } => name.yellow(),
            Event::Idle => name.dimmed(),
            Event::Latency { .. } => name.bright_magenta(),
            Event::Fatal { .. } => name.bright_red().bold(),
            Event::TargetInfo { .. } => name.bright_white(),
            Event::Raw { .. } => name.white(),
        };
        line.push_str(&format!("{:12} {}", colored_name, describe(&record.event)));
        Ok(Some(line.trim_end().to_string()))
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::Swap { from, to, reason } => format!("ctx {from} -> ctx {to} ({reason})"),
        Event::Preempt { from, to } => format!("ctx {from} -> ctx {to}"),
        Event::Ready { ctx, priority } => format!("ctx {ctx} prio {priority}"),
        Event::Block { ctx } | Event::Terminate { ctx } => format!("ctx {ctx}"),
        Event::TaskSet { ctx: Some(ctx) } => format!("ctx {ctx}"),
        Event::TaskSet { ctx: None } => "empty".to_string(),
        Event::Create { ctx, priority, flags } => {
            format!("ctx {ctx} prio {priority} flags {flags:#05x}")
        }
        Event::IsrEnter { nesting } => format!("nesting {nesting}"),
        Event::IsrExit { nesting, switched } => {
            format!("nesting {nesting}{}", if *switched { " switch" } else { "" })
        }
        Event::Idle => String::new(),
        Event::Latency { max, min, samples } => {
            format!("min {min} max {max} ticks, {samples} samples")
        }
        Event::Fatal { reason } => reason.to_string(),
        Event::TargetInfo { version, little_endian, word_size, max_contexts, target } => format!(
            "nanok {version} on {target}, {}-bit {}, {max_contexts} contexts",
            u32::from(*word_size) * 8,
            if *little_endian { "LE" } else { "BE" }
        ),
        Event::Raw { payload, .. } => payload
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
