use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nkspy::{FrameInterpreter, HdlcDecoder, RecordFormatter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode nanok scheduling traces")]
struct Opts {
    /// Raw trace bytes as drained from the target; stdin if omitted
    input: Option<PathBuf>,

    /// One JSON object per record
    #[arg(long)]
    json: bool,

    /// Only show these record kinds (e.g. swap, block, isr, sched)
    #[arg(long = "filter", value_name = "KIND", num_args = 1..)]
    filters: Vec<String>,

    #[arg(long = "no-timestamps")]
    no_timestamps: bool,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let mut formatter = RecordFormatter::new(!opts.no_timestamps, opts.json);
    if !opts.filters.is_empty() {
        formatter.set_filters(&opts.filters)?;
    }

    let mut input: Box<dyn Read> = match &opts.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let mut decoder = HdlcDecoder::new();
    let mut interpreter = FrameInterpreter::new();
    let mut buf = [0u8; 4096];

    loop {
        let len = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("read failed"),
        };

        match decoder.push_bytes(&buf[..len]) {
            Ok(frames) => {
                for frame in frames {
                    let record = interpreter.interpret(&frame);
                    if let Some(line) = formatter.format_record(&record)? {
                        println!("{line}");
                    }
                }
            }
            Err(err) => {
                eprintln!("decoder error: {err}; resetting state");
                decoder.reset();
            }
        }
    }

    if interpreter.lost() > 0 {
        eprintln!("{} frames lost on the target", interpreter.lost());
    }
    Ok(())
}
