//! Test-Rig Log Simulation
//!
//! Generates synthetic rig logs in the tab-separated DASYLab export layout
//! for training and exercising rigscan:
//! - Metadata preamble, then a `Messzeit [s]` time column
//! - Pressure, flow, speed and torque channels built from sinusoids plus
//!   Gaussian noise
//! - Optional fault injection (pressure oscillation amplification or an
//!   extra torque tone)
//!
//! # Usage
//! ```bash
//! # Ten known-good runs for training
//! ./simulation --files 10 --seed 1 --output-dir runs/good
//!
//! # One faulty run, German locale decimals, to stdout
//! ./simulation --fault amplitude --fault-factor 8 --comma-decimals > faulty.txt
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

// ============================================================================
// Rig Constants
// ============================================================================

/// (name, unit, offset, oscillation amplitude, oscillation frequency Hz, noise std)
const CHANNELS: [(&str, &str, f64, f64, f64, f64); 4] = [
    ("Pressure", "bar", 200.0, 3.0, 2.5, 0.2),
    ("Flow", "L/min", 40.0, 1.5, 5.0, 0.1),
    ("Speed", "rpm", 1500.0, 20.0, 12.0, 2.0),
    ("Torque", "Nm", 85.0, 4.0, 12.0, 0.5),
];

const PRESSURE: usize = 0;
const TORQUE: usize = 3;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// Known-good run
    None,
    /// Pressure oscillation amplified by `--fault-factor`
    Amplitude,
    /// Additional torque tone at `--tone-hz`
    Tone,
}

#[derive(Parser, Debug)]
#[command(name = "rig-simulation")]
#[command(about = "Synthetic test-rig log generator for rigscan")]
#[command(version = "1.0")]
struct Args {
    /// Recording length per file in seconds
    #[arg(short, long, default_value = "60")]
    duration_s: f64,

    /// Sample rate in Hz
    #[arg(long, default_value = "100")]
    sample_rate: f64,

    /// Number of files to generate
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=1000))]
    files: u32,

    /// Directory for generated files (stdout when omitted and --files is 1)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// File name prefix inside the output directory
    #[arg(long, default_value = "run")]
    prefix: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Fault to inject
    #[arg(long, value_enum, default_value = "none")]
    fault: Fault,

    /// Amplitude multiplier for `--fault amplitude`
    #[arg(long, default_value = "5.0")]
    fault_factor: f64,

    /// Frequency of the injected torque tone for `--fault tone`
    #[arg(long, default_value = "30.0")]
    tone_hz: f64,

    /// Write values with comma decimals (German locale exports)
    #[arg(long)]
    comma_decimals: bool,
}

// ============================================================================
// Generator
// ============================================================================

struct RigSimulator {
    rng: StdRng,
    noise: Vec<Normal<f64>>,
    sample_rate: f64,
    fault: Fault,
    fault_factor: f64,
    tone_hz: f64,
    comma_decimals: bool,
}

impl RigSimulator {
    fn new(args: &Args) -> Result<Self> {
        let rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let noise = CHANNELS
            .iter()
            .map(|c| Normal::new(0.0, c.5))
            .collect::<Result<Vec<_>, _>>()
            .context("invalid noise distribution")?;
        Ok(Self {
            rng,
            noise,
            sample_rate: args.sample_rate,
            fault: args.fault,
            fault_factor: args.fault_factor,
            tone_hz: args.tone_hz,
            comma_decimals: args.comma_decimals,
        })
    }

    fn format_value(&self, value: f64, decimals: usize) -> String {
        let text = format!("{value:.decimals$}");
        if self.comma_decimals {
            text.replace('.', ",")
        } else {
            text
        }
    }

    /// One channel sample at time `t`.
    fn sample(&mut self, channel: usize, t: f64, phase: f64) -> f64 {
        let (_, _, offset, amplitude, freq, _) = CHANNELS[channel];
        let amplitude = match self.fault {
            Fault::Amplitude if channel == PRESSURE => amplitude * self.fault_factor,
            _ => amplitude,
        };
        let mut value = offset + amplitude * (2.0 * PI * freq * t + phase).sin();
        if self.fault == Fault::Tone && channel == TORQUE {
            value += 2.0 * amplitude * (2.0 * PI * self.tone_hz * t).sin();
        }
        value + self.noise[channel].sample(&mut self.rng)
    }

    /// Write one complete log.
    fn write_log<W: Write>(&mut self, out: &mut W, duration_s: f64, name: &str) -> io::Result<u64> {
        let now = Utc::now();
        writeln!(out, "DASYLab - V 13.0.0")?;
        writeln!(out, "Worksheet name: {name}")?;
        writeln!(out, "Recording date    : {}", now.format("%d.%m.%Y,  %H:%M:%S"))?;
        writeln!(out, "Block length      : 1")?;
        writeln!(out, "Delta             : {} sec.", self.format_value(1.0 / self.sample_rate, 4))?;
        writeln!(out, "Number of channels: {}", CHANNELS.len())?;
        writeln!(out)?;

        let header: Vec<String> = std::iter::once("Messzeit [s]".to_string())
            .chain(CHANNELS.iter().map(|c| format!("{} [{}]", c.0, c.1)))
            .collect();
        writeln!(out, "{}", header.join("\t"))?;

        // Each file starts the oscillations at a random phase
        let phases: Vec<f64> = (0..CHANNELS.len()).map(|_| self.rng.gen_range(0.0..2.0 * PI)).collect();
        let total = (duration_s * self.sample_rate).floor() as u64;
        for i in 0..total {
            let t = i as f64 / self.sample_rate;
            let mut row = vec![self.format_value(t, 3)];
            for (c, phase) in phases.iter().enumerate() {
                let value = self.sample(c, t, *phase);
                row.push(self.format_value(value, 4));
            }
            writeln!(out, "{}", row.join("\t"))?;
        }
        Ok(total)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut sim = RigSimulator::new(&args)?;

    match &args.output_dir {
        None if args.files == 1 => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            sim.write_log(&mut out, args.duration_s, "rig-simulation")?;
            out.flush()?;
        }
        None => anyhow::bail!("--output-dir is required when generating more than one file"),
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            for n in 0..args.files {
                let name = format!("{}_{:03}", args.prefix, n + 1);
                let path = dir.join(format!("{name}.txt"));
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut out = BufWriter::new(file);
                let rows = sim.write_log(&mut out, args.duration_s, &name)?;
                out.flush()?;
                eprintln!("wrote {} ({rows} rows, fault: {:?})", path.display(), args.fault);
            }
        }
    }
    Ok(())
}
