//! # xdrz Command-Line Tool
//!
//! Inspect, validate and convert drizzle registration data files.
//!
//! ## Usage
//!
//! ```bash
//! # Show a summary of a drizzle data file (either format)
//! xdrz info light_0001.xdrz
//!
//! # Validate structural integrity
//! xdrz validate light_0001.xdrz
//!
//! # Convert a legacy plain-text file to XDRZ XML
//! xdrz convert light_0001.drz light_0001.xdrz
//!
//! # Generate a small synthetic record for testing
//! xdrz demo demo.xdrz
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use xdrz::drizzle::{DrizzleData, DrizzleParserOptions};

/// xdrz - Drizzle Registration Data Tool
#[derive(Parser)]
#[command(name = "xdrz")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information about a drizzle data file
    Info {
        /// Input file path (XDRZ XML or legacy plain text)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Skip integration statistics and the rejection map
        #[arg(long)]
        no_integration: bool,
    },

    /// Validate drizzle data file integrity
    Validate {
        /// Input file path
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Convert a legacy plain-text file to XDRZ XML
    Convert {
        /// Input file path
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output XDRZ file path (defaults to the input with .xdrz)
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Store rejection map channel data uncompressed
        #[arg(long)]
        no_compression: bool,
    },

    /// Generate a small synthetic record for testing
    Demo {
        /// Output XDRZ file path
        #[arg(value_name = "OUTPUT", default_value = "demo.xdrz")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Info { file, no_integration } => run_info(file, no_integration),
        Commands::Validate { file } => run_validate(file),
        Commands::Convert {
            input,
            output,
            no_compression,
        } => run_convert(input, output, no_compression),
        Commands::Demo { output } => run_demo(output),
    }
}

fn run_info(file: PathBuf, no_integration: bool) -> Result<()> {
    let options = DrizzleParserOptions {
        ignore_integration_data: no_integration,
        ..Default::default()
    };
    let data = DrizzleData::parse_with_options(&file, options)
        .with_context(|| format!("Parsing {}", file.display()))?;

    println!("File:              {}", file.display());
    println!("Source image:      {}", data.source_file_path);
    if let Some(cfa) = &data.cfa_source_file_path {
        match &data.cfa_source_pattern {
            Some(pattern) => println!("CFA source image:  {} ({})", cfa, pattern),
            None => println!("CFA source image:  {}", cfa),
        }
    }
    if let Some(target) = &data.align_target_file_path {
        println!("Alignment target:  {}", target);
    }
    println!(
        "Reference:         {}x{} px",
        data.reference_width, data.reference_height
    );
    if let Some(time) = data.creation_time {
        println!("Created:           {}", time);
    }
    match &data.alignment_matrix {
        Some(matrix) => {
            println!("Transform:         projective matrix");
            for row in matrix.chunks(3) {
                println!("                   [{:+.6e} {:+.6e} {:+.6e}]", row[0], row[1], row[2]);
            }
        }
        None => {
            if let Some(sx) = &data.alignment_spline_x {
                println!(
                    "Transform:         surface splines ({} nodes, order {}, smoothing {})",
                    sx.len(),
                    sx.order,
                    sx.smoothing
                );
            }
        }
    }
    if !data.location.is_empty() {
        println!("Channels:          {}", data.channels());
        println!("Location:          {:?}", data.location);
        println!("Reference loc.:    {:?}", data.reference_location);
        if !data.scale.is_empty() {
            println!("Scale factors:     {:?}", data.scale);
        }
        if !data.weight.is_empty() {
            println!("Weights:           {:?}", data.weight);
        }
    }
    if data.rejection_map.is_some() {
        println!("Rejected low:      {:?}", data.rejection_low_count);
        println!("Rejected high:     {:?}", data.rejection_high_count);
    }
    Ok(())
}

fn run_validate(file: PathBuf) -> Result<()> {
    match DrizzleData::parse(&file) {
        Ok(data) => {
            println!("{}: OK", file.display());
            info!(
                "source={} reference={}x{} channels={}",
                data.source_file_path,
                data.reference_width,
                data.reference_height,
                data.channels()
            );
            Ok(())
        }
        Err(e) => {
            anyhow::bail!("{}: INVALID: {}", file.display(), e);
        }
    }
}

fn run_convert(input: PathBuf, output: Option<PathBuf>, no_compression: bool) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    let output = output.unwrap_or_else(|| input.with_extension("xdrz"));

    info!("Converting {} -> {}", input.display(), output.display());
    let mut data =
        DrizzleData::parse(&input).with_context(|| format!("Parsing {}", input.display()))?;
    data.compression_enabled = !no_compression;
    data.serialize_to_file(&output)
        .with_context(|| format!("Writing {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn run_demo(output: PathBuf) -> Result<()> {
    let mut data = DrizzleData::new();
    data.source_file_path = "/data/session1/light_0001.fit".to_string();
    data.align_target_file_path = Some("/data/session1/reference.fit".to_string());
    data.reference_width = 256;
    data.reference_height = 256;
    data.alignment_matrix = Some([
        0.999987, 0.000213, 1.52377, -0.000209, 0.999991, -0.87215, 0.0, 0.0, 1.0,
    ]);
    data.location = vec![0.00127, 0.00119, 0.00134];
    data.reference_location = vec![0.00125, 0.00120, 0.00131];
    data.scale = vec![1.0012, 0.9987, 1.0004];
    data.weight = vec![0.92, 0.95, 0.88];

    let mut map = xdrz::drizzle::RejectionMap::new(256, 256, 3);
    for k in 0..256 {
        map.set_flags(k, k, 0, xdrz::drizzle::REJECT_HIGH);
        map.set_flags(255 - k, k, 1, xdrz::drizzle::REJECT_LOW);
    }
    data.rejection_map = Some(map);

    data.serialize_to_file(&output)
        .with_context(|| format!("Writing {}", output.display()))?;
    println!("Wrote demo record to {}", output.display());
    Ok(())
}
