//! Offline tooling for the contextual codec datapath.
//!
//! Generates and checks the sigmoid `.mem` table loaded by the Verilog
//! testbench.

use clap::{Parser, Subcommand};
use ctx_codec::lut::SigmoidLut;
use ctx_codec::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ctx_codec")]
#[command(about = "Fixed-point contextual codec datapath tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the Q4.12 sigmoid LUT as a .mem file
    SigmoidLut {
        /// Output file
        #[arg(short, long, default_value = "sigmoid_lut.mem")]
        output: PathBuf,
    },
    /// Compare a .mem file against a freshly generated table
    VerifyLut {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn write_lut(output: PathBuf) -> Result<()> {
    let lut = SigmoidLut::generate();
    log::info!("writing {} entries to {:?}", lut.table.len(), output);
    lut.save(&output)?;
    println!("Wrote {:?} (index 128 = {:04X})", output, lut.lookup(128));
    Ok(())
}

fn verify_lut(input: PathBuf) -> Result<bool> {
    log::info!("reading {:?}", input);
    let on_disk = SigmoidLut::load(&input)?;
    let diffs = SigmoidLut::generate().diff(&on_disk);

    if diffs.is_empty() {
        println!("{:?} matches the generated table", input);
        return Ok(true);
    }

    for (i, expected, found) in &diffs {
        println!("index {:3}: expected {:04X}, found {:04X}", i, expected, found);
    }
    println!("{} of 256 entries differ", diffs.len());
    Ok(false)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::SigmoidLut { output } => write_lut(output).map(|_| true),
        Commands::VerifyLut { input } => verify_lut(input),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
