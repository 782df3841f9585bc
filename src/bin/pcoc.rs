//! Compile a textual PCO IR shader through the backend pipeline.
//!
//! Usage: `pcoc <input.pco> [--num-temps N] [--icache-align N] [--opt-rounds N] [--no-opt] [--stats]`

use bumpalo::Bump;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;

use pco::core::{CompilationSession, Options, DEFAULT_ICACHE_ALIGN, DEFAULT_NUM_TEMPS};
use pco::{compile, parse_shader};

#[derive(Parser, Debug)]
#[command(name = "pcoc")]
#[command(about = "Run textual PCO IR through the backend and print the grouped result")]
struct Args {
    /// Path to the textual PCO IR file
    input: PathBuf,

    /// Temp registers available to the allocator
    #[arg(long = "num-temps", default_value_t = DEFAULT_NUM_TEMPS)]
    num_temps: u32,

    /// Instruction cache alignment in bytes
    #[arg(long = "icache-align", default_value_t = DEFAULT_ICACHE_ALIGN)]
    icache_align: u32,

    /// Maximum optimizer/DCE rounds
    #[arg(long = "opt-rounds", default_value_t = 1)]
    opt_rounds: u32,

    /// Skip the optimizer and dead-code elimination
    #[arg(long = "no-opt")]
    no_opt: bool,

    /// Print compilation statistics after the shader
    #[arg(long)]
    stats: bool,
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    let text = match fs::read_to_string(&args.input) {
        Ok(text) => text,
        Err(error) => {
            eprintln!("Failed to read {}: {}", args.input.display(), error);
            process::exit(1);
        }
    };

    let mut shader = match parse_shader(&text) {
        Ok(shader) => shader,
        Err(error) => {
            eprintln!("{}:{}", args.input.display(), error);
            process::exit(1);
        }
    };
    if let Some(stem) = args.input.file_stem() {
        shader.name = stem.to_string_lossy().into_owned();
    }

    let options = Options::default()
        .with_num_temps(args.num_temps)
        .with_icache_align(args.icache_align)
        .with_opt_rounds(args.opt_rounds)
        .with_optimize(!args.no_opt);

    let arena = Bump::new();
    let session = CompilationSession::with_options(&arena, options);

    if let Err(error) = compile(&mut shader, &session) {
        eprintln!("Compilation of {} failed: {}", shader.name, error);
        process::exit(1);
    }

    print!("{}", shader);
    if args.stats {
        println!();
        print!("{}", session.stats());
    }
}
