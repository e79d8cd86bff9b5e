//! # BespokeASM: an assembler for instruction sets you design yourself.
//!
//! The instruction set (mnemonics, operand forms, bit layouts, registers, endianness,
//! predefined constants and memory zones) comes from a JSON or YAML configuration file.
//!
//! ## Getting Started
//! To assemble a program:
//! ```text
//! cargo run -- -c /path/to/isa.yaml /path/to/program.asm
//! ```
//! ...or if you've already built the binary then just...
//! ```text
//! bespokeasm -c /path/to/isa.yaml /path/to/program.asm
//! ```
//! ## Options
//! Help for command line options is available using -h or --help.
#[macro_use]
mod macros;
mod assembler;
mod bytecode;
mod config;
mod context;
mod error;
mod hex;
mod label_scope;
mod line;
mod memzone;
mod model;
mod named_scope;
mod parse;
mod pathid;
mod preprocessor;
mod program;
use crate::assembler::Assembler;
use crate::config::AssemblerOptions;
use crate::error::Error;
use crate::model::AsmModel;
use std::path::Path;
use std::result::Result;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init();
    // process_file does all the work
    if let Err(e) = process_file(config::ARGS.file.as_str()) {
        println!("{}", e);
        return Err(Box::new(e));
    }
    Ok(())
}

/// Load the ISA, assemble `filename` with it and write the image.
fn process_file(filename: &str) -> Result<(), Error> {
    let config_path = config::ARGS
        .config
        .as_deref()
        .ok_or_else(|| config_err!("an ISA configuration file is required (use -c/--config)"))?;
    let model = AsmModel::load(Path::new(config_path))?;
    let options = AssemblerOptions::from_args(&config::ARGS);
    verbose_println!(1, "Loaded ISA {} v{} from {}", model.name, model.version, config_path);

    let started = Instant::now();
    let asm = Assembler::new(&model)?;
    info!("Assembling {}", filename);
    let program = asm.assemble_file(Path::new(filename), options)?;
    info!("{}", program.summary());
    verbose_println!(1, "Assembly took {:?}", started.elapsed());

    if !config::ARGS.no_output {
        program.write_output_file(&config::output_path(), config::ARGS.hex)?;
    }
    Ok(())
}
