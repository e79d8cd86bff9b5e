use clap::Parser;
use clap_num::maybe_hex;
use lazy_static::lazy_static;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author,version,about,long_about=None)]
pub struct Args {
    /// Assembly source file (.asm, .s, or the extension declared by the ISA)
    pub file: String,

    /// ISA configuration file (.json, .yaml or .yml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output file (defaults to the source file name with a .bin or .hex extension)
    #[arg(short, long)]
    pub output: Option<String>,

    /// First address of the emitted image (hex ok with '0x')
    #[arg(long,value_parser=maybe_hex::<u64>)]
    pub start: Option<u64>,

    /// Last address of the emitted image (hex ok with '0x'); defaults to the highest generated address
    #[arg(long,value_parser=maybe_hex::<u64>)]
    pub end: Option<u64>,

    /// Word value used to fill gaps in the emitted image
    #[arg(long,value_parser=maybe_hex::<u64>, default_value_t=0_u64)]
    pub fill: u64,

    /// Additional directory to search for #include files (may be repeated)
    #[arg(short = 'I', long = "include-path")]
    pub include_paths: Vec<String>,

    /// Define a preprocessor symbol as NAME or NAME=VALUE (may be repeated)
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Increase output verbosity (may be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Treat every warning as a fatal error
    #[arg(long)]
    pub warnings_as_errors: bool,

    /// Write the image in Intel HEX format instead of raw binary
    #[arg(long)]
    pub hex: bool,

    /// Assemble without writing an output file
    #[arg(short, long)]
    pub no_output: bool,
}

lazy_static! {
    pub static ref ARGS: Args = if cfg!(test) {
        // manually set parameters for running tests
        Args::parse_from(["test", "test.asm"])
    } else {
        Args::parse()
    };
}

/// Per-run assembler settings. Built from [ARGS] by `main`, or directly by tests.
#[derive(Debug, Clone, Default)]
pub struct AssemblerOptions {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub fill: u64,
    pub include_paths: Vec<PathBuf>,
    pub defines: Vec<(String, String)>,
    pub verbosity: u8,
    pub warnings_as_errors: bool,
}

impl AssemblerOptions {
    pub fn from_args(args: &Args) -> Self {
        AssemblerOptions {
            start: args.start,
            end: args.end,
            fill: args.fill,
            include_paths: args.include_paths.iter().map(PathBuf::from).collect(),
            defines: args.defines.iter().map(|d| split_define(d)).collect(),
            verbosity: args.verbose,
            warnings_as_errors: args.warnings_as_errors,
        }
    }
}

/// Split a `-D` argument into its name and value. A bare name gets an empty value.
fn split_define(define: &str) -> (String, String) {
    match define.split_once('=') {
        Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
        None => (define.trim().to_string(), String::new()),
    }
}

pub fn init() {
    // force argument parsing up front so usage errors surface before any work is done
    lazy_static::initialize(&ARGS);
}
pub fn output_path() -> PathBuf {
    ARGS.output.as_ref().map_or_else(
        || PathBuf::from(&ARGS.file).with_extension(if ARGS.hex { "hex" } else { "bin" }),
        PathBuf::from,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn define_splitting() {
        assert_eq!(split_define("FOO=3"), ("FOO".to_string(), "3".to_string()));
        assert_eq!(split_define("BAR"), ("BAR".to_string(), String::new()));
        let opts = AssemblerOptions::from_args(&Args::parse_from([
            "test", "x.asm", "-D", "A=1", "--start", "0x100", "-vv",
        ]));
        assert_eq!(opts.start, Some(0x100));
        assert_eq!(opts.verbosity, 2);
        assert_eq!(opts.defines, vec![("A".to_string(), "1".to_string())]);
    }
}
