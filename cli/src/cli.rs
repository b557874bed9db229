use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Check a Mezzo module", long_about = None)]
pub struct Cli {
    /// Path to the implementation (.mz) to check
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Add a directory to the interface search path (repeatable)
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    pub include: Vec<PathBuf>,
    /// Do not auto-include the core and pervasives modules
    #[arg(long, default_value_t = false)]
    pub no_auto_include: bool,
    /// Debug verbosity
    #[arg(long, default_value_t = 0)]
    pub debug: usize,
    /// Print the derivation of the first failing subtraction
    #[arg(long, default_value_t = false)]
    pub explain: bool,
}
