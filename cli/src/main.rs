mod cli;

use clap::Parser;
use cli::Cli;
use mezzo_lang::mezzo::{Mezzo, Options};

fn main() {
    let cli = Cli::parse();
    let opts = Options {
        include_dirs: cli.include,
        auto_include: !cli.no_auto_include,
        debug: cli.debug,
        explain: cli.explain,
    };
    let mut mezzo = Mezzo::new(opts);
    match mezzo.check(&cli.file) {
        Ok(n) => {
            if cli.debug >= 1 {
                eprintln!("=== [{}] <done: {} values>", cli.file.display(), n);
            }
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
