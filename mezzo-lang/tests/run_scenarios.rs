use mezzo_lang::mezzo::{Mezzo, Options};
use std::path::PathBuf;

fn check(name: &str) -> Result<usize, mezzo_lang::mezzo::DriverError> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/suite");
    let opts = Options { include_dirs: vec![dir.clone()], ..Default::default() };
    let mut mezzo = Mezzo::new(opts);
    mezzo.check(&dir.join(name))
}

macro_rules! accepts {
    ($name:ident, $file:expr) => {
        #[test]
        fn $name() {
            match check($file) {
                Ok(_) => {}
                Err(err) => {
                    eprintln!("{}", err);
                    panic!("expected {} to check", $file);
                }
            }
        }
    };
}

macro_rules! rejects {
    ($name:ident, $file:expr, $code:expr) => {
        #[test]
        fn $name() {
            match check($file) {
                Ok(_) => panic!("expected {} to be rejected", $file),
                Err(err) => assert_eq!(err.exit_code(), $code, "wrong class: {}", err),
            }
        }
    };
}

accepts!(list_recursion, "list.mz");
accepts!(reference_cells, "refcell.mz");
accepts!(adoption_cycle, "adoption.mz");
accepts!(merge_at_if, "join.mz");
accepts!(stack_with_interface, "stack.mz");

rejects!(closure_escape, "refcell_escape.mz", 251);
rejects!(use_after_give, "adoption_fail.mz", 251);
rejects!(divergent_join, "join_fail.mz", 251);
rejects!(unknown_constructor, "kind_err.mz", 252);
rejects!(syntax_error, "parse_err.mz", 253);
rejects!(invalid_codepoint, "codepoint_err.mz", 254);
rejects!(stray_character, "lex_err.mz", 255);
rejects!(missing_module, "mod_not_found.mz", 250);
