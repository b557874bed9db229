#![allow(clippy::style)]
#![allow(clippy::useless_format)]
#![allow(clippy::clone_on_copy)]
#![allow(clippy::mutable_key_type)]

pub mod syntax;

pub mod parse {
    #[allow(clippy::all)]
    pub mod parser {
        use lalrpop_util::lalrpop_mod;
        lalrpop_mod!(parser_impl, "/parse/parser.rs");
        pub use parser_impl::*;
    }

    pub mod token;
    pub mod syntax;
    pub mod err;
    mod fmt;

    use logos::{Logos, SpannedIter};
    use token::Tok;

    pub struct Lexer<'source> {
        inner: SpannedIter<'source, Tok<'source>>,
    }

    impl<'source> Lexer<'source> {
        pub fn new(source: &'source str) -> Self {
            Self { inner: Tok::lexer(source).spanned() }
        }
    }

    impl<'source> Iterator for Lexer<'source> {
        type Item = (usize, Tok<'source>, usize);

        fn next(&mut self) -> Option<Self::Item> {
            self.inner.next().map(|(tok, range)| (range.start, tok, range.end))
        }
    }

    #[cfg(test)]
    mod tests;
}

pub mod statics {
    pub mod syntax;
    pub mod env;
    pub mod fact;
    pub mod sub;
    pub mod add;
    pub mod merge;
    pub mod elab;
    pub mod tyck;
    pub mod err;
    mod fmt;

    pub use env::Env;
    pub use fmt::{show_env, show_type};
    pub use tyck::TypeCheck;

    #[cfg(test)]
    mod tests;
}

pub mod library {
    pub mod builtins;
}

pub mod utils {
    pub use mezzo_utils::*;
}
pub use mezzo_utils::rc;

pub mod prelude {
    pub use mezzo_utils::prelude::*;
}

pub mod mezzo;
