use super::{parser, syntax::*, Lexer};
use crate::utils::fmt::FmtArgs;
use logos::Logos;

fn parse_module(src: &str) -> Module {
    parser::ProgParser::new().parse(src, Lexer::new(src)).expect("module parses")
}

fn parse_term(src: &str) -> mezzo_utils::span::Span<Term> {
    parser::TermSpanParser::new().parse(src, Lexer::new(src)).expect("term parses")
}

/// Printing a parse and re-parsing it must be stable.
fn roundtrip_module(src: &str) {
    let once = parse_module(src).fmt();
    let twice = parse_module(&once).fmt();
    assert_eq!(once, twice, "unstable print for:\n{}", src);
}

#[test]
fn lexes_punctuation_and_keywords() {
    use super::token::Tok;
    let toks: Vec<_> = Tok::lexer("let x = r.contents <- 1 -- trailing\n").collect();
    assert_eq!(
        toks,
        vec![
            Tok::Let,
            Tok::LowerIdent("x"),
            Tok::Equals,
            Tok::LowerIdent("r"),
            Tok::Dot,
            Tok::LowerIdent("contents"),
            Tok::Assign,
            Tok::NumLit("1"),
        ]
    );
}

#[test]
fn lexes_qualified_names_as_one_token() {
    use super::token::Tok;
    let toks: Vec<_> = Tok::lexer("list::length xs").collect();
    assert_eq!(toks, vec![Tok::LowerIdent("list::length"), Tok::LowerIdent("xs")]);
}

#[test]
fn parses_data_declarations() {
    let m = parse_module("data list a = Nil | Cons { head: a; tail: list a }\n");
    assert_eq!(m.decls.len(), 1);
    let Declaration::Data(DataGroup(ds)) = m.decls[0].inner_ref() else {
        panic!("expected a data group");
    };
    assert_eq!(ds.len(), 1);
    assert_eq!(ds[0].ctors.len(), 2);
    assert_eq!(ds[0].params.len(), 1);
}

#[test]
fn parses_mutable_data_with_adopts() {
    let m = parse_module("mutable data pool a = Pool { count: int } adopts ref a\n");
    let Declaration::Data(DataGroup(ds)) = m.decls[0].inner_ref() else {
        panic!("expected a data group");
    };
    assert_eq!(ds[0].flavor, DataFlavor::Mutable);
    assert!(ds[0].adopts.is_some());
}

#[test]
fn application_is_left_associative() {
    let t = parse_term("f x y");
    let Term::App(App { fun, .. }) = t.inner_ref() else { panic!("expected application") };
    assert!(matches!(fun.inner_ref(), Term::App(_)));
}

#[test]
fn arrows_are_right_associative() {
    let src = "val f : int -> int -> int\n";
    let m = parse_module(src);
    let Declaration::ValSig(ValSig { ty, .. }) = m.decls[0].inner_ref() else {
        panic!("expected a signature");
    };
    let Type::Arrow(ArrowT(_, cod)) = ty.inner_ref() else {
        panic!("expected an arrow");
    };
    assert!(matches!(cod.inner_ref(), Type::Arrow(_)));
}

#[test]
fn sequencing_binds_looser_than_assignment() {
    let t = parse_term("r.contents <- 1; r.contents <- 2");
    assert!(matches!(t.inner_ref(), Term::Seq(_)));
}

#[test]
fn roundtrip_declarations() {
    roundtrip_module("data list a = Nil | Cons { head: a; tail: list a }\n");
    roundtrip_module("mutable data pool = Pool { count: int } adopts ref int\n");
    roundtrip_module("open core\nval x : int\nabstract t a\nfact duplicable t\n");
}

#[test]
fn roundtrip_terms() {
    roundtrip_module(
        "val _ = let r = Ref { contents = 0 } in let x = r.contents in r.contents <- 1\n",
    );
    roundtrip_module("val _ = give r to y; take r from y; y owns r\n");
    roundtrip_module(
        "val f = fun (x: int) : int = match b with | True -> x | False -> 0 end\n",
    );
    roundtrip_module("val _ = if eq (1, 2) then tag of x <- Cons else assert x @ int\n");
    roundtrip_module("val _ = (f [int] 1 : int)\n");
}

#[test]
fn roundtrip_types() {
    roundtrip_module("val f : [a] (list a -> int)\n");
    roundtrip_module("val f : {a} (=x, (int | y @ ref a)) -> unknown\n");
    roundtrip_module("val f : duplicable a => (a -> dynamic)\n");
    roundtrip_module("val f : (consumes ref int) -> empty -> (x @ int * y @ int)\n");
    roundtrip_module("val f : [^a, b : type -> type] b a -> ()\n");
}

#[test]
fn rejects_stray_consumes() {
    let res = parser::TypeSpanParser::new()
        .parse("list (consumes int)", Lexer::new("list (consumes int)"));
    // the grammar accepts it; the kind checker rejects it later
    assert!(res.is_ok());
}
