use logos::Logos;
use std::fmt::Display;

#[derive(Logos, Clone, Debug, PartialEq)]
pub enum Tok<'input> {
    #[regex(r"[A-Z][a-zA-Z0-9_']*")]
    UpperIdent(&'input str),
    #[regex(r"[a-z][a-zA-Z0-9_']*(::[a-z][a-zA-Z0-9_']*)?")]
    LowerIdent(&'input str),

    #[token("data")]
    Data,
    #[token("mutable")]
    Mutable,
    #[token("abstract")]
    Abstract,
    #[token("fact")]
    Fact,
    #[token("val")]
    Val,
    #[token("open")]
    Open,
    #[token("let")]
    Let,
    #[token("rec")]
    Rec,
    #[token("and")]
    And,
    #[token("in")]
    In,
    #[token("fun")]
    Fun,
    #[token("match")]
    Match,
    #[token("with")]
    With,
    #[token("end")]
    End,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("give")]
    Give,
    #[token("to")]
    To,
    #[token("take")]
    Take,
    #[token("from")]
    From,
    #[token("owns")]
    Owns,
    #[token("assert")]
    Assert,
    #[token("fail")]
    Fail,
    #[token("as")]
    As,
    #[token("adopts")]
    Adopts,
    #[token("consumes")]
    Consumes,
    #[token("duplicable")]
    Duplicable,
    #[token("exclusive")]
    Exclusive,
    #[token("tag")]
    Tag,
    #[token("of")]
    Of,
    #[token("unknown")]
    Unknown,
    #[token("dynamic")]
    Dynamic,
    #[token("empty")]
    Empty,
    #[token("term")]
    KTerm,
    #[token("type")]
    KType,
    #[token("perm")]
    KPerm,

    #[regex(r"-?[0-9]+")]
    NumLit(&'input str),

    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("=")]
    Equals,
    #[token("=>")]
    DoubleArrow,
    #[token("|")]
    Branch,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token("<-")]
    Assign,
    #[token("@")]
    At,
    #[token("*")]
    Star,
    #[token("^")]
    Caret,
    #[token("_")]
    Underscore,

    #[error]
    #[regex(r"--[^\n]*", logos::skip, priority = 2)]
    #[regex(r"[ \t\r\n\f]+", logos::skip, priority = 1)]
    Error,
}

impl<'input> Display for Tok<'input> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tok::UpperIdent(s) => write!(f, "UpperIdentifier({})", s),
            Tok::LowerIdent(s) => write!(f, "LowerIdentifier({})", s),
            Tok::Data => write!(f, "data"),
            Tok::Mutable => write!(f, "mutable"),
            Tok::Abstract => write!(f, "abstract"),
            Tok::Fact => write!(f, "fact"),
            Tok::Val => write!(f, "val"),
            Tok::Open => write!(f, "open"),
            Tok::Let => write!(f, "let"),
            Tok::Rec => write!(f, "rec"),
            Tok::And => write!(f, "and"),
            Tok::In => write!(f, "in"),
            Tok::Fun => write!(f, "fun"),
            Tok::Match => write!(f, "match"),
            Tok::With => write!(f, "with"),
            Tok::End => write!(f, "end"),
            Tok::If => write!(f, "if"),
            Tok::Then => write!(f, "then"),
            Tok::Else => write!(f, "else"),
            Tok::Give => write!(f, "give"),
            Tok::To => write!(f, "to"),
            Tok::Take => write!(f, "take"),
            Tok::From => write!(f, "from"),
            Tok::Owns => write!(f, "owns"),
            Tok::Assert => write!(f, "assert"),
            Tok::Fail => write!(f, "fail"),
            Tok::As => write!(f, "as"),
            Tok::Adopts => write!(f, "adopts"),
            Tok::Consumes => write!(f, "consumes"),
            Tok::Duplicable => write!(f, "duplicable"),
            Tok::Exclusive => write!(f, "exclusive"),
            Tok::Tag => write!(f, "tag"),
            Tok::Of => write!(f, "of"),
            Tok::Unknown => write!(f, "unknown"),
            Tok::Dynamic => write!(f, "dynamic"),
            Tok::Empty => write!(f, "empty"),
            Tok::KTerm => write!(f, "term"),
            Tok::KType => write!(f, "type"),
            Tok::KPerm => write!(f, "perm"),
            Tok::NumLit(s) => write!(f, "NumLiteral({})", s),
            Tok::ParenOpen => write!(f, "("),
            Tok::ParenClose => write!(f, ")"),
            Tok::BraceOpen => write!(f, "{{"),
            Tok::BraceClose => write!(f, "}}"),
            Tok::BracketOpen => write!(f, "["),
            Tok::BracketClose => write!(f, "]"),
            Tok::Comma => write!(f, ","),
            Tok::Semicolon => write!(f, ";"),
            Tok::Colon => write!(f, ":"),
            Tok::Equals => write!(f, "="),
            Tok::DoubleArrow => write!(f, "=>"),
            Tok::Branch => write!(f, "|"),
            Tok::Dot => write!(f, "."),
            Tok::Arrow => write!(f, "->"),
            Tok::Assign => write!(f, "<-"),
            Tok::At => write!(f, "@"),
            Tok::Star => write!(f, "*"),
            Tok::Caret => write!(f, "^"),
            Tok::Underscore => write!(f, "_"),

            Tok::Error => write!(f, "Error"),
        }
    }
}
