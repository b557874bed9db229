use derive_more::From;
use mezzo_utils::span::{Span, SpanInfo};
use std::rc::Rc;

/* ---------------------------------- Meta ---------------------------------- */

macro_rules! sort {
    ( $Sort:ident ) => {
        pub trait $Sort {}
        impl<T: $Sort> $Sort for Box<T> {}
        impl<T: $Sort> $Sort for Rc<T> {}
        impl<T: $Sort> $Sort for Span<T> {}
        impl<T: $Sort> $Sort for Option<T> {}
        impl $Sort for () {}
    };
}

sort!(VarT);
sort!(KindT);
sort!(TypeT);
sort!(TermT);
sort!(PatternT);

/* --------------------------------- Binders -------------------------------- */

pub mod binder {
    use super::VarT;
    use mezzo_utils::span::{Span, SpanInfo};

    macro_rules! var {
        ( $Var:ident ) => {
            #[derive(Clone, Debug)]
            pub struct $Var(String, SpanInfo);
            impl $Var {
                pub fn new(s: String, span: SpanInfo) -> Self {
                    Self(s, span)
                }
                pub fn name(&self) -> &str {
                    &self.0
                }
            }
            impl From<Span<String>> for $Var {
                fn from(span: Span<String>) -> Self {
                    Self(span.inner, span.info)
                }
            }
            impl std::cmp::PartialEq for $Var {
                fn eq(&self, other: &Self) -> bool {
                    self.0.eq(&other.0)
                }
            }
            impl std::cmp::Eq for $Var {}
            impl std::cmp::PartialOrd for $Var {
                fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                    Some(self.cmp(other))
                }
            }
            impl std::cmp::Ord for $Var {
                fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                    self.0.cmp(&other.0)
                }
            }
            impl std::hash::Hash for $Var {
                fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                    self.0.hash(state);
                }
            }
            impl std::fmt::Display for $Var {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
            impl mezzo_utils::span::SpanView for $Var {
                fn span(&self) -> &SpanInfo {
                    &self.1
                }
            }
        };
    }

    var!(CtorV);
    var!(FieldV);
    var!(ModV);
    var!(TypeV);
    impl VarT for TypeV {}
    var!(TermV);
    impl VarT for TermV {}
}
pub use binder::*;

/* ---------------------------------- Kind ---------------------------------- */

/// The four syntactic kinds: program variables, value types, permission
/// types, and type constructors.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Term,
    Type,
    Perm,
    Arrow(Box<Kind>, Box<Kind>),
}
impl KindT for Kind {}

impl Kind {
    /// The kind of a type constructor over `params`, ending in `kd`.
    pub fn arrows(params: impl DoubleEndedIterator<Item = Kind>, kd: Kind) -> Kind {
        params.rfold(kd, |acc, p| Kind::Arrow(Box::new(p), Box::new(acc)))
    }
    /// Splits an arrow kind into its parameter kinds and result.
    pub fn flatten(&self) -> (Vec<&Kind>, &Kind) {
        let mut params = Vec::new();
        let mut kd = self;
        while let Kind::Arrow(p, k) = kd {
            params.push(p.as_ref());
            kd = k;
        }
        (params, kd)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Term => write!(f, "term"),
            Kind::Type => write!(f, "type"),
            Kind::Perm => write!(f, "perm"),
            Kind::Arrow(k1, k2) => match k1.as_ref() {
                Kind::Arrow(..) => write!(f, "({}) -> {}", k1, k2),
                _ => write!(f, "{} -> {}", k1, k2),
            },
        }
    }
}

/* --------------------------------- Flavors -------------------------------- */

/// Whether a quantifier may be instantiated by a user-written type
/// application.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Flavor {
    CanInstantiate,
    CannotInstantiate,
}

/// The declared mutability of an algebraic data type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataFlavor {
    Immutable,
    Mutable,
}

/* -------------------------------- Literals -------------------------------- */

#[derive(From, Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
}
impl TermT for Literal {}

/* ------------------------------ Declarations ------------------------------ */

/// One algebraic data type of a (mutually recursive) group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Data<TyV: VarT, C, T: TypeT> {
    pub flavor: DataFlavor,
    pub name: TyV,
    pub params: Vec<(TyV, Kind)>,
    pub ctors: Vec<DataBr<C, T>>,
    pub adopts: Option<T>,
}

/// One branch: a constructor and its named fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataBr<C, T: TypeT> {
    pub ctor: C,
    pub fields: Vec<(FieldV, T)>,
}
