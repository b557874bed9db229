pub use crate::syntax::*;

use derive_more::From;
use mezzo_utils::span::Span;
use std::rc::Rc;

/* ---------------------------------- Types --------------------------------- */

pub type RcType = Rc<Span<Type>>;

/// `unknown`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unknown;
/// `dynamic`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dynamic;
/// `empty`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Empty;

/// A type name applied to arguments; a bare variable is an application
/// with no arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeApp {
    pub tvar: TypeV,
    pub args: Vec<RcType>,
}

/// A universal binder. `[a] t` binds an instantiable variable, `[^a] t`
/// one that user type applications may not pick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TyBinder {
    pub var: TypeV,
    pub kind: Kind,
    pub flavor: Flavor,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forall {
    pub params: Vec<TyBinder>,
    pub ty: RcType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exists {
    pub param: TyBinder,
    pub ty: RcType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleT(pub Vec<RcType>);

/// `Datacon { f: t; g: u }`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcreteT {
    pub ctor: CtorV,
    pub fields: Vec<(FieldV, RcType)>,
}

/// `=x`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingletonT(pub TermV);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrowT(pub RcType, pub RcType);

/// `(t | p)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarT {
    pub ty: RcType,
    pub perm: RcType,
}

/// `x @ t`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchoredT {
    pub var: TermV,
    pub ty: RcType,
}

/// `p * q`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StarT(pub RcType, pub RcType);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FactMode {
    Duplicable,
    Exclusive,
}

/// `duplicable a => t`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintT {
    pub mode: FactMode,
    pub arg: RcType,
    pub ty: RcType,
}

/// `consumes t`, only meaningful in arrow domains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumesT(pub RcType);

#[derive(From, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Unknown(Unknown),
    Dynamic(Dynamic),
    Empty(Empty),
    App(TypeApp),
    Forall(Forall),
    Exists(Exists),
    Tuple(TupleT),
    Concrete(ConcreteT),
    Singleton(SingletonT),
    Arrow(ArrowT),
    Bar(BarT),
    Anchored(AnchoredT),
    Star(StarT),
    Constraint(ConstraintT),
    Consumes(ConsumesT),
}
impl TypeT for Type {}

/* -------------------------------- Patterns -------------------------------- */

pub type SpPat = Span<Pattern>;

#[derive(Clone, Debug)]
pub struct Wildcard;

#[derive(Clone, Debug)]
pub struct TuplePat(pub Vec<SpPat>);

#[derive(Clone, Debug)]
pub struct CtorPat {
    pub ctor: CtorV,
    pub fields: Vec<(FieldV, SpPat)>,
}

#[derive(Clone, Debug)]
pub struct AsPat {
    pub pat: Box<SpPat>,
    pub var: TermV,
}

#[derive(Clone, Debug)]
pub struct AnnPat {
    pub pat: Box<SpPat>,
    pub ty: RcType,
}

#[derive(From, Clone, Debug)]
pub enum Pattern {
    Var(TermV),
    Wildcard(Wildcard),
    Tuple(TuplePat),
    Ctor(CtorPat),
    As(AsPat),
    Ann(AnnPat),
}
impl PatternT for Pattern {}

/* ---------------------------------- Terms --------------------------------- */

pub type RcTerm = Rc<Span<Term>>;

#[derive(Clone, Debug)]
pub struct Tuple(pub Vec<RcTerm>);

/// `Datacon { f = e; g = e }`
#[derive(Clone, Debug)]
pub struct Ctor {
    pub ctor: CtorV,
    pub fields: Vec<(FieldV, RcTerm)>,
}

#[derive(Clone, Debug)]
pub struct Let {
    pub rec: bool,
    pub binds: Vec<(SpPat, RcTerm)>,
    pub body: RcTerm,
}

/// `fun [a] (p : t) : u = e`
#[derive(Clone, Debug)]
pub struct Fun {
    pub tparams: Vec<TyBinder>,
    pub params: Vec<SpPat>,
    pub ret: RcType,
    pub body: RcTerm,
}

#[derive(Clone, Debug)]
pub struct App {
    pub fun: RcTerm,
    pub arg: RcTerm,
}

/// `f [t]`
#[derive(Clone, Debug)]
pub struct Inst {
    pub fun: RcTerm,
    pub ty: RcType,
}

#[derive(Clone, Debug)]
pub struct FieldProj {
    pub body: RcTerm,
    pub field: FieldV,
}

#[derive(Clone, Debug)]
pub struct Assign {
    pub body: RcTerm,
    pub field: FieldV,
    pub value: RcTerm,
}

/// `tag of e <- Datacon`
#[derive(Clone, Debug)]
pub struct TagUpdate {
    pub body: RcTerm,
    pub ctor: CtorV,
}

#[derive(Clone, Debug)]
pub struct Give {
    pub gift: RcTerm,
    pub host: RcTerm,
}

#[derive(Clone, Debug)]
pub struct Take {
    pub gift: RcTerm,
    pub host: RcTerm,
}

#[derive(Clone, Debug)]
pub struct Owns {
    pub host: RcTerm,
    pub gift: RcTerm,
}

/// `assert p`
#[derive(Clone, Debug)]
pub struct Assert(pub RcType);

#[derive(Clone, Debug)]
pub struct Fail;

#[derive(Clone, Debug)]
pub struct If {
    pub cond: RcTerm,
    pub thn: RcTerm,
    pub els: RcTerm,
}

#[derive(Clone, Debug)]
pub struct Match {
    pub scrut: RcTerm,
    pub arms: Vec<Matcher>,
}

#[derive(Clone, Debug)]
pub struct Matcher {
    pub pat: SpPat,
    pub body: RcTerm,
}

/// `(e : t)`
#[derive(Clone, Debug)]
pub struct Ann {
    pub body: RcTerm,
    pub ty: RcType,
}

#[derive(Clone, Debug)]
pub struct Seq {
    pub fst: RcTerm,
    pub snd: RcTerm,
}

#[derive(From, Clone, Debug)]
pub enum Term {
    Var(TermV),
    Lit(Literal),
    Tuple(Tuple),
    Ctor(Ctor),
    Let(Let),
    Fun(Fun),
    App(App),
    Inst(Inst),
    Field(FieldProj),
    Assign(Assign),
    TagOf(TagUpdate),
    Give(Give),
    Take(Take),
    Owns(Owns),
    Assert(Assert),
    Fail(Fail),
    If(If),
    Match(Match),
    Ann(Ann),
    Seq(Seq),
}
impl TermT for Term {}

/* ------------------------------ Declarations ------------------------------ */

#[derive(Clone, Debug)]
pub struct Open(pub ModV);

/// A group of mutually recursive data declarations chained with `and`.
#[derive(Clone, Debug)]
pub struct DataGroup(pub Vec<Data<TypeV, CtorV, RcType>>);

/// `val p = e`
#[derive(Clone, Debug)]
pub struct Val {
    pub pat: SpPat,
    pub def: RcTerm,
}

/// `val x : t` (interfaces)
#[derive(Clone, Debug)]
pub struct ValSig {
    pub name: TermV,
    pub ty: RcType,
}

/// `abstract t a b` (interfaces)
#[derive(Clone, Debug)]
pub struct AbstractDecl {
    pub name: TypeV,
    pub params: Vec<(TypeV, Kind)>,
}

/// `fact duplicable t` / `fact exclusive t` (interfaces)
#[derive(Clone, Debug)]
pub struct FactDecl {
    pub mode: FactMode,
    pub name: TypeV,
}

#[derive(From, Clone, Debug)]
pub enum Declaration {
    Open(Open),
    Data(DataGroup),
    Val(Val),
    ValSig(ValSig),
    Abstract(AbstractDecl),
    Fact(FactDecl),
}

#[derive(Clone, Debug)]
pub struct Module {
    pub decls: Vec<Span<Declaration>>,
}
