//! The internal representation the checker operates on.
//!
//! Bound variables are de Bruijn indices, free variables are `Open`
//! references into the environment. Opening a quantifier allocates a fresh
//! environment variable and substitutes it for index 0; closing is the
//! inverse.

pub use crate::syntax::*;

use derive_more::From;
use mezzo_utils::span::SpanInfo;
use std::rc::Rc;

/* -------------------------------- Variables ------------------------------- */

/// A reference to a variable bound in the environment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub(crate) usize);

impl Var {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/* ---------------------------------- Types --------------------------------- */

pub type RcType = Rc<Type>;

/// The top type.
#[derive(Clone, Debug)]
pub struct Unknown;

/// The runtime-identity witness.
#[derive(Clone, Debug)]
pub struct Dynamic;

/// A locally bound de Bruijn index. Never escapes into stored permissions.
#[derive(Clone, Debug)]
pub struct Bound(pub usize);

/// A free variable, resolved through the environment.
#[derive(Clone, Debug)]
pub struct Open(pub Var);

/// One quantifier binding: name hint, kind, source location, and whether a
/// user type application may instantiate it.
#[derive(Clone, Debug)]
pub struct Binding {
    pub name: Option<String>,
    pub kind: Kind,
    pub flavor: Flavor,
    pub loc: SpanInfo,
}

impl Binding {
    pub fn fresh(kind: Kind) -> Self {
        Binding {
            name: None,
            kind,
            flavor: Flavor::CanInstantiate,
            loc: mezzo_utils::span::span(0, 0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Forall {
    pub binding: Binding,
    pub body: RcType,
}

#[derive(Clone, Debug)]
pub struct Exists {
    pub binding: Binding,
    pub body: RcType,
}

/// A type head applied to arguments. The head is an `Open` variable naming
/// a defined type, or a `Bound` index under a quantifier.
#[derive(Clone, Debug)]
pub struct TyApp {
    pub head: RcType,
    pub args: Vec<RcType>,
}

#[derive(Clone, Debug)]
pub struct TupleTy(pub Vec<RcType>);

/// A field of a stored concrete type: a named value field or an anonymous
/// permission bundled with the branch.
#[derive(Clone, Debug)]
pub enum FieldTy {
    Value(FieldV, RcType),
    Perm(RcType),
}

/// A resolved data constructor: the defining type and the branch index.
#[derive(Clone, Debug)]
pub struct DataCon {
    pub ty: Var,
    pub branch: usize,
    pub name: CtorV,
}

impl PartialEq for DataCon {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.branch == other.branch
    }
}
impl Eq for DataCon {}

#[derive(Clone, Debug)]
pub struct Concrete {
    pub datacon: DataCon,
    pub fields: Vec<FieldTy>,
    pub adopts: Option<RcType>,
}

/// `=x`: the type of values equal to x. The inner type is an `Open` or
/// `Bound` variable of kind `Term`.
#[derive(Clone, Debug)]
pub struct Singleton(pub RcType);

#[derive(Clone, Debug)]
pub struct Arrow(pub RcType, pub RcType);

/// A value type with an attached permission.
#[derive(Clone, Debug)]
pub struct Bar(pub RcType, pub RcType);

/// `x @ t`: the permission that x may be used at t.
#[derive(Clone, Debug)]
pub struct Anchored(pub RcType, pub RcType);

/// Conjunction of two permissions.
#[derive(Clone, Debug)]
pub struct Star(pub RcType, pub RcType);

/// The trivial permission.
#[derive(Clone, Debug)]
pub struct EmptyPerm;

/// What a mode constraint requests of a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    ModeDuplicable,
    ModeExclusive,
}

#[derive(Clone, Debug)]
pub struct TyConstraint {
    pub mode: Mode,
    pub ty: RcType,
}

/// `c => t` on the left of a subtraction: t holds provided c.
#[derive(Clone, Debug)]
pub struct And {
    pub constraints: Vec<TyConstraint>,
    pub ty: RcType,
}

/// `c => t` on the right: t is usable only once c is established.
#[derive(Clone, Debug)]
pub struct Imply {
    pub constraints: Vec<TyConstraint>,
    pub ty: RcType,
}

#[derive(From, Clone, Debug)]
pub enum Type {
    Unknown(Unknown),
    Dynamic(Dynamic),
    Bound(Bound),
    Open(Open),
    Forall(Forall),
    Exists(Exists),
    App(TyApp),
    Tuple(TupleTy),
    Concrete(Concrete),
    Singleton(Singleton),
    Arrow(Arrow),
    Bar(Bar),
    Anchored(Anchored),
    Star(Star),
    Empty(EmptyPerm),
    And(And),
    Imply(Imply),
}

impl Type {
    pub fn open(v: Var) -> RcType {
        Rc::new(Type::Open(Open(v)))
    }
    pub fn bound(i: usize) -> RcType {
        Rc::new(Type::Bound(Bound(i)))
    }
    pub fn unknown() -> RcType {
        Rc::new(Type::Unknown(Unknown))
    }
    pub fn dynamic() -> RcType {
        Rc::new(Type::Dynamic(Dynamic))
    }
    pub fn empty() -> RcType {
        Rc::new(Type::Empty(EmptyPerm))
    }
    pub fn singleton(v: Var) -> RcType {
        Rc::new(Type::Singleton(Singleton(Type::open(v))))
    }
    pub fn anchored(v: Var, ty: RcType) -> RcType {
        Rc::new(Type::Anchored(Anchored(Type::open(v), ty)))
    }
    pub fn star(ps: impl IntoIterator<Item = RcType>) -> RcType {
        let mut iter = ps.into_iter();
        let Some(first) = iter.next() else { return Type::empty() };
        iter.fold(first, |acc, p| Rc::new(Type::Star(Star(acc, p))))
    }
}

/* ------------------------- Lifting and substitution ------------------------ */

impl Type {
    /// Shifts every bound index at or above `cutoff` by `k`.
    pub fn lift_above(ty: &RcType, cutoff: usize, k: usize) -> RcType {
        if k == 0 {
            return ty.clone();
        }
        Self::map_bound(ty, cutoff, &|i, c| {
            if i >= c {
                Type::bound(i + k)
            } else {
                Type::bound(i)
            }
        })
    }

    pub fn lift(ty: &RcType, k: usize) -> RcType {
        Self::lift_above(ty, 0, k)
    }

    /// Replaces `Bound(i)` by `u`, decrementing deeper indices.
    pub fn subst(ty: &RcType, i: usize, u: &RcType) -> RcType {
        Self::map_bound(ty, i, &|j, c| {
            use std::cmp::Ordering::*;
            match j.cmp(&c) {
                Less => Type::bound(j),
                Equal => Type::lift(u, c),
                Greater => Type::bound(j - 1),
            }
        })
    }

    /// Substitutes `Open(v)` for index 0.
    pub fn open_with(ty: &RcType, v: Var) -> RcType {
        Self::subst(ty, 0, &Type::open(v))
    }

    /// Turns `Open(v)` back into `Bound(0)`, the inverse of `open_with`.
    pub fn close_var(ty: &RcType, v: Var) -> RcType {
        fn go(ty: &RcType, v: Var, depth: usize) -> RcType {
            match ty.as_ref() {
                Type::Open(Open(w)) if *w == v => Type::bound(depth),
                Type::Bound(Bound(i)) if *i >= depth => Type::bound(i + 1),
                _ => Type::map_children(ty, &|t, extra| go(t, v, depth + extra)),
            }
        }
        go(ty, v, 0)
    }

    /// Simultaneous substitution of the parameters of a data-type
    /// definition: `Bound(j)` becomes `args[j]`.
    pub fn inst_params(ty: &RcType, args: &[RcType]) -> RcType {
        fn go(ty: &RcType, args: &[RcType], depth: usize) -> RcType {
            match ty.as_ref() {
                Type::Bound(Bound(i)) if *i >= depth => {
                    let j = *i - depth;
                    if j < args.len() {
                        Type::lift(&args[j], depth)
                    } else {
                        Type::bound(*i - args.len())
                    }
                }
                _ => Type::map_children(ty, &|t, extra| go(t, args, depth + extra)),
            }
        }
        go(ty, args, 0)
    }

    fn map_bound(ty: &RcType, cutoff: usize, f: &impl Fn(usize, usize) -> RcType) -> RcType {
        fn go(ty: &RcType, cutoff: usize, f: &impl Fn(usize, usize) -> RcType) -> RcType {
            match ty.as_ref() {
                Type::Bound(Bound(i)) => f(*i, cutoff),
                _ => Type::map_children(ty, &|t, extra| go(t, cutoff + extra, f)),
            }
        }
        go(ty, cutoff, f)
    }

    /// Rebuilds a node, applying `f` to each child; `f` receives the number
    /// of binders crossed (0 or 1).
    fn map_children(ty: &RcType, f: &impl Fn(&RcType, usize) -> RcType) -> RcType {
        match ty.as_ref() {
            Type::Unknown(_)
            | Type::Dynamic(_)
            | Type::Bound(_)
            | Type::Open(_)
            | Type::Empty(_) => ty.clone(),
            Type::Forall(Forall { binding, body }) => Rc::new(Type::Forall(Forall {
                binding: binding.clone(),
                body: f(body, 1),
            })),
            Type::Exists(Exists { binding, body }) => Rc::new(Type::Exists(Exists {
                binding: binding.clone(),
                body: f(body, 1),
            })),
            Type::App(TyApp { head, args }) => Rc::new(Type::App(TyApp {
                head: f(head, 0),
                args: args.iter().map(|a| f(a, 0)).collect(),
            })),
            Type::Tuple(TupleTy(tys)) => {
                Rc::new(Type::Tuple(TupleTy(tys.iter().map(|t| f(t, 0)).collect())))
            }
            Type::Concrete(Concrete { datacon, fields, adopts }) => {
                Rc::new(Type::Concrete(Concrete {
                    datacon: datacon.clone(),
                    fields: fields
                        .iter()
                        .map(|field| match field {
                            FieldTy::Value(name, t) => FieldTy::Value(name.clone(), f(t, 0)),
                            FieldTy::Perm(p) => FieldTy::Perm(f(p, 0)),
                        })
                        .collect(),
                    adopts: adopts.as_ref().map(|t| f(t, 0)),
                }))
            }
            Type::Singleton(Singleton(t)) => Rc::new(Type::Singleton(Singleton(f(t, 0)))),
            Type::Arrow(Arrow(dom, cod)) => {
                Rc::new(Type::Arrow(Arrow(f(dom, 0), f(cod, 0))))
            }
            Type::Bar(Bar(t, p)) => Rc::new(Type::Bar(Bar(f(t, 0), f(p, 0)))),
            Type::Anchored(Anchored(x, t)) => {
                Rc::new(Type::Anchored(Anchored(f(x, 0), f(t, 0))))
            }
            Type::Star(Star(p, q)) => Rc::new(Type::Star(Star(f(p, 0), f(q, 0)))),
            Type::And(And { constraints, ty }) => Rc::new(Type::And(And {
                constraints: constraints
                    .iter()
                    .map(|TyConstraint { mode, ty }| TyConstraint { mode: *mode, ty: f(ty, 0) })
                    .collect(),
                ty: f(ty, 0),
            })),
            Type::Imply(Imply { constraints, ty }) => Rc::new(Type::Imply(Imply {
                constraints: constraints
                    .iter()
                    .map(|TyConstraint { mode, ty }| TyConstraint { mode: *mode, ty: f(ty, 0) })
                    .collect(),
                ty: f(ty, 0),
            })),
        }
    }

    /// Splits a value type from its attached permissions, flattening `Bar`
    /// and pushing `Star`/`Empty` apart.
    pub fn collect(ty: &RcType) -> (RcType, Vec<RcType>) {
        match ty.as_ref() {
            Type::Bar(Bar(t, p)) => {
                let (t, mut perms) = Self::collect(t);
                Self::collect_perm(p, &mut perms);
                (t, perms)
            }
            _ => (ty.clone(), Vec::new()),
        }
    }

    fn collect_perm(p: &RcType, acc: &mut Vec<RcType>) {
        match p.as_ref() {
            Type::Star(Star(l, r)) => {
                Self::collect_perm(l, acc);
                Self::collect_perm(r, acc);
            }
            Type::Empty(_) => {}
            _ => acc.push(p.clone()),
        }
    }

    /// The free `Open` variables of a type.
    pub fn free_vars(ty: &RcType, acc: &mut std::collections::BTreeSet<Var>) {
        match ty.as_ref() {
            Type::Open(Open(v)) => {
                acc.insert(*v);
            }
            Type::Unknown(_) | Type::Dynamic(_) | Type::Bound(_) | Type::Empty(_) => {}
            Type::Forall(Forall { body, .. }) | Type::Exists(Exists { body, .. }) => {
                Self::free_vars(body, acc)
            }
            Type::App(TyApp { head, args }) => {
                Self::free_vars(head, acc);
                for a in args {
                    Self::free_vars(a, acc);
                }
            }
            Type::Tuple(TupleTy(tys)) => {
                for t in tys {
                    Self::free_vars(t, acc);
                }
            }
            Type::Concrete(Concrete { fields, adopts, .. }) => {
                for field in fields {
                    match field {
                        FieldTy::Value(_, t) | FieldTy::Perm(t) => Self::free_vars(t, acc),
                    }
                }
                if let Some(t) = adopts {
                    Self::free_vars(t, acc);
                }
            }
            Type::Singleton(Singleton(t)) => Self::free_vars(t, acc),
            Type::Arrow(Arrow(dom, cod)) => {
                Self::free_vars(dom, acc);
                Self::free_vars(cod, acc);
            }
            Type::Bar(Bar(t, p)) | Type::Anchored(Anchored(t, p)) | Type::Star(Star(t, p)) => {
                Self::free_vars(t, acc);
                Self::free_vars(p, acc);
            }
            Type::And(And { constraints, ty }) | Type::Imply(Imply { constraints, ty }) => {
                for TyConstraint { ty, .. } in constraints {
                    Self::free_vars(ty, acc);
                }
                Self::free_vars(ty, acc);
            }
        }
    }
}

/* ---------------------------------- Facts --------------------------------- */

/// A bitmap over the parameters of a data type; bit i set means parameter i
/// must be duplicable for the whole type to be duplicable.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitmap(pub u64);

impl Bitmap {
    pub fn empty() -> Self {
        Bitmap(0)
    }
    pub fn get(self, i: usize) -> bool {
        self.0 >> i & 1 == 1
    }
    pub fn set(self, i: usize) -> Self {
        Bitmap(self.0 | 1 << i)
    }
    pub fn union(self, other: Self) -> Self {
        Bitmap(self.0 | other.0)
    }
}

/// The permission discipline of a type. `Fuzzy` is internal to fact
/// inference: it tags a position that reduces to parameter i of the type
/// being recomputed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fact {
    Duplicable(Bitmap),
    Exclusive,
    Affine,
    Fuzzy(usize),
}

impl Fact {
    /// Total ordering of the three primary facts.
    fn rank(self) -> u8 {
        match self {
            Fact::Duplicable(_) => 0,
            Fact::Exclusive => 1,
            Fact::Affine => 2,
            Fact::Fuzzy(_) => 0,
        }
    }
    pub fn leq(self, other: Fact) -> bool {
        self.rank() <= other.rank()
    }
    pub fn is_duplicable(self) -> bool {
        matches!(self, Fact::Duplicable(_))
    }
    pub fn is_exclusive(self) -> bool {
        matches!(self, Fact::Exclusive)
    }
}

/* --------------------------------- Variance -------------------------------- */

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
    Bivariant,
}

impl Variance {
    /// Sign product: composing occurrences through a position of variance
    /// `self`.
    pub fn compose(self, other: Variance) -> Variance {
        use Variance::*;
        match (self, other) {
            (Bivariant, _) | (_, Bivariant) => Bivariant,
            (Invariant, _) | (_, Invariant) => Invariant,
            (Covariant, v) => v,
            (Contravariant, Covariant) => Contravariant,
            (Contravariant, Contravariant) => Covariant,
        }
    }

    /// Combines two occurrences of the same parameter.
    pub fn meet(self, other: Variance) -> Variance {
        use Variance::*;
        match (self, other) {
            (Bivariant, v) | (v, Bivariant) => v,
            (v, w) if v == w => v,
            _ => Invariant,
        }
    }
}

/* ------------------------------- Definitions ------------------------------- */

/// One branch of a concrete definition; field types refer to the type's
/// parameters through `Bound` indices.
#[derive(Clone, Debug)]
pub struct Branch {
    pub name: CtorV,
    pub fields: Vec<FieldTy>,
}

#[derive(Clone, Debug)]
pub struct DataTypeDef {
    pub flavor: DataFlavor,
    pub branches: Vec<Branch>,
    pub adopts: Option<RcType>,
}

impl DataTypeDef {
    pub fn branch_named(&self, name: &CtorV) -> Option<(usize, &Branch)> {
        self.branches.iter().enumerate().find(|(_, br)| &br.name == name)
    }

    /// The unfolded structural form of branch `idx` at arguments `args`.
    pub fn instantiate_branch(&self, ty: Var, idx: usize, args: &[RcType]) -> Concrete {
        let br = &self.branches[idx];
        Concrete {
            datacon: DataCon { ty, branch: idx, name: br.name.clone() },
            fields: br
                .fields
                .iter()
                .map(|field| match field {
                    FieldTy::Value(name, t) => {
                        FieldTy::Value(name.clone(), Type::inst_params(t, args))
                    }
                    FieldTy::Perm(p) => FieldTy::Perm(Type::inst_params(p, args)),
                })
                .collect(),
            adopts: self.adopts.as_ref().map(|t| Type::inst_params(t, args)),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Definition {
    Concrete(DataTypeDef),
    Abstract,
}

/* ------------------------------- Expressions ------------------------------- */

/// Surface types survive into the core expressions: they are elaborated at
/// their point of use, where the scope is known.
pub type SurfType = crate::parse::syntax::RcType;
pub type SurfBinder = crate::parse::syntax::TyBinder;

use mezzo_utils::span::Span;

pub type RcExpr = Rc<Span<Expr>>;
pub type SpPat = Span<Pat>;

#[derive(Clone, Debug)]
pub enum Pat {
    Var(TermV),
    Wild,
    Tuple(Vec<SpPat>),
    Ctor { datacon: DataCon, fields: Vec<(FieldV, SpPat)> },
    As(Box<SpPat>, TermV),
    Ann(Box<SpPat>, SurfType),
}

#[derive(Clone, Debug)]
pub struct Construct {
    pub datacon: DataCon,
    pub fields: Vec<(FieldV, RcExpr)>,
}

#[derive(Clone, Debug)]
pub struct LetE {
    pub rec: bool,
    pub binds: Vec<(SpPat, RcExpr)>,
    pub body: RcExpr,
}

/// One-argument function; multi-parameter surface functions nest.
#[derive(Clone, Debug)]
pub struct Lambda {
    pub tparams: Vec<SurfBinder>,
    pub param: SpPat,
    pub ret: SurfType,
    pub body: RcExpr,
}

#[derive(Clone, Debug)]
pub struct AppE {
    pub fun: RcExpr,
    pub arg: RcExpr,
}

#[derive(Clone, Debug)]
pub struct InstE {
    pub fun: RcExpr,
    pub ty: SurfType,
}

#[derive(Clone, Debug)]
pub struct Access {
    pub body: RcExpr,
    pub field: FieldV,
}

#[derive(Clone, Debug)]
pub struct AssignE {
    pub body: RcExpr,
    pub field: FieldV,
    pub value: RcExpr,
}

/// Changing the tag of an exclusive concrete value in place.
#[derive(Clone, Debug)]
pub struct AssignTag {
    pub body: RcExpr,
    pub datacon: DataCon,
}

#[derive(Clone, Debug)]
pub struct GiveE {
    pub gift: RcExpr,
    pub host: RcExpr,
}

#[derive(Clone, Debug)]
pub struct TakeE {
    pub gift: RcExpr,
    pub host: RcExpr,
}

#[derive(Clone, Debug)]
pub struct OwnsE {
    pub host: RcExpr,
    pub gift: RcExpr,
}

#[derive(Clone, Debug)]
pub struct AssertE(pub SurfType);

#[derive(Clone, Debug)]
pub struct FailE;

#[derive(Clone, Debug)]
pub struct IfE {
    pub cond: RcExpr,
    pub thn: RcExpr,
    pub els: RcExpr,
}

#[derive(Clone, Debug)]
pub struct MatchE {
    pub scrut: RcExpr,
    pub arms: Vec<(SpPat, RcExpr)>,
}

#[derive(Clone, Debug)]
pub struct ConstraintE {
    pub body: RcExpr,
    pub ty: SurfType,
}

#[derive(From, Clone, Debug)]
pub enum Expr {
    Var(TermV),
    Lit(Literal),
    Tuple(Vec<RcExpr>),
    Construct(Construct),
    Let(LetE),
    Lambda(Lambda),
    App(AppE),
    Inst(InstE),
    Access(Access),
    Assign(AssignE),
    AssignTag(AssignTag),
    Give(GiveE),
    Take(TakeE),
    Owns(OwnsE),
    Assert(AssertE),
    Fail(FailE),
    If(IfE),
    Match(MatchE),
    Constraint(ConstraintE),
}
