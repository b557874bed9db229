//! Kind checking the surface syntax and translating it into the internal
//! representation: declarations install data-type definitions into the
//! environment, types elaborate into the locally-nameless form, terms into
//! core expressions with resolved data constructors.

use super::env::Env;
use super::err::*;
use super::fact;
use super::syntax::*;
use crate::parse::syntax as ps;
use crate::rc;
use mezzo_utils::span::{Span, SpanView};
use std::rc::Rc;

pub type Result<T> = std::result::Result<T, KindError>;

/// Name resolution tables threaded through elaboration and checking.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub types: im::HashMap<TypeV, Var>,
    pub ctors: im::HashMap<CtorV, (Var, usize)>,
    pub terms: im::HashMap<TermV, Var>,
}

/* ---------------------------------- Types ---------------------------------- */

type BoundStack = Vec<(TypeV, Kind)>;

fn lookup_bound(bound: &BoundStack, x: &TypeV) -> Option<(usize, Kind)> {
    bound
        .iter()
        .rev()
        .enumerate()
        .find(|(_, (v, _))| v == x)
        .map(|(i, (_, k))| (i, k.clone()))
}

/// Elaborates a surface type, returning its internal form and kind.
pub fn elab_type(
    env: &Env, scope: &Scope, bound: &BoundStack, ty: &Span<ps::Type>,
) -> Result<(RcType, Kind)> {
    let span = ty.span();
    match ty.inner_ref() {
        ps::Type::Unknown(_) => Ok((Type::unknown(), Kind::Type)),
        ps::Type::Dynamic(_) => Ok((Type::dynamic(), Kind::Type)),
        ps::Type::Empty(_) => Ok((Type::empty(), Kind::Perm)),
        ps::Type::App(ps::TypeApp { tvar, args }) => {
            let (head, head_kind) = match lookup_bound(bound, tvar) {
                Some((i, k)) => (Type::bound(i), k),
                None => match scope.types.get(tvar) {
                    Some(v) => (Type::open(*v), env.kind_of(*v).clone()),
                    None => Err(span
                        .make(KindErrorItem::UnboundTypeVar { tvar: tvar.clone() }))?,
                },
            };
            if args.is_empty() {
                return Ok((head, head_kind));
            }
            let (params, out) = head_kind.flatten();
            if params.len() != args.len() {
                Err(span.make(KindErrorItem::ArityMismatch {
                    context: format!("type application of `{}`", tvar),
                    expected: params.len(),
                    found: args.len(),
                }))?
            }
            let mut elab_args = Vec::new();
            for (arg, expected) in args.iter().zip(params) {
                let (t, k) = elab_type(env, scope, bound, arg)?;
                ensure_kind(arg.span(), format!("argument of `{}`", tvar), expected, &k)?;
                elab_args.push(t);
            }
            Ok((Rc::new(Type::App(TyApp { head, args: elab_args })), out.clone()))
        }
        ps::Type::Forall(ps::Forall { params, ty }) => {
            let mut bound = bound.clone();
            for b in params {
                bound.push((b.var.clone(), b.kind.clone()));
            }
            let (body, kd) = elab_type(env, scope, &bound, ty)?;
            let mut out = body;
            for b in params.iter().rev() {
                out = Rc::new(Type::Forall(Forall {
                    binding: Binding {
                        name: Some(b.var.name().to_string()),
                        kind: b.kind.clone(),
                        flavor: b.flavor,
                        loc: span.clone(),
                    },
                    body: out,
                }));
            }
            Ok((out, kd))
        }
        ps::Type::Exists(ps::Exists { param, ty }) => {
            let mut bound = bound.clone();
            bound.push((param.var.clone(), param.kind.clone()));
            let (body, kd) = elab_type(env, scope, &bound, ty)?;
            Ok((
                Rc::new(Type::Exists(Exists {
                    binding: Binding {
                        name: Some(param.var.name().to_string()),
                        kind: param.kind.clone(),
                        flavor: param.flavor,
                        loc: span.clone(),
                    },
                    body,
                })),
                kd,
            ))
        }
        ps::Type::Tuple(ps::TupleT(tys)) => {
            let mut out = Vec::new();
            for t in tys {
                let (t_, k) = elab_type(env, scope, bound, t)?;
                ensure_kind(t.span(), format!("tuple component"), &Kind::Type, &k)?;
                out.push(t_);
            }
            Ok((Rc::new(Type::Tuple(TupleTy(out))), Kind::Type))
        }
        ps::Type::Concrete(ps::ConcreteT { ctor, fields }) => {
            let datacon = resolve_ctor(scope, ctor, span)?;
            let def = concrete_def(env, datacon.ty);
            let branch = &def.branches[datacon.branch];
            let mut given: Vec<(FieldV, RcType)> = Vec::new();
            for (f, t) in fields {
                if given.iter().any(|(g, _)| g == f) {
                    Err(span.make(KindErrorItem::DuplicateField {
                        ctor: ctor.clone(),
                        field: f.clone(),
                    }))?
                }
                let (t_, k) = elab_type(env, scope, bound, t)?;
                ensure_kind(t.span(), format!("field `{}`", f), &Kind::Type, &k)?;
                given.push((f.clone(), t_));
            }
            let fields = order_fields(branch, given, ctor, span)?;
            let arity = env.kind_of(datacon.ty).flatten().0.len();
            let unknown_args: Vec<RcType> = (0..arity).map(|_| Type::unknown()).collect();
            let adopts = def.adopts.as_ref().map(|t| Type::inst_params(t, &unknown_args));
            Ok((Rc::new(Type::Concrete(Concrete { datacon, fields, adopts })), Kind::Type))
        }
        ps::Type::Singleton(ps::SingletonT(x)) => {
            let v = scope
                .terms
                .get(x)
                .copied()
                .ok_or_else(|| span.make(KindErrorItem::UnboundVar { var: x.clone() }))?;
            Ok((Rc::new(Type::Singleton(Singleton(Type::open(v)))), Kind::Type))
        }
        ps::Type::Arrow(ps::ArrowT(d, c)) => {
            let dom = match d.inner_ref() {
                // consumes is the arrow default; the marker is only
                // checked for position
                ps::Type::Consumes(ps::ConsumesT(t)) => t,
                _ => d,
            };
            let (dom, kd) = elab_type(env, scope, bound, dom)?;
            ensure_kind(d.span(), format!("arrow domain"), &Kind::Type, &kd)?;
            let (cod, kc) = elab_type(env, scope, bound, c)?;
            ensure_kind(c.span(), format!("arrow codomain"), &Kind::Type, &kc)?;
            Ok((Rc::new(Type::Arrow(Arrow(dom, cod))), Kind::Type))
        }
        ps::Type::Bar(ps::BarT { ty, perm }) => {
            let (t, kt) = elab_type(env, scope, bound, ty)?;
            ensure_kind(ty.span(), format!("left of `|`"), &Kind::Type, &kt)?;
            let (p, kp) = elab_type(env, scope, bound, perm)?;
            ensure_kind(perm.span(), format!("right of `|`"), &Kind::Perm, &kp)?;
            Ok((Rc::new(Type::Bar(Bar(t, p))), Kind::Type))
        }
        ps::Type::Anchored(ps::AnchoredT { var, ty }) => {
            let v = scope
                .terms
                .get(var)
                .copied()
                .ok_or_else(|| span.make(KindErrorItem::UnboundVar { var: var.clone() }))?;
            let (t, k) = elab_type(env, scope, bound, ty)?;
            ensure_kind(ty.span(), format!("anchored type"), &Kind::Type, &k)?;
            Ok((Rc::new(Type::Anchored(Anchored(Type::open(v), t))), Kind::Perm))
        }
        ps::Type::Star(ps::StarT(l, r)) => {
            let (lt, kl) = elab_type(env, scope, bound, l)?;
            ensure_kind(l.span(), format!("left of `*`"), &Kind::Perm, &kl)?;
            let (rt, kr) = elab_type(env, scope, bound, r)?;
            ensure_kind(r.span(), format!("right of `*`"), &Kind::Perm, &kr)?;
            Ok((Rc::new(Type::Star(Star(lt, rt))), Kind::Perm))
        }
        ps::Type::Constraint(ps::ConstraintT { mode, arg, ty }) => {
            let (a, _) = elab_type(env, scope, bound, arg)?;
            let (t, k) = elab_type(env, scope, bound, ty)?;
            if !type_is_arrow_like(&t) {
                Err(span.make(KindErrorItem::ImplicationOnNonArrow))?
            }
            let mode = match mode {
                ps::FactMode::Duplicable => Mode::ModeDuplicable,
                ps::FactMode::Exclusive => Mode::ModeExclusive,
            };
            Ok((
                Rc::new(Type::Imply(Imply {
                    constraints: vec![TyConstraint { mode, ty: a }],
                    ty: t,
                })),
                k,
            ))
        }
        ps::Type::Consumes(_) => Err(span.make(KindErrorItem::IllegalConsumes))?,
    }
}

fn type_is_arrow_like(t: &RcType) -> bool {
    match t.as_ref() {
        Type::Arrow(_) => true,
        Type::Forall(Forall { body, .. }) => type_is_arrow_like(body),
        Type::Imply(Imply { ty, .. }) => type_is_arrow_like(ty),
        _ => false,
    }
}

fn ensure_kind(
    span: &mezzo_utils::span::SpanInfo, context: String, expected: &Kind, found: &Kind,
) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(span.make(KindErrorItem::KindMismatch {
            context,
            expected: expected.clone(),
            found: found.clone(),
        }))
    }
}

fn resolve_ctor(
    scope: &Scope, ctor: &CtorV, span: &mezzo_utils::span::SpanInfo,
) -> Result<DataCon> {
    let (ty, branch) = scope
        .ctors
        .get(ctor)
        .copied()
        .ok_or_else(|| span.make(KindErrorItem::UnknownConstructor { ctor: ctor.clone() }))?;
    Ok(DataCon { ty, branch, name: ctor.clone() })
}

fn concrete_def(env: &Env, v: Var) -> DataTypeDef {
    match env.get_definition(v) {
        Some(Definition::Concrete(def)) => def.clone(),
        _ => DataTypeDef { flavor: DataFlavor::Immutable, branches: Vec::new(), adopts: None },
    }
}

/// Reorders the given fields to the branch's declaration order, checking
/// that each is present exactly once.
fn order_fields(
    branch: &Branch, mut given: Vec<(FieldV, RcType)>, ctor: &CtorV,
    span: &mezzo_utils::span::SpanInfo,
) -> Result<Vec<FieldTy>> {
    let mut out = Vec::new();
    for field in &branch.fields {
        match field {
            FieldTy::Value(name, _) => {
                match given.iter().position(|(f, _)| f == name) {
                    Some(i) => {
                        let (f, t) = given.remove(i);
                        out.push(FieldTy::Value(f, t));
                    }
                    None => Err(span.make(KindErrorItem::MissingField {
                        ctor: ctor.clone(),
                        field: name.clone(),
                    }))?,
                }
            }
            FieldTy::Perm(p) => out.push(FieldTy::Perm(p.clone())),
        }
    }
    if let Some((f, _)) = given.into_iter().next() {
        Err(span.make(KindErrorItem::UnknownField { ctor: ctor.clone(), field: f }))?
    }
    Ok(out)
}

/* ------------------------------- Declarations ------------------------------- */

/// Installs a group of mutually recursive data types: binds their type
/// variables, elaborates branches with parameters as de Bruijn indices,
/// and runs fact inference to a fixed point.
pub fn bind_data_group(
    env: &Env, scope: &Scope, group: &ps::DataGroup, span: &mezzo_utils::span::SpanInfo,
) -> Result<(Env, Scope, Vec<Var>)> {
    let ps::DataGroup(decls) = group;
    let mut env = env.clone();
    let mut scope = scope.clone();
    let mut vars = Vec::new();
    for d in decls {
        if d.params.len() > 64 {
            Err(span.make(KindErrorItem::TooManyParameters {
                name: d.name.clone(),
                count: d.params.len(),
            }))?
        }
        if d.adopts.is_some() && d.flavor == DataFlavor::Immutable {
            Err(span.make(KindErrorItem::AdoptsOnImmutable))?
        }
        let kind = Kind::arrows(d.params.iter().map(|(_, k)| k.clone()), Kind::Type);
        let (e, v) = env.bind_rigid(&Binding {
            name: Some(d.name.name().to_string()),
            kind,
            flavor: Flavor::CannotInstantiate,
            loc: span.clone(),
        });
        env = e;
        scope.types.insert(d.name.clone(), v);
        vars.push(v);
    }
    for (d, &v) in decls.iter().zip(&vars) {
        // parameters are visible in the branches; innermost lookup wins so
        // the stack is reversed
        let bound: BoundStack = d.params.iter().rev().cloned().collect();
        let mut branches = Vec::new();
        for (idx, br) in d.ctors.iter().enumerate() {
            let mut fields = Vec::new();
            for (f, t) in &br.fields {
                let (t_, k) = elab_type(&env, &scope, &bound, t)?;
                ensure_kind(t.span(), format!("field `{}`", f), &Kind::Type, &k)?;
                fields.push(FieldTy::Value(f.clone(), t_));
            }
            scope.ctors.insert(br.ctor.clone(), (v, idx));
            branches.push(Branch { name: br.ctor.clone(), fields });
        }
        let adopts = match &d.adopts {
            None => None,
            Some(t) => {
                let (t_, k) = elab_type(&env, &scope, &bound, t)?;
                ensure_kind(t.span(), format!("adopts clause"), &Kind::Type, &k)?;
                Some(t_)
            }
        };
        env = env.update_definition(
            v,
            Definition::Concrete(DataTypeDef { flavor: d.flavor, branches, adopts }),
        );
    }
    let env = fact::infer_group(env, &vars);
    Ok((env, scope, vars))
}

/// Installs an abstract type from an interface; its fact defaults to
/// affine until a `fact` declaration refines it.
pub fn bind_abstract(
    env: &Env, scope: &Scope, decl: &ps::AbstractDecl, span: &mezzo_utils::span::SpanInfo,
) -> Result<(Env, Scope, Var)> {
    let kind = Kind::arrows(decl.params.iter().map(|(_, k)| k.clone()), Kind::Type);
    let (env, v) = env.bind_rigid(&Binding {
        name: Some(decl.name.name().to_string()),
        kind,
        flavor: Flavor::CannotInstantiate,
        loc: span.clone(),
    });
    let env = env.update_definition(v, Definition::Abstract);
    let env = env.set_fact(v, Fact::Affine);
    let mut scope = scope.clone();
    scope.types.insert(decl.name.clone(), v);
    Ok((env, scope, v))
}

pub fn apply_fact_decl(
    env: &Env, scope: &Scope, decl: &ps::FactDecl, span: &mezzo_utils::span::SpanInfo,
) -> Result<Env> {
    let v = scope
        .types
        .get(&decl.name)
        .copied()
        .ok_or_else(|| span.make(KindErrorItem::UnboundTypeVar { tvar: decl.name.clone() }))?;
    let fact = match decl.mode {
        ps::FactMode::Duplicable => Fact::Duplicable(Bitmap::empty()),
        ps::FactMode::Exclusive => Fact::Exclusive,
    };
    Ok(env.set_fact(v, fact))
}

/* ---------------------------------- Terms ---------------------------------- */

pub fn elab_pattern(env: &Env, scope: &Scope, pat: &ps::SpPat) -> Result<SpPat> {
    let span = pat.span();
    let out = match pat.inner_ref() {
        ps::Pattern::Var(x) => Pat::Var(x.clone()),
        ps::Pattern::Wildcard(_) => Pat::Wild,
        ps::Pattern::Tuple(ps::TuplePat(ps)) => Pat::Tuple(
            ps.iter().map(|p| elab_pattern(env, scope, p)).collect::<Result<Vec<_>>>()?,
        ),
        ps::Pattern::Ctor(ps::CtorPat { ctor, fields }) => {
            let datacon = resolve_ctor(scope, ctor, span)?;
            let def = concrete_def(env, datacon.ty);
            let branch = &def.branches[datacon.branch];
            let mut given: Vec<(FieldV, SpPat)> = Vec::new();
            for (f, p) in fields {
                if given.iter().any(|(g, _)| g == f) {
                    Err(span.make(KindErrorItem::DuplicateField {
                        ctor: ctor.clone(),
                        field: f.clone(),
                    }))?
                }
                given.push((f.clone(), elab_pattern(env, scope, p)?));
            }
            // every field of the branch must be matched
            let mut ordered = Vec::new();
            for field in &branch.fields {
                if let FieldTy::Value(name, _) = field {
                    match given.iter().position(|(f, _)| f == name) {
                        Some(i) => ordered.push(given.remove(i)),
                        None => Err(span.make(KindErrorItem::MissingField {
                            ctor: ctor.clone(),
                            field: name.clone(),
                        }))?,
                    }
                }
            }
            if let Some((f, _)) = given.into_iter().next() {
                Err(span.make(KindErrorItem::UnknownField { ctor: ctor.clone(), field: f }))?
            }
            Pat::Ctor { datacon, fields: ordered }
        }
        ps::Pattern::As(ps::AsPat { pat, var }) => {
            Pat::As(Box::new(elab_pattern(env, scope, pat)?), var.clone())
        }
        ps::Pattern::Ann(ps::AnnPat { pat, ty }) => {
            Pat::Ann(Box::new(elab_pattern(env, scope, pat)?), ty.clone())
        }
    };
    Ok(span.make(out))
}

/// The domain type a lambda parameter announces. A `consumes` wrapper is
/// legal here and strips off.
pub fn param_annotation(pat: &SpPat) -> Result<ps::RcType> {
    match pat.inner_ref() {
        Pat::Ann(_, ty) => match ty.inner_ref() {
            ps::Type::Consumes(ps::ConsumesT(t)) => Ok(t.clone()),
            _ => Ok(ty.clone()),
        },
        Pat::As(p, _) => param_annotation(p),
        Pat::Tuple(ps) => {
            let tys = ps.iter().map(param_annotation).collect::<Result<Vec<_>>>()?;
            Ok(rc!(pat.span().make(ps::Type::Tuple(ps::TupleT(tys)))))
        }
        _ => Err(pat.span().make(KindErrorItem::MissingParamAnnotation)),
    }
}

pub fn elab_term(env: &Env, scope: &Scope, tm: &Span<ps::Term>) -> Result<Span<Expr>> {
    let span = tm.span();
    let go = |t: &ps::RcTerm| -> Result<RcExpr> {
        Ok(rc!(elab_term(env, scope, t.as_ref())?))
    };
    let out: Expr = match tm.inner_ref() {
        ps::Term::Var(x) => Expr::Var(x.clone()),
        ps::Term::Lit(l) => Expr::Lit(l.clone()),
        ps::Term::Tuple(ps::Tuple(es)) => {
            Expr::Tuple(es.iter().map(&go).collect::<Result<Vec<_>>>()?)
        }
        ps::Term::Ctor(ps::Ctor { ctor, fields }) => {
            let datacon = resolve_ctor(scope, ctor, span)?;
            let def = concrete_def(env, datacon.ty);
            let branch = &def.branches[datacon.branch];
            let mut given: Vec<(FieldV, RcExpr)> = Vec::new();
            for (f, e) in fields {
                if given.iter().any(|(g, _)| g == f) {
                    Err(span.make(KindErrorItem::DuplicateField {
                        ctor: ctor.clone(),
                        field: f.clone(),
                    }))?
                }
                given.push((f.clone(), go(e)?));
            }
            let mut ordered = Vec::new();
            for field in &branch.fields {
                if let FieldTy::Value(name, _) = field {
                    match given.iter().position(|(f, _)| f == name) {
                        Some(i) => ordered.push(given.remove(i)),
                        None => Err(span.make(KindErrorItem::MissingField {
                            ctor: ctor.clone(),
                            field: name.clone(),
                        }))?,
                    }
                }
            }
            if let Some((f, _)) = given.into_iter().next() {
                Err(span.make(KindErrorItem::UnknownField { ctor: ctor.clone(), field: f }))?
            }
            Expr::Construct(Construct { datacon, fields: ordered })
        }
        ps::Term::Let(ps::Let { rec, binds, body }) => {
            let binds = binds
                .iter()
                .map(|(p, e)| Ok((elab_pattern(env, scope, p)?, go(e)?)))
                .collect::<Result<Vec<_>>>()?;
            Expr::Let(LetE { rec: *rec, binds, body: go(body)? })
        }
        ps::Term::Fun(ps::Fun { tparams, params, ret, body }) => {
            if params.len() != 1 {
                Err(span.make(KindErrorItem::ArityMismatch {
                    context: format!("function parameters (take one, possibly a tuple)"),
                    expected: 1,
                    found: params.len(),
                }))?
            }
            let param = elab_pattern(env, scope, &params[0])?;
            // the annotation must be derivable now
            let _ = param_annotation(&param)?;
            Expr::Lambda(Lambda {
                tparams: tparams.clone(),
                param,
                ret: ret.clone(),
                body: go(body)?,
            })
        }
        ps::Term::App(ps::App { fun, arg }) => {
            Expr::App(AppE { fun: go(fun)?, arg: go(arg)? })
        }
        ps::Term::Inst(ps::Inst { fun, ty }) => {
            Expr::Inst(InstE { fun: go(fun)?, ty: ty.clone() })
        }
        ps::Term::Field(ps::FieldProj { body, field }) => {
            Expr::Access(Access { body: go(body)?, field: field.clone() })
        }
        ps::Term::Assign(ps::Assign { body, field, value }) => Expr::Assign(AssignE {
            body: go(body)?,
            field: field.clone(),
            value: go(value)?,
        }),
        ps::Term::TagOf(ps::TagUpdate { body, ctor }) => {
            let datacon = resolve_ctor(scope, ctor, span)?;
            Expr::AssignTag(AssignTag { body: go(body)?, datacon })
        }
        ps::Term::Give(ps::Give { gift, host }) => {
            Expr::Give(GiveE { gift: go(gift)?, host: go(host)? })
        }
        ps::Term::Take(ps::Take { gift, host }) => {
            Expr::Take(TakeE { gift: go(gift)?, host: go(host)? })
        }
        ps::Term::Owns(ps::Owns { host, gift }) => {
            Expr::Owns(OwnsE { host: go(host)?, gift: go(gift)? })
        }
        ps::Term::Assert(ps::Assert(p)) => Expr::Assert(AssertE(p.clone())),
        ps::Term::Fail(_) => Expr::Fail(FailE),
        ps::Term::If(ps::If { cond, thn, els }) => {
            Expr::If(IfE { cond: go(cond)?, thn: go(thn)?, els: go(els)? })
        }
        ps::Term::Match(ps::Match { scrut, arms }) => {
            let arms = arms
                .iter()
                .map(|ps::Matcher { pat, body }| {
                    Ok((elab_pattern(env, scope, pat)?, go(body)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Expr::Match(MatchE { scrut: go(scrut)?, arms })
        }
        ps::Term::Ann(ps::Ann { body, ty }) => {
            Expr::Constraint(ConstraintE { body: go(body)?, ty: ty.clone() })
        }
        ps::Term::Seq(ps::Seq { fst, snd }) => Expr::Let(LetE {
            rec: false,
            binds: vec![(fst.span().make(Pat::Wild), go(fst)?)],
            body: go(snd)?,
        }),
    };
    Ok(span.make(out))
}
