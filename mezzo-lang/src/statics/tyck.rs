//! The bidirectional expression checker. Each expression is checked
//! against the current environment and yields a fresh variable holding the
//! expression's value; subtraction consumes what the expression needs and
//! addition records what it produces.

use super::add;
use super::elab::{self, Scope};
use super::env::Env;
use super::err::*;
use super::fact;
use super::fmt::show_type;
use super::merge::{self, MergeChild};
use super::sub;
use super::syntax::*;
use mezzo_utils::span::{span, Span, SpanInfo, SpanView};
use std::rc::Rc;

/* ----------------------------------- Ctx ----------------------------------- */

#[derive(Clone)]
pub struct Ctx {
    pub env: Env,
    pub scope: Scope,
    pub trace: Trace,
    pub notes: im::Vector<String>,
}

impl Ctx {
    pub fn new(env: Env, scope: Scope) -> Self {
        Ctx { env, scope, trace: Trace::default(), notes: im::Vector::new() }
    }

    pub fn err(&self, span: &SpanInfo, item: TyckErrorItem) -> TyckError {
        TyckError { item: span.make(item), trace: self.trace.clone() }
    }

    fn push_frame(&mut self, rule: String, subject: String, info: &SpanInfo) {
        self.trace.push(Frame { rule, subject, info: info.clone() });
    }

    fn note(&mut self, s: String) {
        self.notes.push_back(s);
    }

    fn fresh(&mut self, name: &str, loc: &SpanInfo) -> Var {
        let (env, v) = self.env.bind_term(name, loc);
        self.env = env;
        v
    }
}

fn bool_test<E>(b: bool, f: impl FnOnce() -> E) -> Result<(), E> {
    b.then_some(()).ok_or_else(f)
}

/* ---------------------------------- Driver ---------------------------------- */

pub enum Step<'e> {
    SynMode(Ctx, &'e Span<Expr>),
    AnaMode(Ctx, &'e Span<Expr>, RcType),
    Done(Ctx, Var),
}

pub trait TypeCheck: SpanView + Sized {
    fn syn_step(&self, ctx: Ctx) -> Result<Step<'_>, TyckError>;

    fn ana_step(&self, typ: RcType, ctx: Ctx) -> Result<Step<'_>, TyckError> {
        let info = self.span().clone();
        let (mut ctx, v) = self.syn(ctx)?;
        let env = sub::sub(&ctx.env, v, &typ).ok_or_else(|| {
            ctx.err(
                &info,
                TyckErrorItem::ExpectedPermission {
                    var: ctx.env.name_of(v),
                    expected: show_type(&ctx.env, &typ),
                },
            )
        })?;
        ctx.env = add::add(&env, v, typ);
        Ok(Step::Done(ctx, v))
    }

    fn tyck(mut step: Step<'_>) -> Result<(Ctx, Var), TyckError> {
        loop {
            match step {
                Step::SynMode(ctx, e) => step = e.syn_step(ctx)?,
                Step::AnaMode(ctx, e, t) => step = e.ana_step(t, ctx)?,
                Step::Done(ctx, v) => break Ok((ctx, v)),
            }
        }
    }

    fn syn(&self, ctx: Ctx) -> Result<(Ctx, Var), TyckError> {
        Self::tyck(self.syn_step(ctx)?)
    }

    fn ana(&self, typ: RcType, ctx: Ctx) -> Result<(Ctx, Var), TyckError> {
        Self::tyck(self.ana_step(typ, ctx)?)
    }
}

/* --------------------------------- Helpers ---------------------------------- */

fn kind_err(ctx: &Ctx, e: KindError) -> TyckError {
    TyckError { item: e.map(TyckErrorItem::Kind), trace: ctx.trace.clone() }
}

fn builtin_type(ctx: &Ctx, name: &str, info: &SpanInfo) -> Result<RcType, TyckError> {
    let tv = TypeV::new(name.to_string(), span(0, 0));
    let v = ctx.scope.types.get(&tv).copied().ok_or_else(|| {
        ctx.err(info, TyckErrorItem::Kind(KindErrorItem::UnboundTypeVar { tvar: tv.clone() }))
    })?;
    Ok(Type::open(v))
}

fn elab_ty(ctx: &Ctx, ty: &SurfType) -> Result<(RcType, Kind), TyckError> {
    elab::elab_type(&ctx.env, &ctx.scope, &Vec::new(), ty).map_err(|e| kind_err(ctx, e))
}

/// Expands one-branch applications among `v`'s permissions so structural
/// operations see concrete forms.
fn materialize(env: &Env, v: Var) -> Env {
    let perms = env.get_permissions(v);
    for (i, p) in perms.iter().enumerate() {
        if let Some(expanded) = sub::expand_if_one_branch(env, p) {
            let mut rest = perms.clone();
            rest.remove(i);
            let env = env.set_permissions(v, rest);
            return materialize(&add::add(&env, v, expanded), v);
        }
    }
    env.clone()
}

fn find_concrete_with_field(env: &Env, v: Var, field: &FieldV) -> Option<(usize, Concrete)> {
    let perms = env.get_permissions(v);
    for (i, p) in perms.iter().enumerate() {
        if let Type::Concrete(c) = env.modulo_flex(p).as_ref() {
            if c.fields.iter().any(|f| matches!(f, FieldTy::Value(n, _) if n == field)) {
                return Some((i, c.clone()));
            }
        }
    }
    None
}

fn singleton_var(env: &Env, t: &RcType) -> Option<Var> {
    if let Type::Singleton(Singleton(inner)) = env.modulo_flex(t).as_ref() {
        if let Type::Open(Open(v)) = env.modulo_flex(inner).as_ref() {
            return Some(env.repr(*v));
        }
    }
    None
}

/// What the scrutinee of a branching construct is made of.
enum Scrutinee {
    /// An unrefined application of a data type: the permission index, the
    /// defining variable and its arguments.
    App(usize, Var, Vec<RcType>),
    /// Already refined to one branch.
    Known(Var, usize),
}

fn scrutinee_data(env: &Env, v: Var) -> Option<Scrutinee> {
    let perms = env.get_permissions(v);
    for p in perms.iter() {
        if let Type::Concrete(c) = env.modulo_flex(p).as_ref() {
            return Some(Scrutinee::Known(c.datacon.ty, c.datacon.branch));
        }
    }
    for (i, p) in perms.iter().enumerate() {
        if let Some((tv, args)) = sub::as_app(env, p) {
            if matches!(env.get_definition(tv), Some(Definition::Concrete(_))) {
                return Some(Scrutinee::App(i, tv, args));
            }
        }
    }
    None
}

/// Replaces the scrutinee's application permission by the structural form
/// of one branch; refining an already-known tag to a different branch
/// makes the environment inconsistent (the branch is dead).
fn refine_to_branch(env: &Env, v: Var, scrutinee: &Scrutinee, idx: usize) -> Env {
    match scrutinee {
        Scrutinee::App(i, tv, args) => {
            let Some(Definition::Concrete(def)) = env.get_definition(*tv).cloned() else {
                return env.clone();
            };
            let perms = env.get_permissions(v);
            let mut rest = perms.clone();
            rest.remove(*i);
            let env = env.set_permissions(v, rest);
            let concrete = def.instantiate_branch(*tv, idx, args);
            add::add(&env, v, Rc::new(Type::Concrete(concrete)))
        }
        Scrutinee::Known(_, branch) => {
            if *branch == idx {
                env.clone()
            } else {
                env.mark_inconsistent()
            }
        }
    }
}

/* --------------------------------- Patterns --------------------------------- */

/// Unifies a pattern against a variable: tuple patterns merge component
/// singletons, constructor patterns refine the permission to the stated
/// branch, `as` patterns alias.
fn bind_pattern(mut ctx: Ctx, pat: &SpPat, v: Var) -> Result<Ctx, TyckError> {
    let info = pat.span();
    match pat.inner_ref() {
        Pat::Var(x) => {
            ctx.scope.terms.insert(x.clone(), ctx.env.repr(v));
            Ok(ctx)
        }
        Pat::Wild => Ok(ctx),
        Pat::As(p, x) => {
            let mut ctx = bind_pattern(ctx, p, v)?;
            ctx.scope.terms.insert(x.clone(), ctx.env.repr(v));
            Ok(ctx)
        }
        Pat::Ann(p, ty) => {
            let (t, _) = elab_ty(&ctx, ty)?;
            let env = sub::sub(&ctx.env, v, &t).ok_or_else(|| {
                ctx.err(
                    info,
                    TyckErrorItem::ExpectedPermission {
                        var: ctx.env.name_of(v),
                        expected: show_type(&ctx.env, &t),
                    },
                )
            })?;
            ctx.env = add::add(&env, v, t);
            bind_pattern(ctx, p, v)
        }
        Pat::Tuple(ps) => {
            ctx.env = materialize(&ctx.env, v);
            let perms = ctx.env.get_permissions(v);
            let components = perms.iter().find_map(|p| {
                match ctx.env.modulo_flex(p).as_ref() {
                    Type::Tuple(TupleTy(tys)) if tys.len() == ps.len() => Some(tys.clone()),
                    _ => None,
                }
            });
            let Some(components) = components else {
                if ctx.env.is_inconsistent() {
                    return Ok(ctx);
                }
                Err(ctx.err(
                    info,
                    TyckErrorItem::PatternMismatch {
                        context: format!("expected a {}-tuple", ps.len()),
                    },
                ))?
            };
            for (p, t) in ps.iter().zip(&components) {
                match singleton_var(&ctx.env, t) {
                    Some(w) => ctx = bind_pattern(ctx, p, w)?,
                    None => Err(ctx.err(
                        info,
                        TyckErrorItem::PatternMismatch {
                            context: format!("tuple component is not a value"),
                        },
                    ))?,
                }
            }
            Ok(ctx)
        }
        Pat::Ctor { datacon, fields } => {
            let Some(scrutinee) = scrutinee_data(&ctx.env, v) else {
                if ctx.env.is_inconsistent() {
                    return Ok(ctx);
                }
                Err(ctx.err(
                    info,
                    TyckErrorItem::PatternMismatch {
                        context: format!("{} is not a data type value", ctx.env.name_of(v)),
                    },
                ))?
            };
            ctx.env = refine_to_branch(&ctx.env, v, &scrutinee, datacon.branch);
            if ctx.env.is_inconsistent() {
                return Ok(ctx);
            }
            let perms = ctx.env.get_permissions(v);
            let found = perms.iter().find_map(|p| match ctx.env.modulo_flex(p).as_ref() {
                Type::Concrete(c) if c.datacon == *datacon => Some(c.clone()),
                _ => None,
            });
            let Some(c) = found else {
                Err(ctx.err(
                    info,
                    TyckErrorItem::PatternMismatch {
                        context: format!("no {} permission", datacon.name),
                    },
                ))?
            };
            let values: Vec<RcType> = c
                .fields
                .iter()
                .filter_map(|f| match f {
                    FieldTy::Value(_, t) => Some(t.clone()),
                    FieldTy::Perm(_) => None,
                })
                .collect();
            for ((_, p), t) in fields.iter().zip(&values) {
                match singleton_var(&ctx.env, t) {
                    Some(w) => ctx = bind_pattern(ctx, p, w)?,
                    None => Err(ctx.err(
                        info,
                        TyckErrorItem::PatternMismatch {
                            context: format!("field is not a value"),
                        },
                    ))?,
                }
            }
            Ok(ctx)
        }
    }
}

/// Entry point for toplevel `val` bindings.
pub fn bind_toplevel_pattern(ctx: Ctx, pat: &SpPat, v: Var) -> Result<Ctx, TyckError> {
    bind_pattern(ctx, pat, v)
}

/* ------------------------------- Annotations -------------------------------- */

/// Merges an explicit annotation with an inherited one; `unknown` is
/// absorbing, structural forms merge pointwise, anything else must agree.
fn merge_annotations(
    ctx: &Ctx, info: &SpanInfo, t1: &RcType, t2: &RcType,
) -> Result<RcType, TyckError> {
    let a = ctx.env.modulo_flex(t1);
    let b = ctx.env.modulo_flex(t2);
    match (a.as_ref(), b.as_ref()) {
        (Type::Unknown(_), _) => Ok(b.clone()),
        (_, Type::Unknown(_)) => Ok(a.clone()),
        (Type::Tuple(TupleTy(ts1)), Type::Tuple(TupleTy(ts2))) if ts1.len() == ts2.len() => {
            let tys = ts1
                .iter()
                .zip(ts2)
                .map(|(x, y)| merge_annotations(ctx, info, x, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Rc::new(Type::Tuple(TupleTy(tys))))
        }
        (Type::Concrete(c1), Type::Concrete(c2))
            if c1.datacon == c2.datacon && c1.fields.len() == c2.fields.len() =>
        {
            let fields = c1
                .fields
                .iter()
                .zip(&c2.fields)
                .map(|(f1, f2)| match (f1, f2) {
                    (FieldTy::Value(n, x), FieldTy::Value(_, y)) => Ok(FieldTy::Value(
                        n.clone(),
                        merge_annotations(ctx, info, x, y)?,
                    )),
                    (FieldTy::Perm(x), _) => Ok(FieldTy::Perm(x.clone())),
                    (FieldTy::Value(n, x), _) => Ok(FieldTy::Value(n.clone(), x.clone())),
                })
                .collect::<Result<Vec<_>, TyckError>>()?;
            Ok(Rc::new(Type::Concrete(Concrete {
                datacon: c1.datacon.clone(),
                fields,
                adopts: c1.adopts.clone(),
            })))
        }
        _ => {
            if sub::equal(&ctx.env, &a, &b) {
                Ok(a.clone())
            } else {
                Err(ctx.err(
                    info,
                    TyckErrorItem::ConflictingAnnotations {
                        left: show_type(&ctx.env, &a),
                        right: show_type(&ctx.env, &b),
                    },
                ))
            }
        }
    }
}

/* ------------------------------- Expressions -------------------------------- */

impl TypeCheck for Span<Expr> {
    fn syn_step(&self, ctx: Ctx) -> Result<Step<'_>, TyckError> {
        check_expr(self, ctx, None)
    }

    fn ana_step(&self, typ: RcType, ctx: Ctx) -> Result<Step<'_>, TyckError> {
        match self.inner_ref() {
            // branching and annotations propagate the expected type
            Expr::If(_) | Expr::Match(_) | Expr::Constraint(_) | Expr::Let(_) => {
                check_expr(self, ctx, Some(typ))
            }
            _ => {
                let info = self.span().clone();
                let (mut ctx, v) = self.syn(ctx)?;
                let env = sub::sub(&ctx.env, v, &typ).ok_or_else(|| {
                    ctx.err(
                        &info,
                        TyckErrorItem::ExpectedPermission {
                            var: ctx.env.name_of(v),
                            expected: show_type(&ctx.env, &typ),
                        },
                    )
                })?;
                ctx.env = add::add(&env, v, typ);
                Ok(Step::Done(ctx, v))
            }
        }
    }
}

fn check_expr<'e>(
    e: &'e Span<Expr>, mut ctx: Ctx, expected: Option<RcType>,
) -> Result<Step<'e>, TyckError> {
    let info = e.span().clone();
    ctx.push_frame(
        match &expected {
            None => format!("synthesizing {}", expr_label(e.inner_ref())),
            Some(t) => {
                format!("checking {} against {}", expr_label(e.inner_ref()), show_type(&ctx.env, t))
            }
        },
        expr_label(e.inner_ref()).to_string(),
        &info,
    );
    match e.inner_ref() {
        Expr::Var(x) => {
            let v = ctx
                .scope
                .terms
                .get(x)
                .copied()
                .ok_or_else(|| ctx.err(&info, TyckErrorItem::UnboundVar { var: x.clone() }))?;
            let v = ctx.env.repr(v);
            done_or_check(ctx, v, expected, &info)
        }
        Expr::Lit(Literal::Int(_)) => {
            let int = builtin_type(&ctx, "int", &info)?;
            let v = ctx.fresh("lit", &info);
            ctx.env = add::add(&ctx.env, v, int);
            done_or_check(ctx, v, expected, &info)
        }
        Expr::Tuple(es) => {
            let mut vs = Vec::new();
            for e in es {
                let (c, v) = e.syn(ctx)?;
                ctx = c;
                vs.push(v);
            }
            let v = ctx.fresh("tuple", &info);
            let ty = Rc::new(Type::Tuple(TupleTy(
                vs.iter().map(|&w| Type::singleton(w)).collect(),
            )));
            ctx.env = add::add(&ctx.env, v, ty);
            done_or_check(ctx, v, expected, &info)
        }
        Expr::Construct(Construct { datacon, fields }) => {
            let mut vs = Vec::new();
            for (_, e) in fields {
                let (c, v) = e.syn(ctx)?;
                ctx = c;
                vs.push(v);
            }
            let Some(Definition::Concrete(def)) = ctx.env.get_definition(datacon.ty).cloned()
            else {
                Err(ctx.err(
                    &info,
                    TyckErrorItem::Kind(KindErrorItem::UnknownConstructor {
                        ctor: datacon.name.clone(),
                    }),
                ))?
            };
            let adopts = match &def.adopts {
                None => None,
                Some(t) => {
                    let (params, _) = ctx.env.kind_of(datacon.ty).flatten();
                    let params: Vec<Kind> = params.into_iter().cloned().collect();
                    let mut args = Vec::new();
                    for k in params {
                        let (env, a) = ctx.env.bind_flexible(&Binding::fresh(k));
                        ctx.env = env;
                        args.push(Type::open(a));
                    }
                    Some(Type::inst_params(t, &args))
                }
            };
            let names: Vec<FieldV> = def.branches[datacon.branch]
                .fields
                .iter()
                .filter_map(|f| match f {
                    FieldTy::Value(n, _) => Some(n.clone()),
                    FieldTy::Perm(_) => None,
                })
                .collect();
            let v = ctx.fresh(datacon.name.name(), &info);
            let concrete = Concrete {
                datacon: datacon.clone(),
                fields: names
                    .into_iter()
                    .zip(&vs)
                    .map(|(n, &w)| FieldTy::Value(n, Type::singleton(w)))
                    .collect(),
                adopts,
            };
            ctx.env = add::add(&ctx.env, v, Rc::new(Type::Concrete(concrete)));
            done_or_check(ctx, v, expected, &info)
        }
        Expr::Let(LetE { rec, binds, body }) => {
            if *rec {
                let mut pre = Vec::new();
                for (pat, rhs) in binds {
                    let (name, arrow) = rec_signature(&ctx, pat, rhs)?;
                    let v = ctx.fresh(name.name(), pat.span());
                    ctx.env = add::add(&ctx.env, v, arrow);
                    ctx.scope.terms.insert(name, v);
                    pre.push(v);
                }
                for ((_, rhs), &v) in binds.iter().zip(&pre) {
                    let (c, w) = rhs.syn(ctx)?;
                    ctx = c;
                    ctx.env = add::unify(&ctx.env, v, w);
                }
            } else {
                for (pat, rhs) in binds {
                    let (c, v) = rhs.syn(ctx)?;
                    ctx = bind_pattern(c, pat, v)?;
                }
            }
            match expected {
                None => Ok(Step::SynMode(ctx, body)),
                Some(t) => Ok(Step::AnaMode(ctx, body, t)),
            }
        }
        Expr::Lambda(lam) => {
            let (ctx, v) = check_lambda(ctx, lam, &info)?;
            done_or_check(ctx, v, expected, &info)
        }
        Expr::App(AppE { fun, arg }) => {
            let (c, vf) = fun.syn(ctx)?;
            let (c, va) = arg.syn(c)?;
            ctx = c;
            let (ctx, v) = check_app(ctx, vf, va, &info)?;
            done_or_check(ctx, v, expected, &info)
        }
        Expr::Inst(InstE { fun, ty }) => {
            let (c, vf) = fun.syn(ctx)?;
            ctx = c;
            let (t, _) = elab_ty(&ctx, ty)?;
            let (ctx, v) = check_inst(ctx, vf, t, &info)?;
            done_or_check(ctx, v, expected, &info)
        }
        Expr::Access(Access { body, field }) => {
            let (mut ctx, v) = body.syn(ctx)?;
            ctx.env = materialize(&ctx.env, v);
            let Some((_, c)) = find_concrete_with_field(&ctx.env, v, field) else {
                if ctx.env.is_inconsistent() {
                    let w = ctx.fresh("field", &info);
                    return done_or_check(ctx, w, expected, &info);
                }
                Err(ctx.err(&info, TyckErrorItem::NoSuchField { field: field.clone() }))?
            };
            let t = c
                .fields
                .iter()
                .find_map(|f| match f {
                    FieldTy::Value(n, t) if n == field => Some(t.clone()),
                    _ => None,
                })
                .expect("field just found");
            let Some(w) = singleton_var(&ctx.env, &t) else {
                Err(ctx.err(&info, TyckErrorItem::NoSuchField { field: field.clone() }))?
            };
            done_or_check(ctx, w, expected, &info)
        }
        Expr::Assign(AssignE { body, field, value }) => {
            let (c, v) = body.syn(ctx)?;
            let (mut ctx, w) = value.syn(c)?;
            ctx.env = materialize(&ctx.env, v);
            let Some((i, c)) = find_concrete_with_field(&ctx.env, v, field) else {
                if ctx.env.is_inconsistent() {
                    let u = unit_value(&mut ctx, &info);
                    return done_or_check(ctx, u, expected, &info);
                }
                Err(ctx.err(
                    &info,
                    TyckErrorItem::AssignToNonExclusive { field: field.clone() },
                ))?
            };
            let writable = fact::is_exclusive(&ctx.env, &Rc::new(Type::Concrete(c.clone())));
            bool_test(writable, || {
                ctx.err(&info, TyckErrorItem::AssignToNonExclusive { field: field.clone() })
            })?;
            let fields = c
                .fields
                .iter()
                .map(|f| match f {
                    FieldTy::Value(n, t) if n == field => {
                        FieldTy::Value(n.clone(), Type::singleton(w))
                    }
                    f => f.clone(),
                })
                .collect();
            let mut perms = ctx.env.get_permissions(v);
            perms.set(i, Rc::new(Type::Concrete(Concrete { fields, ..c })));
            ctx.env = ctx.env.set_permissions(v, perms);
            let u = unit_value(&mut ctx, &info);
            done_or_check(ctx, u, expected, &info)
        }
        Expr::AssignTag(AssignTag { body, datacon }) => {
            let (mut ctx, v) = body.syn(ctx)?;
            ctx.env = materialize(&ctx.env, v);
            let perms = ctx.env.get_permissions(v);
            let found = perms.iter().enumerate().find_map(|(i, p)| {
                match ctx.env.modulo_flex(p).as_ref() {
                    Type::Concrete(c) if c.datacon.ty == datacon.ty => Some((i, c.clone())),
                    _ => None,
                }
            });
            let Some((i, c)) = found else {
                if ctx.env.is_inconsistent() {
                    let u = unit_value(&mut ctx, &info);
                    return done_or_check(ctx, u, expected, &info);
                }
                Err(ctx.err(
                    &info,
                    TyckErrorItem::AssignToNonExclusive {
                        field: FieldV::new(format!("tag"), info.clone()),
                    },
                ))?
            };
            let writable = fact::is_exclusive(&ctx.env, &Rc::new(Type::Concrete(c.clone())));
            bool_test(writable, || {
                ctx.err(
                    &info,
                    TyckErrorItem::AssignToNonExclusive {
                        field: FieldV::new(format!("tag"), info.clone()),
                    },
                )
            })?;
            let Some(Definition::Concrete(def)) = ctx.env.get_definition(datacon.ty).cloned()
            else {
                Err(ctx.err(&info, TyckErrorItem::MatchScrutineeNotData))?
            };
            let target = &def.branches[datacon.branch];
            let target_names: Vec<FieldV> = target
                .fields
                .iter()
                .filter_map(|f| match f {
                    FieldTy::Value(n, _) => Some(n.clone()),
                    FieldTy::Perm(_) => None,
                })
                .collect();
            let current: Vec<RcType> = c
                .fields
                .iter()
                .filter_map(|f| match f {
                    FieldTy::Value(_, t) => Some(t.clone()),
                    FieldTy::Perm(_) => None,
                })
                .collect();
            bool_test(target_names.len() == current.len(), || {
                ctx.err(
                    &info,
                    TyckErrorItem::TagChangeArity {
                        expected: target_names.len(),
                        found: current.len(),
                    },
                )
            })?;
            let fields = target_names
                .into_iter()
                .zip(current)
                .map(|(n, t)| FieldTy::Value(n, t))
                .collect();
            let mut perms = ctx.env.get_permissions(v);
            perms.set(
                i,
                Rc::new(Type::Concrete(Concrete {
                    datacon: datacon.clone(),
                    fields,
                    adopts: c.adopts.clone(),
                })),
            );
            ctx.env = ctx.env.set_permissions(v, perms);
            let u = unit_value(&mut ctx, &info);
            done_or_check(ctx, u, expected, &info)
        }
        Expr::Give(GiveE { gift, host }) => {
            let (c, g) = gift.syn(ctx)?;
            let (mut ctx, h) = host.syn(c)?;
            let clause = adopts_clause(&ctx, h, &info)?;
            bool_test(fact::is_exclusive(&ctx.env, &clause), || {
                ctx.err(
                    &info,
                    TyckErrorItem::NonExclusiveAdoptee {
                        ty: show_type(&ctx.env, &clause),
                    },
                )
            })?;
            let env = sub::sub(&ctx.env, g, &clause).ok_or_else(|| {
                ctx.err(
                    &info,
                    TyckErrorItem::ExpectedPermission {
                        var: ctx.env.name_of(g),
                        expected: show_type(&ctx.env, &clause),
                    },
                )
            })?;
            ctx.env = add::add(&env, g, Type::dynamic());
            let u = unit_value(&mut ctx, &info);
            done_or_check(ctx, u, expected, &info)
        }
        Expr::Take(TakeE { gift, host }) => {
            let (c, g) = gift.syn(ctx)?;
            let (mut ctx, h) = host.syn(c)?;
            let env = sub::sub(&ctx.env, g, &Type::dynamic()).ok_or_else(|| {
                ctx.err(
                    &info,
                    TyckErrorItem::ExpectedPermission {
                        var: ctx.env.name_of(g),
                        expected: format!("dynamic"),
                    },
                )
            })?;
            ctx.env = env;
            let clause = adopts_clause(&ctx, h, &info)?;
            ctx.env = add::add(&ctx.env, g, clause);
            let u = unit_value(&mut ctx, &info);
            done_or_check(ctx, u, expected, &info)
        }
        Expr::Owns(OwnsE { host, gift }) => {
            let (c, h) = host.syn(ctx)?;
            let (mut ctx, g) = gift.syn(c)?;
            let _ = adopts_clause(&ctx, h, &info)?;
            let env = sub::sub(&ctx.env, g, &Type::dynamic()).ok_or_else(|| {
                ctx.err(
                    &info,
                    TyckErrorItem::ExpectedPermission {
                        var: ctx.env.name_of(g),
                        expected: format!("dynamic"),
                    },
                )
            })?;
            ctx.env = env;
            let bool_ty = builtin_type(&ctx, "bool", &info)?;
            let v = ctx.fresh("owns", &info);
            ctx.env = add::add(&ctx.env, v, bool_ty);
            done_or_check(ctx, v, expected, &info)
        }
        Expr::Assert(AssertE(p)) => {
            let (t, k) = elab_ty(&ctx, p)?;
            bool_test(k == Kind::Perm, || {
                kind_err(
                    &ctx,
                    p.span().make(KindErrorItem::KindMismatch {
                        context: format!("assert"),
                        expected: Kind::Perm,
                        found: k.clone(),
                    }),
                )
            })?;
            let env = sub::sub_perm(&ctx.env, &t).ok_or_else(|| {
                ctx.err(
                    &info,
                    TyckErrorItem::NoSuchPermission { wanted: show_type(&ctx.env, &t) },
                )
            })?;
            ctx.env = add::add_perm(&env, t);
            let u = unit_value(&mut ctx, &info);
            done_or_check(ctx, u, expected, &info)
        }
        Expr::Fail(FailE) => {
            ctx.env = ctx.env.mark_inconsistent();
            let v = ctx.fresh("fail", &info);
            Ok(Step::Done(ctx, v))
        }
        Expr::If(IfE { cond, thn, els }) => {
            let (mut ctx, vc) = cond.syn(ctx)?;
            let Some(scrutinee) = scrutinee_data(&ctx.env, vc) else {
                Err(ctx.err(
                    &info,
                    TyckErrorItem::IfNotTwoBranches { ty: ctx.env.name_of(vc) },
                ))?
            };
            let tv = match &scrutinee {
                Scrutinee::App(_, tv, _) | Scrutinee::Known(tv, _) => *tv,
            };
            let branches = match ctx.env.get_definition(tv) {
                Some(Definition::Concrete(def)) => def.branches.len(),
                _ => 0,
            };
            bool_test(branches == 2, || {
                ctx.err(&info, TyckErrorItem::IfNotTwoBranches { ty: ctx.env.name_of(tv) })
            })?;
            let base = ctx.env.clone();
            // false is the first branch of the definition
            let thn_ctx = Ctx {
                env: refine_to_branch(&base, vc, &scrutinee, 1),
                scope: ctx.scope.clone(),
                trace: ctx.trace.clone(),
                notes: ctx.notes.clone(),
            };
            let els_ctx = Ctx {
                env: refine_to_branch(&base, vc, &scrutinee, 0),
                scope: ctx.scope.clone(),
                trace: ctx.trace.clone(),
                notes: ctx.notes.clone(),
            };
            let (lc, lv) = check_branch(thn, thn_ctx, expected.clone())?;
            let (rc, rv) = check_branch(els, els_ctx, expected.clone())?;
            let (env, v) = merge::merge_envs(
                &base,
                MergeChild { env: lc.env, value: lv },
                MergeChild { env: rc.env, value: rv },
                expected.as_ref(),
            );
            ctx.env = env;
            ctx.notes = lc.notes + rc.notes;
            Ok(Step::Done(ctx, v))
        }
        Expr::Match(MatchE { scrut, arms }) => {
            let (mut ctx, vs) = scrut.syn(ctx)?;
            let base = ctx.env.clone();
            let mut joined: Option<(Env, Var)> = None;
            for (pat, body) in arms {
                let arm_env = match pat.inner_ref() {
                    Pat::Ctor { datacon, .. } => {
                        let Some(scrutinee) = scrutinee_data(&base, vs) else {
                            Err(ctx.err(&info, TyckErrorItem::MatchScrutineeNotData))?
                        };
                        refine_to_branch(&base, vs, &scrutinee, datacon.branch)
                    }
                    _ => base.clone(),
                };
                let arm_ctx = Ctx {
                    env: arm_env,
                    scope: ctx.scope.clone(),
                    trace: ctx.trace.clone(),
                    notes: ctx.notes.clone(),
                };
                let arm_ctx = bind_pattern(arm_ctx, pat, vs)?;
                let (ac, av) = check_branch(body, arm_ctx, expected.clone())?;
                ctx.notes = ac.notes.clone();
                joined = Some(match joined {
                    None => (ac.env, av),
                    Some((env, v)) => merge::merge_envs(
                        &base,
                        MergeChild { env, value: v },
                        MergeChild { env: ac.env, value: av },
                        expected.as_ref(),
                    ),
                });
            }
            let Some((env, v)) = joined else {
                Err(ctx.err(&info, TyckErrorItem::MatchScrutineeNotData))?
            };
            ctx.env = env;
            Ok(Step::Done(ctx, v))
        }
        Expr::Constraint(ConstraintE { body, ty }) => {
            let (t, _) = elab_ty(&ctx, ty)?;
            let t = match expected {
                None => t,
                Some(inherited) => merge_annotations(&ctx, &info, &t, &inherited)?,
            };
            Ok(Step::AnaMode(ctx, body, t))
        }
    }
}

fn expr_label(e: &Expr) -> &'static str {
    match e {
        Expr::Var(_) => "a variable",
        Expr::Lit(_) => "a literal",
        Expr::Tuple(_) => "a tuple",
        Expr::Construct(_) => "a construction",
        Expr::Let(_) => "a let binding",
        Expr::Lambda(_) => "a function",
        Expr::App(_) => "an application",
        Expr::Inst(_) => "a type instantiation",
        Expr::Access(_) => "a field access",
        Expr::Assign(_) => "an assignment",
        Expr::AssignTag(_) => "a tag update",
        Expr::Give(_) => "a give",
        Expr::Take(_) => "a take",
        Expr::Owns(_) => "an ownership test",
        Expr::Assert(_) => "an assertion",
        Expr::Fail(_) => "fail",
        Expr::If(_) => "a conditional",
        Expr::Match(_) => "a match",
        Expr::Constraint(_) => "an annotated expression",
    }
}

fn check_branch(
    body: &Span<Expr>, ctx: Ctx, expected: Option<RcType>,
) -> Result<(Ctx, Var), TyckError> {
    match expected {
        None => body.syn(ctx),
        Some(t) => body.ana(t, ctx),
    }
}

fn done_or_check(
    mut ctx: Ctx, v: Var, expected: Option<RcType>, info: &SpanInfo,
) -> Result<Step<'static>, TyckError> {
    match expected {
        None => Ok(Step::Done(ctx, v)),
        Some(t) => {
            let env = sub::sub(&ctx.env, v, &t).ok_or_else(|| {
                ctx.err(
                    info,
                    TyckErrorItem::ExpectedPermission {
                        var: ctx.env.name_of(v),
                        expected: show_type(&ctx.env, &t),
                    },
                )
            })?;
            ctx.env = add::add(&env, v, t);
            Ok(Step::Done(ctx, v))
        }
    }
}

fn unit_value(ctx: &mut Ctx, info: &SpanInfo) -> Var {
    let v = ctx.fresh("unit", info);
    ctx.env = add::add(&ctx.env, v, Rc::new(Type::Tuple(TupleTy(Vec::new()))));
    v
}

/* --------------------------------- Lambdas ---------------------------------- */

fn check_lambda(ctx: Ctx, lam: &Lambda, info: &SpanInfo) -> Result<(Ctx, Var), TyckError> {
    let Lambda { tparams, param, ret, body } = lam;
    let outer_env = ctx.env.clone();
    let outer_scope = ctx.scope.clone();
    // a function body sees only the duplicable portion of the environment
    let mut env = sub::strip_to_duplicable(&outer_env);
    let mark = env.mark();
    let mut scope = ctx.scope.clone();
    let mut tvars = Vec::new();
    for b in tparams {
        let (e, v) = env.bind_rigid(&Binding {
            name: Some(b.var.name().to_string()),
            kind: b.kind.clone(),
            flavor: b.flavor,
            loc: info.clone(),
        });
        env = e;
        scope.types.insert(b.var.clone(), v);
        tvars.push((b.clone(), v));
    }
    let ann = elab::param_annotation(param).map_err(|e| kind_err(&ctx, e))?;
    let mut inner = Ctx { env, scope, trace: ctx.trace.clone(), notes: ctx.notes.clone() };
    let (dom_ty, kd) = elab_ty(&inner, &ann)?;
    bool_test(kd == Kind::Type, || {
        kind_err(
            &inner,
            ann.span().make(KindErrorItem::KindMismatch {
                context: format!("function domain"),
                expected: Kind::Type,
                found: kd.clone(),
            }),
        )
    })?;
    let p = inner.fresh("arg", info);
    inner.env = add::add(&inner.env, p, dom_ty.clone());
    let inner = bind_pattern(inner, param, p)?;
    let (ret_ty, kr) = elab_ty(&inner, ret)?;
    bool_test(kr == Kind::Type, || {
        kind_err(
            &inner,
            ret.span().make(KindErrorItem::KindMismatch {
                context: format!("function codomain"),
                expected: Kind::Type,
                found: kr.clone(),
            }),
        )
    })?;
    let (checked, _) = body.ana(ret_ty.clone(), inner)?;
    // the arrow names its argument: [arg: term] (=arg | arg @ t) -> u
    let dom = Rc::new(Type::Bar(Bar(
        Type::singleton(p),
        Type::anchored(p, dom_ty),
    )));
    let mut arrow: RcType = Rc::new(Type::Arrow(Arrow(dom, ret_ty)));
    let mut free = std::collections::BTreeSet::new();
    Type::free_vars(&arrow, &mut free);
    let created: Vec<Var> = checked
        .env
        .term_vars()
        .into_iter()
        .filter(|v| v.index() >= mark && free.contains(v))
        .collect();
    for v in created.into_iter().rev() {
        arrow = Rc::new(Type::Forall(Forall {
            binding: Binding {
                name: Some(checked.env.name_of(v)),
                kind: Kind::Term,
                flavor: Flavor::CanInstantiate,
                loc: info.clone(),
            },
            body: Type::close_var(&arrow, v),
        }));
    }
    for (b, v) in tvars.into_iter().rev() {
        arrow = Rc::new(Type::Forall(Forall {
            binding: Binding {
                name: Some(b.var.name().to_string()),
                kind: b.kind.clone(),
                flavor: b.flavor,
                loc: info.clone(),
            },
            body: Type::close_var(&arrow, v),
        }));
    }
    // the ambient environment is untouched by the body, except for
    // flexible variables it decided
    let mut out = Ctx {
        env: outer_env.import_flex_instantiations(&checked.env),
        scope: outer_scope,
        trace: ctx.trace,
        notes: checked.notes,
    };
    let f = out.fresh("fun", info);
    out.env = add::add(&out.env, f, arrow);
    Ok((out, f))
}

/// The arrow a recursive binding announces before its body is checked.
fn rec_signature(ctx: &Ctx, pat: &SpPat, rhs: &RcExpr) -> Result<(TermV, RcType), TyckError> {
    let info = pat.span();
    let name = match pat.inner_ref() {
        Pat::Var(x) => x.clone(),
        _ => Err(ctx.err(
            info,
            TyckErrorItem::PatternMismatch {
                context: format!("a recursive binding names a single function"),
            },
        ))?,
    };
    let Expr::Lambda(Lambda { tparams, param, ret, .. }) = rhs.inner_ref() else {
        Err(ctx.err(
            info,
            TyckErrorItem::PatternMismatch {
                context: format!("a recursive binding must be a function"),
            },
        ))?
    };
    let ann = elab::param_annotation(param).map_err(|e| kind_err(ctx, e))?;
    let mut env = ctx.env.clone();
    let mut scope = ctx.scope.clone();
    let mut tvars = Vec::new();
    for b in tparams {
        let (e, v) = env.bind_rigid(&Binding {
            name: Some(b.var.name().to_string()),
            kind: b.kind.clone(),
            flavor: b.flavor,
            loc: info.clone(),
        });
        env = e;
        scope.types.insert(b.var.clone(), v);
        tvars.push((b.clone(), v));
    }
    let probe = Ctx { env, scope, trace: ctx.trace.clone(), notes: ctx.notes.clone() };
    let (dom, _) = elab_ty(&probe, &ann)?;
    let (cod, _) = elab_ty(&probe, ret)?;
    let mut arrow: RcType = Rc::new(Type::Arrow(Arrow(dom, cod)));
    for (b, v) in tvars.into_iter().rev() {
        arrow = Rc::new(Type::Forall(Forall {
            binding: Binding {
                name: Some(b.var.name().to_string()),
                kind: b.kind.clone(),
                flavor: b.flavor,
                loc: info.clone(),
            },
            body: Type::close_var(&arrow, v),
        }));
    }
    Ok((name, arrow))
}

/* ------------------------------- Applications ------------------------------- */

fn check_app(mut ctx: Ctx, vf: Var, va: Var, info: &SpanInfo) -> Result<(Ctx, Var), TyckError> {
    let perms = ctx.env.get_permissions(vf);
    let mut saw_arrow = false;
    let mut first_domain: Option<String> = None;
    for perm in perms.iter() {
        let mut env = ctx.env.clone();
        let mark = env.mark();
        let mut t = env.modulo_flex(perm);
        let mut pending = Vec::new();
        loop {
            match t.clone().as_ref() {
                Type::Forall(q) => {
                    let (e, _, body) = env.open_forall_flexible(q);
                    env = e;
                    t = env.modulo_flex(&body);
                }
                Type::Imply(Imply { constraints, ty }) => {
                    pending.extend(constraints.iter().cloned());
                    t = env.modulo_flex(ty);
                }
                _ => break,
            }
        }
        let Type::Arrow(Arrow(dom, cod)) = t.as_ref() else {
            continue;
        };
        saw_arrow = true;
        if first_domain.is_none() {
            first_domain = Some(show_type(&env, dom));
        }
        let Some(env2) = sub::sub(&env, va, dom) else {
            continue;
        };
        if !pending.iter().all(|c| sub::check_constraint(&env2, c)) {
            continue;
        }
        let mut out = Ctx { env: env2, ..ctx.clone() };
        for w in out.env.flexibles_since(mark) {
            if !out.env.is_flexible(w) {
                let t = out.env.modulo_flex(&Type::open(w));
                let shown = show_type(&out.env, &t);
                out.note(format!("instantiated {} := {}", out.env.name_of(w), shown));
            }
        }
        let v = out.fresh("ret", info);
        out.env = add::add(&out.env, v, cod.clone());
        return Ok((out, v));
    }
    if saw_arrow {
        Err(ctx.err(
            info,
            TyckErrorItem::ExpectedPermission {
                var: ctx.env.name_of(va),
                expected: first_domain.unwrap_or_else(|| format!("the function's domain")),
            },
        ))
    } else if ctx.env.is_inconsistent() {
        let v = ctx.fresh("ret", info);
        Ok((ctx, v))
    } else {
        Err(ctx.err(info, TyckErrorItem::NotAFunction { found: ctx.env.name_of(vf) }))
    }
}

fn check_inst(
    mut ctx: Ctx, vf: Var, ty: RcType, info: &SpanInfo,
) -> Result<(Ctx, Var), TyckError> {
    let perms = ctx.env.get_permissions(vf);
    for perm in perms.iter() {
        if let Type::Forall(q) = ctx.env.modulo_flex(perm).as_ref() {
            bool_test(q.binding.flavor == Flavor::CanInstantiate, || {
                ctx.err(info, TyckErrorItem::CannotInstantiate)
            })?;
            let (env, w, body) = ctx.env.open_forall_flexible(q);
            let Some(env) = env.instantiate_flexible(w, &ty) else {
                continue;
            };
            let mut out = Ctx { env, ..ctx.clone() };
            let v = out.fresh("inst", info);
            out.env = add::add(&out.env, v, body);
            return Ok((out, v));
        }
    }
    Err(ctx.err(info, TyckErrorItem::NothingToInstantiate { found: ctx.env.name_of(vf) }))
}

/* --------------------------------- Adoption --------------------------------- */

/// The adopts clause of the exclusive permission held by `host`.
fn adopts_clause(ctx: &Ctx, host: Var, info: &SpanInfo) -> Result<RcType, TyckError> {
    let env = &ctx.env;
    let perms = env.get_permissions(host);
    for p in perms.iter() {
        match env.modulo_flex(p).as_ref() {
            Type::Concrete(c) => {
                if let Some(t) = &c.adopts {
                    if fact::is_exclusive(env, p) {
                        return Ok(t.clone());
                    }
                }
            }
            _ => {
                if let Some((tv, args)) = sub::as_app(env, p) {
                    if let Some(Definition::Concrete(def)) = env.get_definition(tv) {
                        if let Some(t) = &def.adopts {
                            if fact::is_exclusive(env, p) {
                                return Ok(Type::inst_params(t, &args));
                            }
                        }
                    }
                }
            }
        }
    }
    Err(ctx.err(info, TyckErrorItem::NoAdoptsClause { host: env.name_of(host) }))
}
