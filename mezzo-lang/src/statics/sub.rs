//! Subtraction: deciding whether the environment can provide a permission,
//! instantiating flexible variables along the way.
//!
//! `sub_type` never mutates the caller's environment unless it succeeds;
//! every tentative step works on a snapshot.

use super::add;
use super::env::Env;
use super::fact;
use super::syntax::*;
use std::rc::Rc;

/* -------------------------------- Equality -------------------------------- */

/// Syntactic equality modulo instantiated flexible variables.
pub fn equal(env: &Env, t1: &RcType, t2: &RcType) -> bool {
    let t1 = env.modulo_flex(t1);
    let t2 = env.modulo_flex(t2);
    match (t1.as_ref(), t2.as_ref()) {
        (Type::Unknown(_), Type::Unknown(_)) => true,
        (Type::Dynamic(_), Type::Dynamic(_)) => true,
        (Type::Empty(_), Type::Empty(_)) => true,
        (Type::Bound(Bound(i)), Type::Bound(Bound(j))) => i == j,
        (Type::Open(Open(v)), Type::Open(Open(w))) => env.repr(*v) == env.repr(*w),
        (Type::Forall(q1), Type::Forall(q2)) => {
            q1.binding.kind == q2.binding.kind && equal(env, &q1.body, &q2.body)
        }
        (Type::Exists(q1), Type::Exists(q2)) => {
            q1.binding.kind == q2.binding.kind && equal(env, &q1.body, &q2.body)
        }
        (Type::App(a1), Type::App(a2)) => {
            equal(env, &a1.head, &a2.head)
                && a1.args.len() == a2.args.len()
                && a1.args.iter().zip(&a2.args).all(|(x, y)| equal(env, x, y))
        }
        (Type::Tuple(TupleTy(ts1)), Type::Tuple(TupleTy(ts2))) => {
            ts1.len() == ts2.len() && ts1.iter().zip(ts2).all(|(x, y)| equal(env, x, y))
        }
        (Type::Concrete(c1), Type::Concrete(c2)) => {
            c1.datacon == c2.datacon
                && c1.fields.len() == c2.fields.len()
                && c1.fields.iter().zip(&c2.fields).all(|(f1, f2)| match (f1, f2) {
                    (FieldTy::Value(n1, t1), FieldTy::Value(n2, t2)) => {
                        n1 == n2 && equal(env, t1, t2)
                    }
                    (FieldTy::Perm(p1), FieldTy::Perm(p2)) => equal(env, p1, p2),
                    _ => false,
                })
                && equal_adopts(env, &c1.adopts, &c2.adopts)
        }
        (Type::Singleton(Singleton(x)), Type::Singleton(Singleton(y))) => equal(env, x, y),
        (Type::Arrow(Arrow(d1, c1)), Type::Arrow(Arrow(d2, c2))) => {
            equal(env, d1, d2) && equal(env, c1, c2)
        }
        (Type::Bar(Bar(t1, p1)), Type::Bar(Bar(t2, p2))) => {
            equal(env, t1, t2) && equal(env, p1, p2)
        }
        (Type::Anchored(Anchored(x1, t1)), Type::Anchored(Anchored(x2, t2))) => {
            equal(env, x1, x2) && equal(env, t1, t2)
        }
        (Type::Star(Star(l1, r1)), Type::Star(Star(l2, r2))) => {
            equal(env, l1, l2) && equal(env, r1, r2)
        }
        (Type::And(a1), Type::And(a2)) => {
            equal_constraints(env, &a1.constraints, &a2.constraints)
                && equal(env, &a1.ty, &a2.ty)
        }
        (Type::Imply(a1), Type::Imply(a2)) => {
            equal_constraints(env, &a1.constraints, &a2.constraints)
                && equal(env, &a1.ty, &a2.ty)
        }
        _ => false,
    }
}

fn equal_adopts(env: &Env, a1: &Option<RcType>, a2: &Option<RcType>) -> bool {
    match (a1, a2) {
        (None, None) => true,
        (Some(t1), Some(t2)) => equal(env, t1, t2),
        _ => false,
    }
}

fn equal_constraints(env: &Env, c1: &[TyConstraint], c2: &[TyConstraint]) -> bool {
    c1.len() == c2.len()
        && c1
            .iter()
            .zip(c2)
            .all(|(a, b)| a.mode == b.mode && equal(env, &a.ty, &b.ty))
}

/* ------------------------------- Expansions -------------------------------- */

/// Views a type as an application of a defined type, treating a bare
/// variable as a zero-argument application.
pub fn as_app(env: &Env, ty: &RcType) -> Option<(Var, Vec<RcType>)> {
    match env.modulo_flex(ty).as_ref() {
        Type::Open(Open(v)) => {
            let v = env.repr(*v);
            env.get_definition(v).map(|_| (v, Vec::new()))
        }
        Type::App(TyApp { head, args }) => match env.modulo_flex(head).as_ref() {
            Type::Open(Open(v)) => {
                let v = env.repr(*v);
                env.get_definition(v).map(|_| (v, args.clone()))
            }
            _ => None,
        },
        _ => None,
    }
}

/// If the type is an application of a data type with exactly one branch,
/// returns its unfolded structural form.
pub fn expand_if_one_branch(env: &Env, ty: &RcType) -> Option<RcType> {
    let (v, args) = as_app(env, ty)?;
    match env.get_definition(v)? {
        Definition::Concrete(def) if def.branches.len() == 1 => {
            Some(Rc::new(Type::Concrete(def.instantiate_branch(v, 0, &args))))
        }
        _ => None,
    }
}

/* ------------------------------- Constraints ------------------------------- */

pub fn check_constraint(env: &Env, c: &TyConstraint) -> bool {
    match c.mode {
        Mode::ModeDuplicable => fact::is_duplicable(env, &c.ty),
        Mode::ModeExclusive => fact::is_exclusive(env, &c.ty),
    }
}

/// Installs a constraint hypothesis: an abstract type variable gets the
/// requested fact; anything else is left to be checked structurally.
pub fn install_constraint(env: &Env, c: &TyConstraint) -> Env {
    match env.modulo_flex(&c.ty).as_ref() {
        Type::Open(Open(v)) if !matches!(env.kind_of(*v), Kind::Term) => {
            let fact = match c.mode {
                Mode::ModeDuplicable => Fact::Duplicable(Bitmap::empty()),
                Mode::ModeExclusive => Fact::Exclusive,
            };
            env.set_fact(*v, fact)
        }
        _ => env.clone(),
    }
}

/* ------------------------------- Duplicable -------------------------------- */

/// An environment containing only the duplicable portions of `env`; the
/// self-witness of every variable survives. Arrows are compared inside
/// such an environment since functions capture only duplicable state.
pub fn strip_to_duplicable(env: &Env) -> Env {
    let mut out = env.clone();
    for v in env.term_vars() {
        let perms = env.get_permissions(v);
        let kept: im::Vector<RcType> =
            perms.iter().filter(|p| fact::is_duplicable(env, p)).cloned().collect();
        out = out.set_permissions(v, kept);
    }
    let floating: im::Vector<RcType> = env
        .floating_perms()
        .iter()
        .filter(|p| fact::is_duplicable(env, p))
        .cloned()
        .collect();
    out.set_floating_perms(floating)
}

/* ------------------------------- Subtraction ------------------------------- */

type Seen = im::OrdSet<Var>;

/// Does the environment let `x` be used at `ty`? On success the matched
/// permission is consumed unless duplicable. By definition this is
/// `sub_type` on the self-witness of `x`.
pub fn sub(env: &Env, x: Var, ty: &RcType) -> Option<Env> {
    let x = env.repr(x);
    sub_type_seen(env, &Type::singleton(x), ty, &Seen::new())
}

/// Does `t1` provide `t2`?
pub fn sub_type(env: &Env, t1: &RcType, t2: &RcType) -> Option<Env> {
    sub_type_seen(env, t1, t2, &Seen::new())
}

fn sub_type_seen(env: &Env, t1: &RcType, t2: &RcType, seen: &Seen) -> Option<Env> {
    // rule 1: an inconsistent environment proves anything
    if env.is_inconsistent() {
        return Some(env.clone());
    }
    let t1 = env.modulo_flex(t1);
    let t2 = env.modulo_flex(t2);
    // rule 2: trivial
    if equal(env, &t1, &t2) {
        return Some(env.clone());
    }
    // the top type
    if let Type::Unknown(_) = t2.as_ref() {
        return Some(env.clone());
    }
    // rule 3: flexible shortcut; a singleton left-hand side goes through
    // its permission list instead, which can decide the flexible with a
    // structural type rather than the singleton
    let t1_is_singleton_var = match t1.as_ref() {
        Type::Singleton(Singleton(inner)) => {
            matches!(env.modulo_flex(inner).as_ref(), Type::Open(_))
        }
        _ => false,
    };
    if let Type::Open(Open(v)) = t2.as_ref() {
        if !t1_is_singleton_var && env.can_instantiate(*v, &t1) {
            return env.instantiate_flexible(*v, &t1);
        }
    }
    if let Type::Open(Open(v)) = t1.as_ref() {
        if env.can_instantiate(*v, &t2) {
            return env.instantiate_flexible(*v, &t2);
        }
    }
    // rule 4: constraint rewriting
    if let Type::Imply(Imply { constraints, ty }) = t1.as_ref() {
        let t2 = Rc::new(Type::And(And { constraints: constraints.clone(), ty: t2.clone() }));
        return sub_type_seen(env, ty, &t2, seen);
    }
    if let Type::And(And { constraints, ty }) = t2.as_ref() {
        let env = sub_type_seen(env, &t1, ty, seen)?;
        return constraints.iter().all(|c| check_constraint(&env, c)).then_some(env);
    }
    if let Type::And(And { ty, .. }) = t1.as_ref() {
        return sub_type_seen(env, ty, &t2, seen);
    }
    if let Type::Imply(Imply { constraints, ty }) = t2.as_ref() {
        let env = constraints.iter().fold(env.clone(), |env, c| install_constraint(&env, c));
        return sub_type_seen(&env, &t1, ty, seen);
    }
    // rule 5: bind rigid before flexible
    if let Type::Forall(q) = t2.as_ref() {
        let (env, _, body) = env.open_forall(q);
        return sub_type_seen(&env, &t1, &body, seen);
    }
    if let Type::Exists(q) = t1.as_ref() {
        let (env, _, body) = env.open_exists(q);
        return sub_type_seen(&env, &body, &t2, seen);
    }
    if let Type::Forall(q) = t1.as_ref() {
        let (env, _, body) = env.open_forall_flexible(q);
        return sub_type_seen(&env, &body, &t2, seen);
    }
    if let Type::Exists(q) = t2.as_ref() {
        let (env, _, body) = env.open_exists_flexible(q);
        return sub_type_seen(&env, &t1, &body, seen);
    }
    // rule 9: permission bundles
    let (v1, perms1) = Type::collect(&t1);
    let (v2, perms2) = Type::collect(&t2);
    if !perms1.is_empty() || !perms2.is_empty() {
        return add_sub(env, (&v1, perms1), (&v2, perms2), seen);
    }
    // rule 10: singleton unfolding
    if let Type::Singleton(Singleton(inner)) = t1.as_ref() {
        if let Type::Open(Open(x)) = env.modulo_flex(inner).as_ref() {
            return sub_var(env, *x, &t2, seen);
        }
    }
    sub_type_structural(env, &t1, &t2, seen)
}

fn sub_type_structural(env: &Env, t1: &RcType, t2: &RcType, seen: &Seen) -> Option<Env> {
    match (t1.as_ref(), t2.as_ref()) {
        // rule 6: structural congruence
        (Type::Tuple(TupleTy(ts1)), Type::Tuple(TupleTy(ts2))) => {
            if ts1.len() != ts2.len() {
                return None;
            }
            let mut env = env.clone();
            for (a, b) in ts1.iter().zip(ts2) {
                env = sub_type_seen(&env, a, b, seen)?;
            }
            Some(env)
        }
        (Type::Concrete(c1), Type::Concrete(c2)) => {
            if c1.datacon != c2.datacon || c1.fields.len() != c2.fields.len() {
                return None;
            }
            if !equal_adopts(env, &c1.adopts, &c2.adopts) {
                return None;
            }
            let mut env = env.clone();
            for (f1, f2) in c1.fields.iter().zip(&c2.fields) {
                match (f1, f2) {
                    (FieldTy::Value(n1, a), FieldTy::Value(n2, b)) if n1 == n2 => {
                        env = sub_type_seen(&env, a, b, seen)?;
                    }
                    (FieldTy::Perm(a), FieldTy::Perm(b)) => {
                        env = sub_type_seen(&env, a, b, seen)?;
                    }
                    _ => return None,
                }
            }
            Some(env)
        }
        (Type::Arrow(Arrow(d1, c1)), Type::Arrow(Arrow(d2, c2))) => {
            // contravariant domain, covariant codomain, in an environment
            // stripped to its duplicable portion; the domain of the goal is
            // materialized on a fresh variable so that named domains and
            // structural ones line up
            let stripped = strip_to_duplicable(env);
            let (stripped, z) = stripped.bind_term("arg", &mezzo_utils::span::span(0, 0));
            let stripped = add::add_perm(
                &stripped,
                Rc::new(Type::Anchored(Anchored(Type::open(z), d2.clone()))),
            );
            let stripped = sub_type_seen(&stripped, &Type::singleton(z), d1, seen)?;
            let stripped = sub_type_seen(&stripped, c1, c2, seen)?;
            Some(env.import_flex_instantiations(&stripped))
        }
        // rules 7 and 8: applications of defined types
        _ => {
            match (as_app(env, t1), as_app(env, t2)) {
                // rule 7: same head, compare by variance
                (Some((h1, args1)), Some((h2, args2))) if h1 == h2 => {
                    if args1.len() != args2.len() {
                        return None;
                    }
                    let variance = env.get_variance(h1);
                    let mut env = env.clone();
                    for (i, (a, b)) in args1.iter().zip(&args2).enumerate() {
                        match variance.get(i).copied().unwrap_or(Variance::Invariant) {
                            Variance::Covariant => env = sub_type_seen(&env, a, b, seen)?,
                            Variance::Contravariant => env = sub_type_seen(&env, b, a, seen)?,
                            Variance::Invariant => {
                                env = sub_type_seen(&env, a, b, seen)?;
                                env = sub_type_seen(&env, b, a, seen)?;
                            }
                            Variance::Bivariant => {}
                        }
                    }
                    Some(env)
                }
                _ => {
                    // rule 8: concrete against its defining application
                    if let Type::Concrete(c1) = t1.as_ref() {
                        if let Some((h2, args2)) = as_app(env, t2) {
                            if c1.datacon.ty == h2 {
                                if let Some(Definition::Concrete(def)) = env.get_definition(h2)
                                {
                                    let unfolded = def.instantiate_branch(
                                        h2,
                                        c1.datacon.branch,
                                        &args2,
                                    );
                                    return sub_type_seen(
                                        env,
                                        t1,
                                        &Rc::new(Type::Concrete(unfolded)),
                                        seen,
                                    );
                                }
                            }
                            return None;
                        }
                    }
                    // one-branch expansions make the two sides comparable
                    if let Some(t1x) = expand_if_one_branch(env, t1) {
                        if matches!(t2.as_ref(), Type::Concrete(_) | Type::Tuple(_)) {
                            return sub_type_seen(env, &t1x, t2, seen);
                        }
                    }
                    if let Some(t2x) = expand_if_one_branch(env, t2) {
                        if matches!(t1.as_ref(), Type::Concrete(_) | Type::Tuple(_)) {
                            return sub_type_seen(env, t1, &t2x, seen);
                        }
                    }
                    None
                }
            }
        }
    }
}

/* ----------------------------- Permission goals ---------------------------- */

/// Subtracts a permission (kind `Perm`) from the environment.
pub fn sub_perm(env: &Env, p: &RcType) -> Option<Env> {
    sub_perm_seen(env, p, &Seen::new())
}

fn sub_perm_seen(env: &Env, p: &RcType, seen: &Seen) -> Option<Env> {
    if env.is_inconsistent() {
        return Some(env.clone());
    }
    let p = env.modulo_flex(p);
    match p.as_ref() {
        Type::Empty(_) => Some(env.clone()),
        Type::Star(Star(l, r)) => {
            let env = sub_perm_seen(env, l, seen)?;
            sub_perm_seen(&env, r, seen)
        }
        Type::Anchored(Anchored(x, t)) => match env.modulo_flex(x).as_ref() {
            Type::Open(Open(v)) => sub_var(env, *v, t, seen),
            _ => None,
        },
        Type::Open(Open(v)) if env.is_flexible(*v) => {
            env.instantiate_flexible(*v, &Type::empty())
        }
        _ => {
            // search the floating permissions
            let floats = env.floating_perms();
            for (i, q) in floats.iter().enumerate() {
                if equal(env, q, &p) {
                    if fact::is_duplicable(env, q) {
                        return Some(env.clone());
                    }
                    let mut rest = floats.clone();
                    rest.remove(i);
                    return Some(env.set_floating_perms(rest));
                }
            }
            None
        }
    }
}

/* ------------------------------ The add_sub dance --------------------------- */

/// Rule 9. Splits `(t1 | p1*) <= (t2 | p2*)` into a value-side subtraction
/// and an alternation that adds left permissions and subtracts right ones
/// until no more non-flexible progress is possible, then closes remaining
/// flexible permission variables.
fn add_sub(
    env: &Env, (t1, perms1): (&RcType, Vec<RcType>), (t2, perms2): (&RcType, Vec<RcType>),
    seen: &Seen,
) -> Option<Env> {
    let mut env = sub_type_seen(env, t1, t2, seen)?;
    let mut pending_add: Vec<RcType> = perms1;
    let mut pending_sub: Vec<RcType> = perms2;
    loop {
        let mut progress = false;
        // add left permissions whose anchor is no longer flexible
        let mut still = Vec::new();
        for p in pending_add.drain(..) {
            if perm_anchor_flexible(&env, &p) {
                still.push(p);
            } else {
                env = add::add_perm(&env, p);
                progress = true;
            }
        }
        pending_add = still;
        // subtract whatever right permission goes through now
        let mut still = Vec::new();
        for q in pending_sub.drain(..) {
            if perm_is_flexible_var(&env, &q) {
                still.push(q);
                continue;
            }
            match sub_perm_seen(&env, &q, seen) {
                Some(next) => {
                    env = next;
                    progress = true;
                }
                None => still.push(q),
            }
        }
        pending_sub = still;
        if !progress {
            break;
        }
    }
    // close the remaining flexible permission variables
    let flex: Vec<RcType> =
        pending_sub.iter().filter(|q| perm_is_flexible_var(&env, q)).cloned().collect();
    if flex.len() != pending_sub.len() {
        return None;
    }
    match flex.len() {
        0 => {
            for p in pending_add {
                env = add::add_perm(&env, p);
            }
            Some(env)
        }
        1 => {
            let p0 = env.modulo_flex(&flex[0]);
            let Type::Open(Open(v)) = p0.as_ref() else {
                return None;
            };
            let rest = Type::star(pending_add);
            env.instantiate_flexible(*v, &rest)
        }
        _ => None,
    }
}

fn perm_anchor_flexible(env: &Env, p: &RcType) -> bool {
    match env.modulo_flex(p).as_ref() {
        Type::Anchored(Anchored(x, _)) => match env.modulo_flex(x).as_ref() {
            Type::Open(Open(v)) => env.is_flexible(*v),
            _ => false,
        },
        _ => false,
    }
}

fn perm_is_flexible_var(env: &Env, p: &RcType) -> bool {
    match env.modulo_flex(p).as_ref() {
        Type::Open(Open(v)) => env.is_flexible(*v),
        _ => false,
    }
}

/* --------------------------- Permission list search ------------------------- */

/// Rule 11: tries each permission of `x` against the goal, unique
/// permissions first so they are not burned by structural matches that a
/// duplicable permission could satisfy; the matched permission is removed
/// from the list unless duplicable.
fn sub_var(env: &Env, x: Var, goal: &RcType, seen: &Seen) -> Option<Env> {
    if env.is_inconsistent() {
        return Some(env.clone());
    }
    let x = env.repr(x);
    if seen.contains(&x) {
        return None;
    }
    let seen = {
        let mut s = seen.clone();
        s.insert(x);
        s
    };
    let goal = env.modulo_flex(goal);
    // the goal `=x` is the self-witness
    if let Type::Singleton(Singleton(inner)) = goal.as_ref() {
        if let Type::Open(Open(w)) = env.modulo_flex(inner).as_ref() {
            if env.repr(*w) == x {
                return Some(env.clone());
            }
        }
    }
    if let Type::Unknown(_) = goal.as_ref() {
        return Some(env.clone());
    }
    // `=w` with w flexible: w can only be x itself
    if let Type::Singleton(Singleton(inner)) = goal.as_ref() {
        if let Type::Open(Open(w)) = env.modulo_flex(inner).as_ref() {
            if env.is_flexible(*w) && env.can_instantiate(*w, &Type::open(x)) {
                return env.instantiate_flexible(*w, &Type::open(x));
            }
        }
    }
    let perms = env.get_permissions(x);
    // runtime identity comes with any exclusive permission and is not
    // consumed by the match
    if let Type::Dynamic(_) = goal.as_ref() {
        for p in perms.iter() {
            let is_dynamic = matches!(env.modulo_flex(p).as_ref(), Type::Dynamic(_));
            if is_dynamic || fact::is_exclusive(env, p) {
                return Some(env.clone());
            }
        }
        return None;
    }
    for i in ordered_indices(env, &perms) {
        let p = perms[i].clone();
        // skip the self-witness; it cannot prove anything new
        if let Type::Singleton(Singleton(inner)) = env.modulo_flex(&p).as_ref() {
            if let Type::Open(Open(w)) = env.modulo_flex(inner).as_ref() {
                if env.repr(*w) == x {
                    continue;
                }
            }
        }
        let duplicable = fact::is_duplicable(env, &p);
        let attempt = if duplicable {
            env.clone()
        } else {
            let mut rest = perms.clone();
            rest.remove(i);
            env.set_permissions(x, rest)
        };
        if let Some(out) = sub_type_seen(&attempt, &p, &goal, &seen) {
            return Some(out);
        }
    }
    // no permission decides a flexible goal; it falls back to the value
    // itself
    if let Type::Open(Open(v)) = goal.as_ref() {
        if env.can_instantiate(*v, &Type::singleton(x)) {
            return env.instantiate_flexible(*v, &Type::singleton(x));
        }
    }
    None
}

/// Permission-list ordering for the search: non-duplicable permissions
/// first, then duplicable structural ones, then singletons, then `Unknown`;
/// insertion order within a class.
fn ordered_indices(env: &Env, perms: &im::Vector<RcType>) -> Vec<usize> {
    let class = |p: &RcType| -> u8 {
        let p = env.modulo_flex(p);
        match p.as_ref() {
            Type::Unknown(_) => 3,
            Type::Singleton(_) => 2,
            _ => {
                if fact::is_duplicable(env, &p) {
                    1
                } else {
                    0
                }
            }
        }
    };
    let mut idx: Vec<usize> = (0..perms.len()).collect();
    idx.sort_by_key(|&i| class(&perms[i]));
    idx
}
