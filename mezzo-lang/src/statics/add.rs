//! Addition: assimilating a permission into the environment.
//!
//! Addition never fails; a contradiction (an exclusive permission arriving
//! twice) marks the environment inconsistent instead. Stored concrete and
//! tuple types are unfolded so that every structural component is a
//! singleton naming its own variable.

use super::env::Env;
use super::fact;
use super::sub;
use super::syntax::*;
use std::rc::Rc;

/* --------------------------------- add perm -------------------------------- */

/// Walks `Star`/`Anchored`/`Empty` apart and dispatches each leaf.
pub fn add_perm(env: &Env, p: RcType) -> Env {
    let p = env.modulo_flex(&p);
    match p.as_ref() {
        Type::Empty(_) => env.clone(),
        Type::Star(Star(l, r)) => {
            let env = add_perm(env, l.clone());
            add_perm(&env, r.clone())
        }
        Type::Anchored(Anchored(x, t)) => match env.modulo_flex(x).as_ref() {
            Type::Open(Open(v)) if !env.is_flexible(*v) => add(env, *v, t.clone()),
            // an anchored permission on a flexible variable floats until
            // the variable is decided
            _ => push_floating(env, p.clone()),
        },
        _ => push_floating(env, p.clone()),
    }
}

fn push_floating(env: &Env, p: RcType) -> Env {
    if fact::is_duplicable(env, &p) {
        for q in env.floating_perms().iter() {
            if sub::equal(env, q, &p) {
                return env.clone();
            }
        }
    }
    env.add_floating_perm(p)
}

/* ----------------------------------- add ----------------------------------- */

/// Grants `x @ ty`.
pub fn add(env: &Env, x: Var, ty: RcType) -> Env {
    let x = env.repr(x);
    let ty = env.modulo_flex(&ty);
    let (ty, perms) = Type::collect(&ty);
    let mut env = add_value(&env.clone(), x, ty);
    for p in perms {
        env = add_perm(&env, p);
    }
    env
}

fn add_value(env: &Env, x: Var, ty: RcType) -> Env {
    match ty.as_ref() {
        // x = y: the two variables are the same value
        Type::Singleton(Singleton(inner)) => match env.modulo_flex(inner).as_ref() {
            Type::Open(Open(y)) => unify(env, x, *y),
            _ => env.clone(),
        },
        Type::Exists(q) => {
            let (env, _, body) = env.open_exists(q);
            add(&env, x, body)
        }
        Type::And(And { constraints, ty }) => {
            let env =
                constraints.iter().fold(env.clone(), |env, c| sub::install_constraint(&env, c));
            add(&env, x, ty.clone())
        }
        Type::Concrete(c) => {
            let (env, c) = unfold_concrete(env, c);
            add_concrete(&env, x, c)
        }
        Type::Tuple(TupleTy(tys)) => {
            let (env, tys) = unfold_components(env, tys);
            add_tuple(&env, x, tys)
        }
        _ => {
            // one-branch applications store their structural form
            if let Some(expanded) = sub::expand_if_one_branch(env, &ty) {
                return add_value(env, x, expanded);
            }
            add_plain(env, x, ty)
        }
    }
}

fn add_plain(env: &Env, x: Var, ty: RcType) -> Env {
    let f = fact::fact_of(env, &ty);
    if f.is_exclusive() && has_exclusive(env, x) {
        return env.push_permission(x, ty).mark_inconsistent();
    }
    if clashes_with_existing(env, x, &ty) {
        return env.push_permission(x, ty).mark_inconsistent();
    }
    if f.is_duplicable() && sub::sub(env, x, &ty).is_some() {
        // a duplicable permission already derivable adds nothing
        return env.clone();
    }
    env.push_permission(x, ty)
}

/// The head type constructor of a nominal permission, if any.
fn nominal_head(env: &Env, ty: &RcType) -> Option<Var> {
    match env.modulo_flex(ty).as_ref() {
        Type::Concrete(c) => Some(c.datacon.ty),
        _ => sub::as_app(env, ty).map(|(v, _)| v),
    }
}

/// One value cannot inhabit two distinct named types.
fn clashes_with_existing(env: &Env, x: Var, ty: &RcType) -> bool {
    let Some(h) = nominal_head(env, ty) else { return false };
    env.get_permissions(x)
        .iter()
        .any(|p| matches!(nominal_head(env, p), Some(h2) if h2 != h))
}

fn has_exclusive(env: &Env, x: Var) -> bool {
    env.get_permissions(x).iter().any(|p| fact::is_exclusive(env, p))
}

/* --------------------------------- unfolding -------------------------------- */

/// Hoists a fresh term variable for every structural component that is not
/// already a singleton; anonymous permission fields float out entirely.
fn unfold_concrete(env: &Env, c: &Concrete) -> (Env, Concrete) {
    let mut env = env.clone();
    let mut fields = Vec::new();
    for field in &c.fields {
        match field {
            FieldTy::Value(name, t) => {
                let (e, t) = hoist(&env, t, Some(name.name()));
                env = e;
                fields.push(FieldTy::Value(name.clone(), t));
            }
            FieldTy::Perm(p) => {
                env = add_perm(&env, p.clone());
            }
        }
    }
    (env, Concrete { datacon: c.datacon.clone(), fields, adopts: c.adopts.clone() })
}

fn unfold_components(env: &Env, tys: &[RcType]) -> (Env, Vec<RcType>) {
    let mut env = env.clone();
    let mut out = Vec::new();
    for t in tys {
        let (e, t) = hoist(&env, t, None);
        env = e;
        out.push(t);
    }
    (env, out)
}

/// Returns a singleton for `t`, introducing a fresh point when `t` is not
/// one already.
fn hoist(env: &Env, t: &RcType, name: Option<&str>) -> (Env, RcType) {
    let t = env.modulo_flex(t);
    match t.as_ref() {
        Type::Singleton(_) => (env.clone(), t.clone()),
        _ => {
            let binding = Binding {
                name: name.map(|s| s.to_string()),
                kind: Kind::Term,
                flavor: Flavor::CannotInstantiate,
                loc: mezzo_utils::span::span(0, 0),
            };
            let (env, v) = env.bind_rigid(&binding);
            let env = add(&env, v, t.clone());
            (env, Type::singleton(v))
        }
    }
}

/* -------------------------------- co-unification ---------------------------- */

fn add_concrete(env: &Env, x: Var, c: Concrete) -> Env {
    let exclusive = fact::is_exclusive(env, &Rc::new(Type::Concrete(c.clone())));
    let perms = env.get_permissions(x);
    for p in perms.iter() {
        if let Type::Concrete(existing) = env.modulo_flex(p).as_ref() {
            if existing.datacon == c.datacon {
                // same constructor: the two forms describe one value, so
                // their components must be equal
                if !sub::equal(env, &adopts_ty(&existing.adopts), &adopts_ty(&c.adopts)) {
                    return env.mark_inconsistent();
                }
                let mut env = co_unify_fields(env, &existing.fields, &c.fields);
                if exclusive {
                    // an exclusive form arrived twice
                    env = env.mark_inconsistent();
                }
                return env;
            }
            if existing.datacon.ty == c.datacon.ty {
                // one value, two tags
                return env.push_permission(x, Rc::new(Type::Concrete(c))).mark_inconsistent();
            }
        }
    }
    if exclusive && has_exclusive(env, x) {
        return env.push_permission(x, Rc::new(Type::Concrete(c))).mark_inconsistent();
    }
    if clashes_with_existing(env, x, &Rc::new(Type::Concrete(c.clone()))) {
        return env.push_permission(x, Rc::new(Type::Concrete(c))).mark_inconsistent();
    }
    env.push_permission(x, Rc::new(Type::Concrete(c)))
}

fn adopts_ty(a: &Option<RcType>) -> RcType {
    a.clone().unwrap_or_else(Type::unknown)
}

fn add_tuple(env: &Env, x: Var, tys: Vec<RcType>) -> Env {
    let perms = env.get_permissions(x);
    for p in perms.iter() {
        if let Type::Tuple(TupleTy(existing)) = env.modulo_flex(p).as_ref() {
            if existing.len() == tys.len() {
                let fields1: Vec<FieldTy> =
                    existing.iter().map(|t| FieldTy::Perm(t.clone())).collect();
                let fields2: Vec<FieldTy> = tys.iter().map(|t| FieldTy::Perm(t.clone())).collect();
                return co_unify_fields(env, &fields1, &fields2);
            }
        }
    }
    env.push_permission(x, Rc::new(Type::Tuple(TupleTy(tys))))
}

/// Merges the points behind two unfolded structural forms, propagating the
/// equalities component by component.
fn co_unify_fields(env: &Env, fields1: &[FieldTy], fields2: &[FieldTy]) -> Env {
    let mut env = env.clone();
    for (f1, f2) in fields1.iter().zip(fields2.iter()) {
        let (t1, t2) = match (f1, f2) {
            (FieldTy::Value(_, t1), FieldTy::Value(_, t2)) => (t1, t2),
            (FieldTy::Perm(t1), FieldTy::Perm(t2)) => (t1, t2),
            _ => continue,
        };
        match (env.modulo_flex(t1).as_ref(), env.modulo_flex(t2).as_ref()) {
            (Type::Singleton(Singleton(a)), Type::Singleton(Singleton(b))) => {
                match (env.modulo_flex(a).as_ref(), env.modulo_flex(b).as_ref()) {
                    (Type::Open(Open(va)), Type::Open(Open(vb))) => {
                        env = unify(&env, *va, *vb);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    env
}

/* ---------------------------------- unify ----------------------------------- */

/// Union-find-style merge of two term variables that stand for the same
/// value.
pub fn unify(env: &Env, x: Var, y: Var) -> Env {
    let rx = env.repr(x);
    let ry = env.repr(y);
    if rx == ry {
        return env.clone();
    }
    let env = env.merge_left(rx, ry);
    compress(&env, rx)
}

/// After a merge the combined list may hold two structural forms of the
/// same value; co-unify them and restore the one-exclusive invariant.
fn compress(env: &Env, x: Var) -> Env {
    let mut env = env.clone();
    loop {
        let perms = env.get_permissions(x);
        let mut merged = None;
        'outer: for i in 0..perms.len() {
            for j in (i + 1)..perms.len() {
                let pi = env.modulo_flex(&perms[i]);
                let pj = env.modulo_flex(&perms[j]);
                match (pi.as_ref(), pj.as_ref()) {
                    (Type::Concrete(c1), Type::Concrete(c2)) if c1.datacon == c2.datacon => {
                        let mut e = co_unify_fields(&env, &c1.fields, &c2.fields);
                        if !sub::equal(&e, &adopts_ty(&c1.adopts), &adopts_ty(&c2.adopts)) {
                            e = e.mark_inconsistent();
                        }
                        merged = Some((e, j));
                        break 'outer;
                    }
                    (Type::Tuple(TupleTy(ts1)), Type::Tuple(TupleTy(ts2)))
                        if ts1.len() == ts2.len() =>
                    {
                        let fields1: Vec<FieldTy> =
                            ts1.iter().map(|t| FieldTy::Perm(t.clone())).collect();
                        let fields2: Vec<FieldTy> =
                            ts2.iter().map(|t| FieldTy::Perm(t.clone())).collect();
                        let e = co_unify_fields(&env, &fields1, &fields2);
                        merged = Some((e, j));
                        break 'outer;
                    }
                    _ => {}
                }
            }
        }
        match merged {
            Some((e, j)) => {
                let mut perms = e.get_permissions(x);
                if j < perms.len() {
                    perms.remove(j);
                }
                env = e.set_permissions(x, perms);
            }
            None => break,
        }
    }
    let exclusives = env
        .get_permissions(x)
        .iter()
        .filter(|p| fact::is_exclusive(&env, p))
        .count();
    if exclusives > 1 {
        env.mark_inconsistent()
    } else {
        env
    }
}
