//! Reconciling two environments at a control-flow join.
//!
//! The children diverged from a common snapshot; the join keeps, for every
//! variable of that snapshot, the syntactic intersection of the two
//! permission lists. Permissions mentioning branch-local variables cannot
//! be expressed at the join and are dropped. An annotation at the join
//! biases the merge: it is subtracted in both children and anchors the
//! join variable.

use super::add;
use super::env::Env;
use super::sub;
use super::syntax::*;

pub struct MergeChild {
    pub env: Env,
    pub value: Var,
}

/// Merges two child environments over the `base` snapshot, returning the
/// join environment and the variable standing for the joined value.
pub fn merge_envs(
    base: &Env, left: MergeChild, right: MergeChild, annotation: Option<&RcType>,
) -> (Env, Var) {
    // a dead branch does not constrain the join
    if left.env.is_inconsistent() {
        return (right.env, right.value);
    }
    if right.env.is_inconsistent() {
        return (left.env, left.value);
    }
    let mark = base.mark();
    let env = base.clone();

    // both branches may return a variable that predates the split
    let l = left.env.repr(left.value);
    let r = right.env.repr(right.value);
    let (mut env, dest, fresh) = if l == r && l.index() < mark {
        (env, l, false)
    } else {
        let (e, v) = env.bind_term("join", &mezzo_utils::span::span(0, 0));
        (e, v, true)
    };

    // intersect the permission lists of every pre-split term variable
    for v in base.term_vars() {
        let perms1 = left.env.get_permissions(v);
        let perms2 = right.env.get_permissions(v);
        let mut kept = im::Vector::new();
        kept.push_back(Type::singleton(v));
        for p1 in perms1.iter() {
            if is_self_singleton(&left.env, v, p1) {
                continue;
            }
            let matched = perms2
                .iter()
                .any(|p2| equal_across(&left.env, p1, &right.env, p2, (l, r), mark));
            if !matched {
                continue;
            }
            if let Some(p) = translate(&left.env, p1, mark, (l, dest)) {
                kept.push_back(p);
            }
        }
        env = env.set_permissions(v, kept);
    }

    // intersect the floating permissions
    let mut floating = im::Vector::new();
    for p1 in left.env.floating_perms().iter() {
        let matched = right
            .env
            .floating_perms()
            .iter()
            .any(|p2| equal_across(&left.env, p1, &right.env, p2, (l, r), mark));
        if matched {
            if let Some(p) = translate(&left.env, p1, mark, (l, dest)) {
                floating.push_back(p);
            }
        }
    }
    env = env.set_floating_perms(floating);

    // flexible variables instantiated in one branch only are re-opened;
    // agreeing instantiations are retained
    for v in base.flexibles_since(0) {
        let il = resolved(&left.env, v);
        let ir = resolved(&right.env, v);
        match (il, ir) {
            (Some(tl), Some(tr)) => {
                if equal_across(&left.env, &tl, &right.env, &tr, (l, r), mark) {
                    if let Some(t) = translate(&left.env, &tl, mark, (l, dest)) {
                        if let Some(e) = env.instantiate_flexible(v, &t) {
                            env = e;
                        }
                    }
                }
            }
            _ => {
                // at least one branch left it open; so does the join
            }
        }
    }

    // the join value: annotation-first, intersection otherwise
    if fresh {
        if let Some(t) = annotation {
            let ok_l = sub::sub(&left.env, l, t).is_some();
            let ok_r = sub::sub(&right.env, r, t).is_some();
            if ok_l && ok_r {
                let env = add::add(&env, dest, t.clone());
                return (env, dest);
            }
        }
        let perms1 = left.env.get_permissions(l);
        let perms2 = right.env.get_permissions(r);
        for p1 in perms1.iter() {
            if is_self_singleton(&left.env, l, p1) {
                continue;
            }
            let matched = perms2
                .iter()
                .any(|p2| equal_across(&left.env, p1, &right.env, p2, (l, r), mark));
            if !matched {
                continue;
            }
            if let Some(p) = translate(&left.env, p1, mark, (l, dest)) {
                env = add::add(&env, dest, p);
            }
        }
    }
    (env, dest)
}

fn is_self_singleton(env: &Env, v: Var, p: &RcType) -> bool {
    if let Type::Singleton(Singleton(inner)) = env.modulo_flex(p).as_ref() {
        if let Type::Open(Open(w)) = env.modulo_flex(inner).as_ref() {
            return env.repr(*w) == env.repr(v);
        }
    }
    false
}

fn resolved(env: &Env, v: Var) -> Option<RcType> {
    let t = env.modulo_flex(&Type::open(v));
    match t.as_ref() {
        Type::Open(Open(w)) if env.repr(*w) == env.repr(v) => None,
        _ => Some(t),
    }
}

/// Structural equality of a type in the left environment against one in
/// the right. Variables compare equal when they are the same pre-split
/// variable, or when they are the two join values.
fn equal_across(
    e1: &Env, t1: &RcType, e2: &Env, t2: &RcType, values: (Var, Var), mark: usize,
) -> bool {
    let t1 = e1.modulo_flex(t1);
    let t2 = e2.modulo_flex(t2);
    match (t1.as_ref(), t2.as_ref()) {
        (Type::Unknown(_), Type::Unknown(_)) => true,
        (Type::Dynamic(_), Type::Dynamic(_)) => true,
        (Type::Empty(_), Type::Empty(_)) => true,
        (Type::Bound(Bound(i)), Type::Bound(Bound(j))) => i == j,
        (Type::Open(Open(v)), Type::Open(Open(w))) => {
            let v = e1.repr(*v);
            let w = e2.repr(*w);
            (v == w && v.index() < mark) || (v == values.0 && w == values.1)
        }
        (Type::Forall(q1), Type::Forall(q2)) => {
            q1.binding.kind == q2.binding.kind
                && equal_across(e1, &q1.body, e2, &q2.body, values, mark)
        }
        (Type::Exists(q1), Type::Exists(q2)) => {
            q1.binding.kind == q2.binding.kind
                && equal_across(e1, &q1.body, e2, &q2.body, values, mark)
        }
        (Type::App(a1), Type::App(a2)) => {
            equal_across(e1, &a1.head, e2, &a2.head, values, mark)
                && a1.args.len() == a2.args.len()
                && a1
                    .args
                    .iter()
                    .zip(&a2.args)
                    .all(|(x, y)| equal_across(e1, x, e2, y, values, mark))
        }
        (Type::Tuple(TupleTy(ts1)), Type::Tuple(TupleTy(ts2))) => {
            ts1.len() == ts2.len()
                && ts1
                    .iter()
                    .zip(ts2)
                    .all(|(x, y)| equal_across(e1, x, e2, y, values, mark))
        }
        (Type::Concrete(c1), Type::Concrete(c2)) => {
            c1.datacon == c2.datacon
                && c1.fields.len() == c2.fields.len()
                && c1.fields.iter().zip(&c2.fields).all(|(f1, f2)| match (f1, f2) {
                    (FieldTy::Value(n1, a), FieldTy::Value(n2, b)) => {
                        n1 == n2 && equal_across(e1, a, e2, b, values, mark)
                    }
                    (FieldTy::Perm(a), FieldTy::Perm(b)) => {
                        equal_across(e1, a, e2, b, values, mark)
                    }
                    _ => false,
                })
                && match (&c1.adopts, &c2.adopts) {
                    (None, None) => true,
                    (Some(a), Some(b)) => equal_across(e1, a, e2, b, values, mark),
                    _ => false,
                }
        }
        (Type::Singleton(Singleton(a)), Type::Singleton(Singleton(b))) => {
            equal_across(e1, a, e2, b, values, mark)
        }
        (Type::Arrow(Arrow(d1, c1)), Type::Arrow(Arrow(d2, c2))) => {
            equal_across(e1, d1, e2, d2, values, mark)
                && equal_across(e1, c1, e2, c2, values, mark)
        }
        (Type::Bar(Bar(a1, b1)), Type::Bar(Bar(a2, b2)))
        | (Type::Anchored(Anchored(a1, b1)), Type::Anchored(Anchored(a2, b2)))
        | (Type::Star(Star(a1, b1)), Type::Star(Star(a2, b2))) => {
            equal_across(e1, a1, e2, a2, values, mark)
                && equal_across(e1, b1, e2, b2, values, mark)
        }
        (Type::And(a1), Type::And(a2)) => {
            a1.constraints.len() == a2.constraints.len()
                && a1.constraints.iter().zip(&a2.constraints).all(|(x, y)| {
                    x.mode == y.mode && equal_across(e1, &x.ty, e2, &y.ty, values, mark)
                })
                && equal_across(e1, &a1.ty, e2, &a2.ty, values, mark)
        }
        (Type::Imply(a1), Type::Imply(a2)) => {
            a1.constraints.len() == a2.constraints.len()
                && a1.constraints.iter().zip(&a2.constraints).all(|(x, y)| {
                    x.mode == y.mode && equal_across(e1, &x.ty, e2, &y.ty, values, mark)
                })
                && equal_across(e1, &a1.ty, e2, &a2.ty, values, mark)
        }
        _ => false,
    }
}

/// Rewrites a child-side type into join-side terms: the child value becomes
/// the join variable, pre-split variables stay, anything branch-local is
/// inexpressible.
fn translate(env: &Env, ty: &RcType, mark: usize, value: (Var, Var)) -> Option<RcType> {
    use std::rc::Rc;
    let ty = env.modulo_flex(ty);
    match ty.as_ref() {
        Type::Unknown(_) | Type::Dynamic(_) | Type::Empty(_) | Type::Bound(_) => Some(ty.clone()),
        Type::Open(Open(v)) => {
            let r = env.repr(*v);
            if r == value.0 {
                Some(Type::open(value.1))
            } else if r.index() < mark {
                Some(Type::open(r))
            } else {
                None
            }
        }
        Type::Forall(Forall { binding, body }) => Some(Rc::new(Type::Forall(Forall {
            binding: binding.clone(),
            body: translate(env, body, mark, value)?,
        }))),
        Type::Exists(Exists { binding, body }) => Some(Rc::new(Type::Exists(Exists {
            binding: binding.clone(),
            body: translate(env, body, mark, value)?,
        }))),
        Type::App(TyApp { head, args }) => Some(Rc::new(Type::App(TyApp {
            head: translate(env, head, mark, value)?,
            args: args
                .iter()
                .map(|a| translate(env, a, mark, value))
                .collect::<Option<Vec<_>>>()?,
        }))),
        Type::Tuple(TupleTy(tys)) => Some(Rc::new(Type::Tuple(TupleTy(
            tys.iter()
                .map(|t| translate(env, t, mark, value))
                .collect::<Option<Vec<_>>>()?,
        )))),
        Type::Concrete(Concrete { datacon, fields, adopts }) => {
            Some(Rc::new(Type::Concrete(Concrete {
                datacon: datacon.clone(),
                fields: fields
                    .iter()
                    .map(|f| match f {
                        FieldTy::Value(n, t) => {
                            Some(FieldTy::Value(n.clone(), translate(env, t, mark, value)?))
                        }
                        FieldTy::Perm(p) => Some(FieldTy::Perm(translate(env, p, mark, value)?)),
                    })
                    .collect::<Option<Vec<_>>>()?,
                adopts: match adopts {
                    None => None,
                    Some(t) => Some(translate(env, t, mark, value)?),
                },
            })))
        }
        Type::Singleton(Singleton(t)) => {
            Some(Rc::new(Type::Singleton(Singleton(translate(env, t, mark, value)?))))
        }
        Type::Arrow(Arrow(d, c)) => Some(Rc::new(Type::Arrow(Arrow(
            translate(env, d, mark, value)?,
            translate(env, c, mark, value)?,
        )))),
        Type::Bar(Bar(t, p)) => Some(Rc::new(Type::Bar(Bar(
            translate(env, t, mark, value)?,
            translate(env, p, mark, value)?,
        )))),
        Type::Anchored(Anchored(x, t)) => Some(Rc::new(Type::Anchored(Anchored(
            translate(env, x, mark, value)?,
            translate(env, t, mark, value)?,
        )))),
        Type::Star(Star(l, r)) => Some(Rc::new(Type::Star(Star(
            translate(env, l, mark, value)?,
            translate(env, r, mark, value)?,
        )))),
        Type::And(And { constraints, ty }) => Some(Rc::new(Type::And(And {
            constraints: constraints
                .iter()
                .map(|c| {
                    Some(TyConstraint { mode: c.mode, ty: translate(env, &c.ty, mark, value)? })
                })
                .collect::<Option<Vec<_>>>()?,
            ty: translate(env, ty, mark, value)?,
        }))),
        Type::Imply(Imply { constraints, ty }) => Some(Rc::new(Type::Imply(Imply {
            constraints: constraints
                .iter()
                .map(|c| {
                    Some(TyConstraint { mode: c.mode, ty: translate(env, &c.ty, mark, value)? })
                })
                .collect::<Option<Vec<_>>>()?,
            ty: translate(env, ty, mark, value)?,
        }))),
    }
}
