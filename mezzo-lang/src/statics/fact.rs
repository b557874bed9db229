//! Fact inference: a monotone fixed point deciding, for every algebraic
//! data type, whether it is duplicable (under a parameter mask), exclusive,
//! or affine. Variance vectors are computed alongside.

use super::env::Env;
use super::syntax::*;

/* ------------------------------ Runtime query ------------------------------ */

/// The fact of a closed type under the current environment.
pub fn fact_of(env: &Env, ty: &RcType) -> Fact {
    fact_rec(env, ty, usize::MAX)
}

pub fn is_duplicable(env: &Env, ty: &RcType) -> bool {
    fact_of(env, ty).is_duplicable()
}

pub fn is_exclusive(env: &Env, ty: &RcType) -> bool {
    fact_of(env, ty).is_exclusive()
}

/// `depth` counts binders crossed; indices at or above it are parameters of
/// the definition under recomputation and come back as `Fuzzy`.
fn fact_rec(env: &Env, ty: &RcType, depth: usize) -> Fact {
    let ty = env.modulo_flex(ty);
    match ty.as_ref() {
        Type::Unknown(_) | Type::Dynamic(_) | Type::Empty(_) => Fact::Duplicable(Bitmap::empty()),
        Type::Singleton(_) | Type::Arrow(_) => Fact::Duplicable(Bitmap::empty()),
        Type::Bound(Bound(i)) => {
            if depth != usize::MAX && *i >= depth {
                Fact::Fuzzy(*i - depth)
            } else {
                Fact::Affine
            }
        }
        Type::Open(Open(v)) => {
            if env.is_flexible(*v) {
                Fact::Affine
            } else {
                env.get_fact(*v).unwrap_or(Fact::Affine)
            }
        }
        Type::Forall(Forall { body, .. }) | Type::Exists(Exists { body, .. }) => {
            fact_rec(env, body, depth.saturating_add(1))
        }
        Type::App(TyApp { head, args }) => {
            let head = env.modulo_flex(head);
            let Type::Open(Open(h)) = head.as_ref() else {
                return Fact::Affine;
            };
            match env.get_fact(*h).unwrap_or(Fact::Affine) {
                Fact::Exclusive => Fact::Exclusive,
                Fact::Affine | Fact::Fuzzy(_) => Fact::Affine,
                Fact::Duplicable(mask) => {
                    let mut acc = Fact::Duplicable(Bitmap::empty());
                    for (i, arg) in args.iter().enumerate() {
                        if mask.get(i) {
                            acc = join_dup(acc, fact_rec(env, arg, depth));
                        }
                    }
                    acc
                }
            }
        }
        Type::Tuple(TupleTy(tys)) => {
            let mut acc = Fact::Duplicable(Bitmap::empty());
            for t in tys {
                acc = join_dup(acc, fact_rec(env, t, depth));
            }
            acc
        }
        Type::Concrete(Concrete { datacon, fields, .. }) => {
            match env.get_fact(datacon.ty).unwrap_or(Fact::Affine) {
                Fact::Exclusive => Fact::Exclusive,
                _ => {
                    let mut acc = Fact::Duplicable(Bitmap::empty());
                    for field in fields {
                        match field {
                            FieldTy::Value(_, t) | FieldTy::Perm(t) => {
                                acc = join_dup(acc, fact_rec(env, t, depth));
                            }
                        }
                    }
                    acc
                }
            }
        }
        Type::Bar(Bar(t, p)) | Type::Star(Star(t, p)) => {
            join_dup(fact_rec(env, t, depth), fact_rec(env, p, depth))
        }
        Type::Anchored(Anchored(_, t)) => match fact_rec(env, t, depth) {
            Fact::Exclusive => Fact::Affine,
            f => f,
        },
        Type::And(And { ty, .. }) | Type::Imply(Imply { ty, .. }) => fact_rec(env, ty, depth),
    }
}

/// Combines sub-facts in a position that is duplicable iff every part is.
/// An exclusive or affine part demotes the whole to affine.
fn join_dup(acc: Fact, f: Fact) -> Fact {
    let normal = |f: Fact| match f {
        Fact::Fuzzy(i) => Fact::Duplicable(Bitmap::empty().set(i)),
        f => f,
    };
    match (normal(acc), normal(f)) {
        (Fact::Duplicable(m1), Fact::Duplicable(m2)) => Fact::Duplicable(m1.union(m2)),
        _ => Fact::Affine,
    }
}

/* ------------------------------- Fixed point ------------------------------- */

/// Runs fact inference over one data-type group until the fact table no
/// longer changes, then computes variance vectors the same way.
pub fn infer_group(env: Env, group: &[Var]) -> Env {
    let mut env = seed(env, group);
    loop {
        let mut changed = false;
        for &v in group {
            let Some(Definition::Concrete(def)) = env.get_definition(v).cloned() else {
                continue;
            };
            let fact = match def.flavor {
                DataFlavor::Mutable => Fact::Exclusive,
                DataFlavor::Immutable => recompute(&env, &def),
            };
            if env.get_fact(v) != Some(fact) {
                env = env.set_fact(v, fact);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    infer_variance(env, group)
}

fn seed(env: Env, group: &[Var]) -> Env {
    let mut env = env;
    for &v in group {
        let fact = match env.get_definition(v) {
            Some(Definition::Concrete(def)) => match def.flavor {
                DataFlavor::Mutable => Fact::Exclusive,
                DataFlavor::Immutable => Fact::Duplicable(Bitmap::empty()),
            },
            Some(Definition::Abstract) | None => env.get_fact(v).unwrap_or(Fact::Affine),
        };
        env = env.set_fact(v, fact);
    }
    env
}

fn recompute(env: &Env, def: &DataTypeDef) -> Fact {
    let mut acc = Fact::Duplicable(Bitmap::empty());
    for br in &def.branches {
        for field in &br.fields {
            match field {
                FieldTy::Value(_, t) | FieldTy::Perm(t) => {
                    acc = join_dup(acc, fact_rec(env, t, 0));
                }
            }
        }
    }
    acc
}

/* --------------------------------- Variance -------------------------------- */

fn arity(env: &Env, v: Var) -> usize {
    env.kind_of(v).flatten().0.len()
}

fn infer_variance(env: Env, group: &[Var]) -> Env {
    let mut table: std::collections::BTreeMap<Var, Vec<Variance>> = group
        .iter()
        .map(|&v| (v, vec![Variance::Bivariant; arity(&env, v)]))
        .collect();
    loop {
        let mut changed = false;
        for &v in group {
            let Some(Definition::Concrete(def)) = env.get_definition(v) else {
                continue;
            };
            let n = arity(&env, v);
            let mut row = vec![Variance::Bivariant; n];
            for (j, slot) in row.iter_mut().enumerate() {
                let mut acc = Variance::Bivariant;
                for br in &def.branches {
                    for field in &br.fields {
                        match field {
                            FieldTy::Value(_, t) | FieldTy::Perm(t) => {
                                acc = acc.meet(occurrence(
                                    &env,
                                    &table,
                                    t,
                                    j,
                                    Variance::Covariant,
                                    0,
                                ));
                            }
                        }
                    }
                }
                if let Some(t) = &def.adopts {
                    acc = acc.meet(occurrence(&env, &table, t, j, Variance::Invariant, 0));
                }
                *slot = acc;
            }
            if table[&v] != row {
                table.insert(v, row);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    let mut env = env;
    for (v, row) in table {
        env = env.set_variance(v, row);
    }
    env
}

/// The combined variance of parameter `j` in `ty`, seen at polarity `pol`.
fn occurrence(
    env: &Env, table: &std::collections::BTreeMap<Var, Vec<Variance>>, ty: &RcType, j: usize,
    pol: Variance, depth: usize,
) -> Variance {
    match ty.as_ref() {
        Type::Bound(Bound(i)) => {
            if *i >= depth && *i - depth == j {
                pol
            } else {
                Variance::Bivariant
            }
        }
        Type::Unknown(_) | Type::Dynamic(_) | Type::Empty(_) | Type::Open(_) => {
            Variance::Bivariant
        }
        Type::Forall(Forall { body, .. }) | Type::Exists(Exists { body, .. }) => {
            occurrence(env, table, body, j, pol, depth + 1)
        }
        Type::App(TyApp { head, args }) => {
            let mut acc = occurrence(env, table, head, j, Variance::Invariant, depth);
            let head_variance = match head.as_ref() {
                Type::Open(Open(h)) => {
                    table.get(h).cloned().unwrap_or_else(|| env.get_variance(*h))
                }
                _ => Vec::new(),
            };
            for (i, arg) in args.iter().enumerate() {
                let via = head_variance.get(i).copied().unwrap_or(Variance::Invariant);
                acc = acc.meet(occurrence(env, table, arg, j, pol.compose(via), depth));
            }
            acc
        }
        Type::Tuple(TupleTy(tys)) => {
            let mut acc = Variance::Bivariant;
            for t in tys {
                acc = acc.meet(occurrence(env, table, t, j, pol, depth));
            }
            acc
        }
        Type::Concrete(Concrete { fields, adopts, .. }) => {
            let mut acc = Variance::Bivariant;
            for field in fields {
                match field {
                    FieldTy::Value(_, t) | FieldTy::Perm(t) => {
                        acc = acc.meet(occurrence(env, table, t, j, pol, depth));
                    }
                }
            }
            if let Some(t) = adopts {
                acc = acc.meet(occurrence(env, table, t, j, Variance::Invariant, depth));
            }
            acc
        }
        Type::Singleton(Singleton(t)) => occurrence(env, table, t, j, pol, depth),
        Type::Arrow(Arrow(dom, cod)) => occurrence(
            env,
            table,
            dom,
            j,
            pol.compose(Variance::Contravariant),
            depth,
        )
        .meet(occurrence(env, table, cod, j, pol, depth)),
        Type::Bar(Bar(t, p)) | Type::Star(Star(t, p)) | Type::Anchored(Anchored(t, p)) => {
            occurrence(env, table, t, j, pol, depth)
                .meet(occurrence(env, table, p, j, pol, depth))
        }
        Type::And(And { constraints, ty }) | Type::Imply(Imply { constraints, ty }) => {
            let mut acc = occurrence(env, table, ty, j, pol, depth);
            for TyConstraint { ty, .. } in constraints {
                acc = acc.meet(occurrence(env, table, ty, j, Variance::Invariant, depth));
            }
            acc
        }
    }
}
