//! Printing internal types back in surface syntax, resolving variable
//! names through the environment.

use super::env::Env;
use super::syntax::*;

pub fn show_type(env: &Env, ty: &RcType) -> String {
    show(env, ty, 0)
}

/// `prec`: 0 whole type, 1 below arrow/star, 2 application argument.
fn show(env: &Env, ty: &RcType, prec: u8) -> String {
    let ty = env.modulo_flex(ty);
    let s = match ty.as_ref() {
        Type::Unknown(_) => format!("unknown"),
        Type::Dynamic(_) => format!("dynamic"),
        Type::Empty(_) => format!("empty"),
        Type::Bound(Bound(i)) => format!("!{}", i),
        Type::Open(Open(v)) => env.name_of(*v),
        Type::Forall(Forall { binding, body }) => {
            let name = binding.name.clone().unwrap_or_else(|| format!("_"));
            let caret = match binding.flavor {
                Flavor::CanInstantiate => "",
                Flavor::CannotInstantiate => "^",
            };
            format!("[{}{}] {}", caret, name, show(env, body, 0))
        }
        Type::Exists(Exists { binding, body }) => {
            let name = binding.name.clone().unwrap_or_else(|| format!("_"));
            format!("{{{}}} {}", name, show(env, body, 0))
        }
        Type::App(TyApp { head, args }) => {
            let mut s = show(env, head, 2);
            for a in args {
                s += &format!(" {}", show(env, a, 2));
            }
            s
        }
        Type::Tuple(TupleTy(tys)) => {
            let tys = tys.iter().map(|t| show(env, t, 0)).collect::<Vec<_>>();
            return format!("({})", tys.join(", "));
        }
        Type::Concrete(Concrete { datacon, fields, adopts }) => {
            let mut s = format!("{}", datacon.name);
            let shown = fields
                .iter()
                .filter_map(|f| match f {
                    FieldTy::Value(name, t) => Some(format!("{}: {}", name, show(env, t, 0))),
                    FieldTy::Perm(_) => None,
                })
                .collect::<Vec<_>>();
            if !shown.is_empty() {
                s += &format!(" {{ {} }}", shown.join("; "));
            }
            if let Some(t) = adopts {
                s += &format!(" adopts {}", show(env, t, 1));
            }
            s
        }
        Type::Singleton(Singleton(x)) => format!("={}", show(env, x, 2)),
        Type::Arrow(Arrow(dom, cod)) => {
            format!("{} -> {}", show(env, dom, 1), show(env, cod, 0))
        }
        Type::Bar(Bar(t, p)) => {
            return format!("({} | {})", show(env, t, 0), show(env, p, 0));
        }
        Type::Anchored(Anchored(x, t)) => {
            format!("{} @ {}", show(env, x, 2), show(env, t, 1))
        }
        Type::Star(Star(l, r)) => format!("{} * {}", show(env, l, 1), show(env, r, 1)),
        Type::And(And { constraints, ty }) | Type::Imply(Imply { constraints, ty }) => {
            let cs = constraints
                .iter()
                .map(|TyConstraint { mode, ty }| {
                    let mode = match mode {
                        Mode::ModeDuplicable => "duplicable",
                        Mode::ModeExclusive => "exclusive",
                    };
                    format!("{} {}", mode, show(env, ty, 2))
                })
                .collect::<Vec<_>>();
            format!("{} => {}", cs.join(" => "), show(env, ty, 0))
        }
    };
    let atomic = matches!(
        ty.as_ref(),
        Type::Unknown(_)
            | Type::Dynamic(_)
            | Type::Empty(_)
            | Type::Bound(_)
            | Type::Open(_)
            | Type::Tuple(_)
            | Type::Bar(_)
    );
    let needs_parens = match prec {
        0 => false,
        1 => matches!(ty.as_ref(), Type::Arrow(_) | Type::Forall(_) | Type::Exists(_)),
        _ => !atomic,
    };
    if needs_parens {
        format!("({})", s)
    } else {
        s
    }
}

/// One line per live permission, for debugging output at high verbosity.
pub fn show_env(env: &Env) -> String {
    let mut s = String::new();
    for v in env.term_vars() {
        for p in env.get_permissions(v).iter() {
            s += &format!("{} @ {}\n", env.name_of(v), show_type(env, p));
        }
    }
    for p in env.floating_perms().iter() {
        s += &format!("{}\n", show_type(env, p));
    }
    if env.is_inconsistent() {
        s += "<inconsistent>\n";
    }
    s
}
