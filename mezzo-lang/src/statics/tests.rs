use super::add;
use super::elab;
use super::env::Env;
use super::fact;
use super::sub;
use super::syntax::*;
use super::tyck::{self, TypeCheck};
use crate::mezzo;
use crate::parse::{self, parser, syntax as ps};
use mezzo_utils::span::{span, SpanView};
use std::rc::Rc;

fn prelude() -> tyck::Ctx {
    mezzo::prelude_context().expect("prelude loads")
}

/// Runs a program through the same pipeline the driver uses, starting from
/// the auto-included environment.
fn check_program(src: &str) -> Result<tyck::Ctx, String> {
    let mut ctx = prelude();
    let module = parser::ProgParser::new()
        .parse(src, parse::Lexer::new(src))
        .map_err(|e| format!("parse: {:?}", e))?;
    for decl in &module.decls {
        match decl.inner_ref() {
            ps::Declaration::Data(group) => {
                let (env, scope, _) =
                    elab::bind_data_group(&ctx.env, &ctx.scope, group, decl.span())
                        .map_err(|e| format!("kind: {}", e.inner_ref()))?;
                ctx.env = env;
                ctx.scope = scope;
            }
            ps::Declaration::Val(ps::Val { pat, def }) => {
                let pat = elab::elab_pattern(&ctx.env, &ctx.scope, pat)
                    .map_err(|e| format!("kind: {}", e.inner_ref()))?;
                let expr = elab::elab_term(&ctx.env, &ctx.scope, def.as_ref())
                    .map_err(|e| format!("kind: {}", e.inner_ref()))?;
                let (c, v) = expr.syn(ctx).map_err(|e| format!("{}", e.item.inner_ref()))?;
                ctx = tyck::bind_toplevel_pattern(c, &pat, v)
                    .map_err(|e| format!("{}", e.item.inner_ref()))?;
            }
            _ => return Err(format!("unsupported declaration in test program")),
        }
    }
    Ok(ctx)
}

fn parse_type(ctx: &tyck::Ctx, src: &str) -> RcType {
    let t = parser::TypeSpanParser::new()
        .parse(src, parse::Lexer::new(src))
        .expect("test type parses");
    let (t, _) = elab::elab_type(&ctx.env, &ctx.scope, &Vec::new(), &t).expect("test type elaborates");
    t
}

fn type_var(ctx: &tyck::Ctx, name: &str) -> Var {
    ctx.scope.types[&TypeV::new(name.to_string(), span(0, 0))]
}

/// Every live term variable carries exactly one self-witness.
fn assert_self_witness(env: &Env) {
    for v in env.term_vars() {
        let selfs = env
            .get_permissions(v)
            .iter()
            .filter(|p| {
                if let Type::Singleton(Singleton(inner)) = env.modulo_flex(p).as_ref() {
                    if let Type::Open(Open(w)) = env.modulo_flex(inner).as_ref() {
                        return env.repr(*w) == env.repr(v);
                    }
                }
                false
            })
            .count();
        assert_eq!(selfs, 1, "self-witness count for {}", env.name_of(v));
    }
}

const LIST: &str = "data list a = Nil | Cons { head: a; tail: list a }\n";

#[test]
fn list_fact_is_duplicable_in_its_parameter() {
    let ctx = check_program(LIST).unwrap();
    let list = type_var(&ctx, "list");
    match ctx.env.get_fact(list) {
        Some(Fact::Duplicable(mask)) => assert!(mask.get(0)),
        f => panic!("unexpected fact {:?}", f),
    }
    let t = parse_type(&ctx, "list int");
    assert!(fact::is_duplicable(&ctx.env, &t));
    let t = parse_type(&ctx, "list (ref int)");
    assert_eq!(fact::fact_of(&ctx.env, &t), Fact::Affine);
}

#[test]
fn ref_fact_is_exclusive() {
    let ctx = prelude();
    let r = type_var(&ctx, "ref");
    assert_eq!(ctx.env.get_fact(r), Some(Fact::Exclusive));
    let t = parse_type(&ctx, "ref int");
    assert!(fact::is_exclusive(&ctx.env, &t));
}

#[test]
fn list_is_covariant() {
    let ctx = check_program(LIST).unwrap();
    let list = type_var(&ctx, "list");
    assert_eq!(ctx.env.get_variance(list), vec![Variance::Covariant]);
}

#[test]
fn arrow_domain_is_contravariant_in_variance() {
    let ctx = check_program("data flip a = Flip { f: a -> int }\n").unwrap();
    let flip = type_var(&ctx, "flip");
    assert_eq!(ctx.env.get_variance(flip), vec![Variance::Contravariant]);
}

#[test]
fn read_then_write_a_reference() {
    let ctx = check_program(
        "val _ = let r = Ref { contents = 0 } in let x = r.contents in r.contents <- 1\n",
    )
    .unwrap();
    assert!(!ctx.env.is_inconsistent());
    assert_self_witness(&ctx.env);
}

#[test]
fn write_twice() {
    check_program(
        "val _ = let r = Ref { contents = 0 } in r.contents <- 1; r.contents <- 2\n",
    )
    .unwrap();
}

#[test]
fn closure_cannot_capture_an_exclusive_permission() {
    let res = check_program(
        "val _ =\n\
         \x20 let r = Ref { contents = 0 } in\n\
         \x20 let f = fun (u: ()) : () = r.contents <- 1 in\n\
         \x20 f ()\n",
    );
    assert!(res.is_err(), "the closure must not capture r @ ref int");
}

#[test]
fn arrow_contravariance() {
    let ctx = prelude();
    let t1 = parse_type(&ctx, "(int, int) -> int");
    let t2 = parse_type(&ctx, "(int, int) -> unknown");
    assert!(sub::sub_type(&ctx.env, &t1, &t2).is_some());
    assert!(sub::sub_type(&ctx.env, &t2, &t1).is_none());
}

#[test]
fn tuple_addition_unifies_components() {
    let ctx = prelude();
    let loc = span(0, 0);
    let (env, x) = ctx.env.bind_term("x", &loc);
    let (env, y) = env.bind_term("y", &loc);
    let (env, z) = env.bind_term("z", &loc);
    let (env, y2) = env.bind_term("y'", &loc);
    let (env, z2) = env.bind_term("z'", &loc);
    let tup1 = Rc::new(Type::Tuple(TupleTy(vec![Type::singleton(y), Type::singleton(z)])));
    let tup2 = Rc::new(Type::Tuple(TupleTy(vec![Type::singleton(y2), Type::singleton(z2)])));
    let env = add::add(&env, x, tup1);
    let env = add::add(&env, x, tup2);
    assert_eq!(env.repr(y), env.repr(y2));
    assert_eq!(env.repr(z), env.repr(z2));
    // the merged variable cannot be both an int and a bool
    let int = parse_type(&ctx, "int");
    let boolean = parse_type(&ctx, "bool");
    let env = add::add(&env, y, int);
    let env = add::add(&env, y2, boolean);
    assert!(env.is_inconsistent());
}

const POOL: &str = "mutable data pool = Pool { count: int } adopts ref int\n";

#[test]
fn give_then_take_restores_the_permission() {
    check_program(&format!(
        "{}val _ =\n\
         \x20 let y = Pool {{ count = 0 }} in\n\
         \x20 let r = Ref {{ contents = 1 }} in\n\
         \x20 give r to y;\n\
         \x20 take r from y;\n\
         \x20 r.contents <- 2\n",
        POOL
    ))
    .unwrap();
}

#[test]
fn giving_consumes_the_permission() {
    let res = check_program(&format!(
        "{}val _ =\n\
         \x20 let y = Pool {{ count = 0 }} in\n\
         \x20 let r = Ref {{ contents = 1 }} in\n\
         \x20 give r to y;\n\
         \x20 r.contents <- 2\n",
        POOL
    ));
    assert!(res.is_err(), "r @ ref int is gone after the give");
}

#[test]
fn owns_needs_an_adopter_and_a_dynamic_adoptee() {
    check_program(&format!(
        "{}val _ =\n\
         \x20 let y = Pool {{ count = 0 }} in\n\
         \x20 let r = Ref {{ contents = 1 }} in\n\
         \x20 give r to y;\n\
         \x20 if y owns r then () else ()\n",
        POOL
    ))
    .unwrap();
}

#[test]
fn merge_keeps_the_common_permission() {
    check_program(
        "val _ =\n\
         \x20 let b = eq (1, 1) in\n\
         \x20 let x = if b then 1 else 2 in\n\
         \x20 plus (x, 1)\n",
    )
    .unwrap();
}

#[test]
fn merge_drops_divergent_permissions() {
    let res = check_program(
        "val _ =\n\
         \x20 let b = eq (1, 1) in\n\
         \x20 let y = if b then 1 else True in\n\
         \x20 plus (y, 1)\n",
    );
    assert!(res.is_err(), "y is neither an int nor a bool after the join");
}

#[test]
fn match_refines_and_recursion_checks() {
    check_program(&format!(
        "{}val _ =\n\
         \x20 let rec sum = fun (l: list int) : int =\n\
         \x20   match l with\n\
         \x20   | Nil -> 0\n\
         \x20   | Cons {{ head = h; tail = t }} -> plus (h, sum t)\n\
         \x20   end\n\
         \x20 in sum (Cons {{ head = 1; tail = Cons {{ head = 2; tail = Nil }} }})\n",
        LIST
    ))
    .unwrap();
}

#[test]
fn assert_materializes_a_permission() {
    check_program(
        "val _ = let r = Ref { contents = 0 } in assert r @ ref int; r.contents <- 1\n",
    )
    .unwrap();
}

#[test]
fn fail_makes_the_rest_vacuous() {
    check_program("val _ = let r = (1, 2) in fail; r.contents <- 3\n").unwrap();
}

#[test]
fn add_then_sub_duplicable_keeps_the_permission() {
    let ctx = prelude();
    let (env, x) = ctx.env.bind_term("x", &span(0, 0));
    let int = parse_type(&ctx, "int");
    let env = add::add(&env, x, int.clone());
    let env = sub::sub(&env, x, &int).expect("int is derivable");
    assert!(sub::sub(&env, x, &int).is_some(), "duplicable permissions survive subtraction");
}

#[test]
fn add_then_sub_exclusive_consumes() {
    let ctx = prelude();
    let (env, x) = ctx.env.bind_term("x", &span(0, 0));
    let r = parse_type(&ctx, "ref int");
    let env = add::add(&env, x, r.clone());
    let env = sub::sub(&env, x, &r).expect("ref int is derivable once");
    assert!(sub::sub(&env, x, &r).is_none(), "an exclusive permission is consumed");
    assert_self_witness(&env);
}

#[test]
fn sub_var_agrees_with_sub_type_on_the_self_witness() {
    let ctx = prelude();
    let (env, x) = ctx.env.bind_term("x", &span(0, 0));
    let int = parse_type(&ctx, "int");
    let env = add::add(&env, x, int.clone());
    let via_var = sub::sub(&env, x, &int).is_some();
    let via_type = sub::sub_type(&env, &Type::singleton(x), &int).is_some();
    assert_eq!(via_var, via_type);
}

#[test]
fn open_then_close_is_the_identity() {
    let ctx = prelude();
    let t = parse_type(&ctx, "[a] a -> int");
    let Type::Forall(q) = t.as_ref() else { panic!("expected a forall") };
    let (env, v, body) = ctx.env.open_forall(q);
    let closed = Type::close_var(&body, v);
    assert!(sub::equal(&env, &closed, &q.body));
}

#[test]
fn inconsistent_environments_prove_anything() {
    let ctx = prelude();
    let (env, x) = ctx.env.bind_term("x", &span(0, 0));
    let env = env.mark_inconsistent();
    let t = parse_type(&ctx, "ref (ref int)");
    assert!(sub::sub(&env, x, &t).is_some());
}

#[test]
fn flexible_instantiation_respects_the_occurs_check() {
    let ctx = prelude();
    let (env, v) = ctx.env.bind_flexible(&Binding::fresh(Kind::Type));
    let list = type_var(&ctx, "ref");
    let list_of_v =
        Rc::new(Type::App(TyApp { head: Type::open(list), args: vec![Type::open(v)] }));
    assert!(env.instantiate_flexible(v, &list_of_v).is_none());
    let int = parse_type(&ctx, "int");
    assert!(env.instantiate_flexible(v, &int).is_some());
}

#[test]
fn interface_types_elaborate_with_their_kinds() {
    let ctx = prelude();
    let t = parser::TypeSpanParser::new()
        .parse("x @ int", parse::Lexer::new("x @ int"));
    // x is unbound here, so the anchored type must be rejected
    let t = t.expect("parses");
    assert!(elab::elab_type(&ctx.env, &ctx.scope, &Vec::new(), &t).is_err());
}
