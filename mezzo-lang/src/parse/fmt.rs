use super::syntax::*;
use crate::utils::fmt::{Args, FmtArgs};

/* ---------------------------------- Types --------------------------------- */

fn ty_is_atom(ty: &Type) -> bool {
    match ty {
        Type::Unknown(_) | Type::Dynamic(_) | Type::Empty(_) | Type::Tuple(_) => true,
        Type::App(TypeApp { args, .. }) => args.is_empty(),
        Type::Concrete(_) => true,
        _ => false,
    }
}

fn ty_atom(ty: &Type, fargs: Args) -> String {
    if ty_is_atom(ty) {
        ty.fmt_args(fargs)
    } else {
        format!("({})", ty.fmt_args(fargs))
    }
}

fn ty_below_arrow(ty: &Type, fargs: Args) -> String {
    match ty {
        Type::Arrow(_) | Type::Forall(_) | Type::Exists(_) | Type::Constraint(_)
        | Type::Consumes(_) => {
            format!("({})", ty.fmt_args(fargs))
        }
        _ => ty.fmt_args(fargs),
    }
}

impl FmtArgs for TyBinder {
    fn fmt_args(&self, _fargs: Args) -> String {
        let TyBinder { var, kind, flavor } = self;
        let caret = match flavor {
            Flavor::CanInstantiate => "",
            Flavor::CannotInstantiate => "^",
        };
        match kind {
            Kind::Type => format!("{}{}", caret, var),
            kind => format!("{}{} : {}", caret, var, kind),
        }
    }
}

impl FmtArgs for Type {
    fn fmt_args(&self, fargs: Args) -> String {
        match self {
            Type::Unknown(_) => format!("unknown"),
            Type::Dynamic(_) => format!("dynamic"),
            Type::Empty(_) => format!("empty"),
            Type::App(TypeApp { tvar, args }) => {
                let mut s = format!("{}", tvar);
                for arg in args {
                    s += &format!(" {}", ty_atom(arg.inner_ref(), fargs));
                }
                s
            }
            Type::Forall(Forall { params, ty }) => {
                let params =
                    params.iter().map(|b| b.fmt_args(fargs)).collect::<Vec<_>>().join(", ");
                format!("[{}] {}", params, ty.inner_ref().fmt_args(fargs))
            }
            Type::Exists(Exists { param, ty }) => {
                format!("{{{}}} {}", param.fmt_args(fargs), ty.inner_ref().fmt_args(fargs))
            }
            Type::Tuple(TupleT(tys)) => {
                let tys =
                    tys.iter().map(|t| t.inner_ref().fmt_args(fargs)).collect::<Vec<_>>();
                format!("({})", tys.join(", "))
            }
            Type::Concrete(ConcreteT { ctor, fields }) => {
                if fields.is_empty() {
                    format!("{}", ctor)
                } else {
                    let fields = fields
                        .iter()
                        .map(|(f, t)| format!("{}: {}", f, t.inner_ref().fmt_args(fargs)))
                        .collect::<Vec<_>>();
                    format!("{} {{ {} }}", ctor, fields.join("; "))
                }
            }
            Type::Singleton(SingletonT(x)) => format!("={}", x),
            Type::Arrow(ArrowT(dom, cod)) => {
                format!(
                    "{} -> {}",
                    ty_below_arrow(dom.inner_ref(), fargs),
                    cod.inner_ref().fmt_args(fargs)
                )
            }
            Type::Bar(BarT { ty, perm }) => {
                format!(
                    "({} | {})",
                    ty.inner_ref().fmt_args(fargs),
                    perm.inner_ref().fmt_args(fargs)
                )
            }
            Type::Anchored(AnchoredT { var, ty }) => {
                format!("{} @ {}", var, ty_below_arrow(ty.inner_ref(), fargs))
            }
            Type::Star(StarT(l, r)) => {
                format!(
                    "{} * {}",
                    ty_below_arrow(l.inner_ref(), fargs),
                    ty_below_arrow(r.inner_ref(), fargs)
                )
            }
            Type::Constraint(ConstraintT { mode, arg, ty }) => {
                let mode = match mode {
                    FactMode::Duplicable => "duplicable",
                    FactMode::Exclusive => "exclusive",
                };
                format!(
                    "{} {} => {}",
                    mode,
                    ty_atom(arg.inner_ref(), fargs),
                    ty.inner_ref().fmt_args(fargs)
                )
            }
            Type::Consumes(ConsumesT(t)) => {
                format!("consumes {}", ty_below_arrow(t.inner_ref(), fargs))
            }
        }
    }
}

/* -------------------------------- Patterns -------------------------------- */

impl FmtArgs for Pattern {
    fn fmt_args(&self, fargs: Args) -> String {
        match self {
            Pattern::Var(x) => format!("{}", x),
            Pattern::Wildcard(_) => format!("_"),
            Pattern::Tuple(TuplePat(ps)) => {
                let ps = ps.iter().map(|p| p.inner_ref().fmt_args(fargs)).collect::<Vec<_>>();
                format!("({})", ps.join(", "))
            }
            Pattern::Ctor(CtorPat { ctor, fields }) => {
                if fields.is_empty() {
                    format!("{}", ctor)
                } else {
                    let fields = fields
                        .iter()
                        .map(|(f, p)| format!("{} = {}", f, p.inner_ref().fmt_args(fargs)))
                        .collect::<Vec<_>>();
                    format!("{} {{ {} }}", ctor, fields.join("; "))
                }
            }
            Pattern::As(AsPat { pat, var }) => {
                let inner = match pat.inner_ref() {
                    p @ Pattern::As(_) | p @ Pattern::Ann(_) => {
                        format!("({})", p.fmt_args(fargs))
                    }
                    p => p.fmt_args(fargs),
                };
                format!("{} as {}", inner, var)
            }
            Pattern::Ann(AnnPat { pat, ty }) => {
                format!(
                    "({} : {})",
                    pat.inner_ref().fmt_args(fargs),
                    ty.inner_ref().fmt_args(fargs)
                )
            }
        }
    }
}

/* ---------------------------------- Terms --------------------------------- */

fn tm_is_atom(tm: &Term) -> bool {
    match tm {
        Term::Var(_) | Term::Tuple(_) | Term::Ann(_) | Term::Field(_) => true,
        Term::Lit(Literal::Int(n)) => *n >= 0,
        Term::Ctor(_) => true,
        _ => false,
    }
}

fn tm_atom(tm: &Term, fargs: Args) -> String {
    if tm_is_atom(tm) {
        tm.fmt_args(fargs)
    } else {
        format!("({})", tm.fmt_args(fargs))
    }
}

fn tm_app(tm: &Term, fargs: Args) -> String {
    match tm {
        Term::App(_) | Term::Inst(_) => tm.fmt_args(fargs),
        _ => tm_atom(tm, fargs),
    }
}

fn tm_stmt(tm: &Term, fargs: Args) -> String {
    match tm {
        Term::Let(_) | Term::Fun(_) | Term::If(_) | Term::Seq(_) => {
            format!("({})", tm.fmt_args(fargs))
        }
        _ => tm.fmt_args(fargs),
    }
}

impl FmtArgs for Term {
    fn fmt_args(&self, fargs: Args) -> String {
        match self {
            Term::Var(x) => format!("{}", x),
            Term::Lit(Literal::Int(n)) => format!("{}", n),
            Term::Tuple(Tuple(es)) => {
                let es = es.iter().map(|e| e.inner_ref().fmt_args(fargs)).collect::<Vec<_>>();
                format!("({})", es.join(", "))
            }
            Term::Ctor(Ctor { ctor, fields }) => {
                if fields.is_empty() {
                    format!("{}", ctor)
                } else {
                    let fields = fields
                        .iter()
                        .map(|(f, e)| format!("{} = {}", f, e.inner_ref().fmt_args(fargs)))
                        .collect::<Vec<_>>();
                    format!("{} {{ {} }}", ctor, fields.join("; "))
                }
            }
            Term::Let(Let { rec, binds, body }) => {
                let kw = if *rec { "let rec" } else { "let" };
                let binds = binds
                    .iter()
                    .map(|(p, d)| {
                        format!(
                            "{} = {}",
                            p.inner_ref().fmt_args(fargs),
                            d.inner_ref().fmt_args(fargs)
                        )
                    })
                    .collect::<Vec<_>>();
                format!(
                    "{} {} in{}{}",
                    kw,
                    binds.join(" and "),
                    fargs.br_indent(),
                    body.inner_ref().fmt_args(fargs)
                )
            }
            Term::Fun(Fun { tparams, params, ret, body }) => {
                let mut s = format!("fun");
                if !tparams.is_empty() {
                    let tps =
                        tparams.iter().map(|b| b.fmt_args(fargs)).collect::<Vec<_>>().join(", ");
                    s += &format!(" [{}]", tps);
                }
                for p in params {
                    let p = p.inner_ref();
                    match p {
                        Pattern::Var(_) | Pattern::Wildcard(_) | Pattern::Tuple(_)
                        | Pattern::Ann(_) => s += &format!(" {}", p.fmt_args(fargs)),
                        _ => s += &format!(" ({})", p.fmt_args(fargs)),
                    }
                }
                s += &format!(
                    " : {} ={}{}",
                    ret.inner_ref().fmt_args(fargs),
                    fargs.indent().br_indent(),
                    body.inner_ref().fmt_args(fargs.indent())
                );
                s
            }
            Term::App(App { fun, arg }) => {
                format!(
                    "{} {}",
                    tm_app(fun.inner_ref(), fargs),
                    tm_atom(arg.inner_ref(), fargs)
                )
            }
            Term::Inst(Inst { fun, ty }) => {
                format!(
                    "{} [{}]",
                    tm_app(fun.inner_ref(), fargs),
                    ty.inner_ref().fmt_args(fargs)
                )
            }
            Term::Field(FieldProj { body, field }) => {
                format!("{}.{}", tm_atom(body.inner_ref(), fargs), field)
            }
            Term::Assign(Assign { body, field, value }) => {
                format!(
                    "{}.{} <- {}",
                    tm_atom(body.inner_ref(), fargs),
                    field,
                    tm_app(value.inner_ref(), fargs)
                )
            }
            Term::TagOf(TagUpdate { body, ctor }) => {
                format!("tag of {} <- {}", tm_atom(body.inner_ref(), fargs), ctor)
            }
            Term::Give(Give { gift, host }) => {
                format!(
                    "give {} to {}",
                    tm_app(gift.inner_ref(), fargs),
                    tm_app(host.inner_ref(), fargs)
                )
            }
            Term::Take(Take { gift, host }) => {
                format!(
                    "take {} from {}",
                    tm_app(gift.inner_ref(), fargs),
                    tm_app(host.inner_ref(), fargs)
                )
            }
            Term::Owns(Owns { host, gift }) => {
                format!(
                    "{} owns {}",
                    tm_app(host.inner_ref(), fargs),
                    tm_app(gift.inner_ref(), fargs)
                )
            }
            Term::Assert(Assert(p)) => {
                format!("assert {}", ty_below_arrow(p.inner_ref(), fargs))
            }
            Term::Fail(_) => format!("fail"),
            Term::If(If { cond, thn, els }) => {
                format!(
                    "if {} then {} else {}",
                    cond.inner_ref().fmt_args(fargs),
                    thn.inner_ref().fmt_args(fargs),
                    els.inner_ref().fmt_args(fargs)
                )
            }
            Term::Match(Match { scrut, arms }) => {
                let mut s = format!("match {} with", scrut.inner_ref().fmt_args(fargs));
                for Matcher { pat, body } in arms {
                    s += &format!(
                        "{}| {} -> {}",
                        fargs.br_indent(),
                        pat.inner_ref().fmt_args(fargs),
                        body.inner_ref().fmt_args(fargs.indent())
                    );
                }
                s += &format!("{}end", fargs.br_indent());
                s
            }
            Term::Ann(Ann { body, ty }) => {
                format!(
                    "({} : {})",
                    body.inner_ref().fmt_args(fargs),
                    ty.inner_ref().fmt_args(fargs)
                )
            }
            Term::Seq(Seq { fst, snd }) => {
                format!(
                    "{};{}{}",
                    tm_stmt(fst.inner_ref(), fargs),
                    fargs.br_indent(),
                    snd.inner_ref().fmt_args(fargs)
                )
            }
        }
    }
}

/* ------------------------------ Declarations ------------------------------ */

impl FmtArgs for Data<TypeV, CtorV, RcType> {
    fn fmt_args(&self, fargs: Args) -> String {
        let Data { flavor, name, params, ctors, adopts } = self;
        let mut s = match flavor {
            DataFlavor::Immutable => format!("data {}", name),
            DataFlavor::Mutable => format!("mutable data {}", name),
        };
        for (p, _) in params {
            s += &format!(" {}", p);
        }
        s += " =";
        for DataBr { ctor, fields } in ctors {
            s += &fargs.indent().br_indent();
            s += &format!("| {}", ctor);
            if !fields.is_empty() {
                let fields = fields
                    .iter()
                    .map(|(f, t)| format!("{}: {}", f, t.inner_ref().fmt_args(fargs)))
                    .collect::<Vec<_>>();
                s += &format!(" {{ {} }}", fields.join("; "));
            }
        }
        if let Some(t) = adopts {
            s += &format!(" adopts {}", t.inner_ref().fmt_args(fargs));
        }
        s
    }
}

impl FmtArgs for Declaration {
    fn fmt_args(&self, fargs: Args) -> String {
        match self {
            Declaration::Open(Open(m)) => format!("open {}", m),
            Declaration::Data(DataGroup(ds)) => {
                ds.iter().map(|d| d.fmt_args(fargs)).collect::<Vec<_>>().join("\nand ")
            }
            Declaration::Val(Val { pat, def }) => {
                format!(
                    "val {} = {}",
                    pat.inner_ref().fmt_args(fargs),
                    def.inner_ref().fmt_args(fargs)
                )
            }
            Declaration::ValSig(ValSig { name, ty }) => {
                format!("val {} : {}", name, ty.inner_ref().fmt_args(fargs))
            }
            Declaration::Abstract(AbstractDecl { name, params }) => {
                let mut s = format!("abstract {}", name);
                for (p, _) in params {
                    s += &format!(" {}", p);
                }
                s
            }
            Declaration::Fact(FactDecl { mode, name }) => {
                let mode = match mode {
                    FactMode::Duplicable => "duplicable",
                    FactMode::Exclusive => "exclusive",
                };
                format!("fact {} {}", mode, name)
            }
        }
    }
}

impl FmtArgs for Module {
    fn fmt_args(&self, fargs: Args) -> String {
        let mut s = String::new();
        for decl in &self.decls {
            s += &decl.inner_ref().fmt_args(fargs);
            s += "\n";
        }
        s
    }
}
