//! The typing environment: one entry per variable, a floating-permission
//! list, and the inconsistency flag.
//!
//! `Env` is persistent: every mutation returns a new value and the old one
//! stays usable. The subtraction search and the merge at control-flow
//! joins both depend on cheap snapshots.

use super::syntax::*;
use mezzo_utils::span::SpanInfo;

/// The instantiation state of a variable.
#[derive(Clone, Debug)]
pub enum Binder {
    Rigid,
    /// A unification variable, possibly instantiated.
    Flexible(Option<RcType>),
    /// Collapsed into another variable by `merge_left`.
    Link(Var),
}

#[derive(Clone, Debug)]
pub struct VarEntry {
    pub names: im::Vector<String>,
    pub kind: Kind,
    pub locs: im::Vector<SpanInfo>,
    pub binder: Binder,
    pub flavor: Flavor,
    /// Permission list; only populated for `Term`-kinded variables.
    pub perms: im::Vector<RcType>,
    /// Data-type definition; only for `Type`-kinded variables.
    pub definition: Option<Definition>,
    pub fact: Option<Fact>,
    pub variance: Vec<Variance>,
}

impl VarEntry {
    pub fn name(&self) -> String {
        self.names.front().cloned().unwrap_or_else(|| format!("_"))
    }
}

#[derive(Clone, Debug)]
pub struct Env {
    vars: im::OrdMap<Var, VarEntry>,
    floating: im::Vector<RcType>,
    next: usize,
    inconsistent: bool,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    pub fn new() -> Self {
        Env { vars: im::OrdMap::new(), floating: im::Vector::new(), next: 0, inconsistent: false }
    }

    /* ------------------------------- Binding ------------------------------- */

    fn bind(&self, binding: &Binding, binder: Binder) -> (Env, Var) {
        let v = Var(self.next);
        let mut perms = im::Vector::new();
        if let Kind::Term = binding.kind {
            perms.push_back(Type::singleton(v));
        }
        let entry = VarEntry {
            names: binding.name.iter().cloned().collect(),
            kind: binding.kind.clone(),
            locs: im::Vector::unit(binding.loc.clone()),
            binder,
            flavor: binding.flavor,
            perms,
            definition: None,
            fact: None,
            variance: Vec::new(),
        };
        let mut env = self.clone();
        env.vars.insert(v, entry);
        env.next += 1;
        (env, v)
    }

    pub fn bind_rigid(&self, binding: &Binding) -> (Env, Var) {
        self.bind(binding, Binder::Rigid)
    }

    pub fn bind_flexible(&self, binding: &Binding) -> (Env, Var) {
        self.bind(binding, Binder::Flexible(None))
    }

    /// Binds a named rigid term variable.
    pub fn bind_term(&self, name: &str, loc: &SpanInfo) -> (Env, Var) {
        self.bind_rigid(&Binding {
            name: Some(name.to_string()),
            kind: Kind::Term,
            flavor: Flavor::CannotInstantiate,
            loc: loc.clone(),
        })
    }

    /// Opens `Forall(b, body)` with a rigid variable.
    pub fn open_forall(&self, q: &Forall) -> (Env, Var, RcType) {
        let (env, v) = self.bind_rigid(&q.binding);
        (env, v, Type::open_with(&q.body, v))
    }

    /// Opens `Forall(b, body)` with a flexible variable.
    pub fn open_forall_flexible(&self, q: &Forall) -> (Env, Var, RcType) {
        let (env, v) = self.bind_flexible(&q.binding);
        (env, v, Type::open_with(&q.body, v))
    }

    /// Opens `Exists(b, body)` with a rigid variable.
    pub fn open_exists(&self, q: &Exists) -> (Env, Var, RcType) {
        let (env, v) = self.bind_rigid(&q.binding);
        (env, v, Type::open_with(&q.body, v))
    }

    /// Opens `Exists(b, body)` with a flexible variable.
    pub fn open_exists_flexible(&self, q: &Exists) -> (Env, Var, RcType) {
        let (env, v) = self.bind_flexible(&q.binding);
        (env, v, Type::open_with(&q.body, v))
    }

    /* ------------------------------- Lookups ------------------------------- */

    pub fn entry(&self, v: Var) -> &VarEntry {
        &self.vars[&v]
    }

    pub fn contains(&self, v: Var) -> bool {
        self.vars.contains_key(&v)
    }

    /// Chases `Link`s and variable-to-variable instantiations; idempotent.
    pub fn repr(&self, v: Var) -> Var {
        let mut v = v;
        loop {
            match &self.vars[&v].binder {
                Binder::Link(w) => v = *w,
                Binder::Flexible(Some(t)) => match t.as_ref() {
                    Type::Open(Open(w)) => v = *w,
                    _ => return v,
                },
                _ => return v,
            }
        }
    }

    /// Resolves an instantiated flexible at the root of a type.
    pub fn modulo_flex(&self, ty: &RcType) -> RcType {
        match ty.as_ref() {
            Type::Open(Open(v)) => {
                let r = self.repr(*v);
                match &self.vars[&r].binder {
                    Binder::Flexible(Some(t)) => t.clone(),
                    _ => {
                        if r == *v {
                            ty.clone()
                        } else {
                            Type::open(r)
                        }
                    }
                }
            }
            _ => ty.clone(),
        }
    }

    pub fn kind_of(&self, v: Var) -> &Kind {
        &self.vars[&self.repr(v)].kind
    }

    pub fn name_of(&self, v: Var) -> String {
        let r = self.repr(v);
        let entry = &self.vars[&r];
        entry.names.front().cloned().unwrap_or_else(|| format!("{}", r))
    }

    /// An uninstantiated unification variable?
    pub fn is_flexible(&self, v: Var) -> bool {
        matches!(self.vars[&self.repr(v)].binder, Binder::Flexible(None))
    }

    /// Flavor-aware: may this variable be picked by an instantiation?
    pub fn can_instantiate(&self, v: Var, ty: &RcType) -> bool {
        let r = self.repr(v);
        self.is_flexible(r)
            && self.vars[&r].flavor == Flavor::CanInstantiate
            && !self.occurs(r, ty)
    }

    /// Does `r` occur in `ty`, through links and instantiations?
    pub fn occurs(&self, r: Var, ty: &RcType) -> bool {
        let mut free = std::collections::BTreeSet::new();
        Type::free_vars(ty, &mut free);
        free.into_iter().any(|w| {
            let w = self.repr(w);
            if w == r {
                return true;
            }
            match &self.vars[&w].binder {
                Binder::Flexible(Some(t)) => self.occurs(r, t),
                _ => false,
            }
        })
    }

    /// Instantiates a flexible variable; fails on the occurs-check or if
    /// the variable is not an uninstantiated flexible.
    pub fn instantiate_flexible(&self, v: Var, ty: &RcType) -> Option<Env> {
        let r = self.repr(v);
        if !matches!(self.vars[&r].binder, Binder::Flexible(None)) {
            return None;
        }
        let ty = self.modulo_flex(ty);
        if let Type::Open(Open(w)) = ty.as_ref() {
            if self.repr(*w) == r {
                // x := x is a no-op, not a cycle
                return Some(self.clone());
            }
        }
        if self.occurs(r, &ty) {
            return None;
        }
        let mut env = self.clone();
        let entry = env.vars[&r].clone();
        env.vars.insert(r, VarEntry { binder: Binder::Flexible(Some(ty)), ..entry });
        Some(env)
    }

    /* ------------------------------ Permissions ----------------------------- */

    pub fn get_permissions(&self, v: Var) -> im::Vector<RcType> {
        self.vars[&self.repr(v)].perms.clone()
    }

    pub fn set_permissions(&self, v: Var, perms: im::Vector<RcType>) -> Env {
        let r = self.repr(v);
        let mut env = self.clone();
        let entry = env.vars[&r].clone();
        env.vars.insert(r, VarEntry { perms, ..entry });
        env
    }

    pub fn push_permission(&self, v: Var, ty: RcType) -> Env {
        let r = self.repr(v);
        let mut perms = self.vars[&r].perms.clone();
        perms.push_back(ty);
        self.set_permissions(r, perms)
    }

    pub fn add_floating_perm(&self, p: RcType) -> Env {
        let mut env = self.clone();
        env.floating.push_back(p);
        env
    }

    pub fn floating_perms(&self) -> im::Vector<RcType> {
        self.floating.clone()
    }

    pub fn set_floating_perms(&self, floating: im::Vector<RcType>) -> Env {
        let mut env = self.clone();
        env.floating = floating;
        env
    }

    /// Collapses `v2` into `v1`, merging names and permission lists. The
    /// self-witness of `v2` is dropped; everything else carries over.
    pub fn merge_left(&self, v1: Var, v2: Var) -> Env {
        let r1 = self.repr(v1);
        let r2 = self.repr(v2);
        if r1 == r2 {
            return self.clone();
        }
        let mut env = self.clone();
        let e2 = env.vars[&r2].clone();
        let e1 = env.vars[&r1].clone();
        let mut perms = e1.perms.clone();
        for p in e2.perms.iter() {
            if let Type::Singleton(Singleton(inner)) = p.as_ref() {
                if let Type::Open(Open(w)) = inner.as_ref() {
                    let w = self.repr(*w);
                    if w == r1 || w == r2 {
                        continue;
                    }
                }
            }
            perms.push_back(p.clone());
        }
        let mut names = e1.names.clone();
        names.extend(e2.names.iter().cloned());
        let mut locs = e1.locs.clone();
        locs.extend(e2.locs.iter().cloned());
        env.vars.insert(r1, VarEntry { perms, names, locs, ..e1 });
        env.vars.insert(
            r2,
            VarEntry { binder: Binder::Link(r1), perms: im::Vector::new(), ..e2 },
        );
        env
    }

    /* ----------------------------- Inconsistency ---------------------------- */

    pub fn mark_inconsistent(&self) -> Env {
        let mut env = self.clone();
        env.inconsistent = true;
        env
    }

    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent
    }

    /* ------------------------------ Definitions ----------------------------- */

    pub fn get_definition(&self, v: Var) -> Option<&Definition> {
        self.vars[&self.repr(v)].definition.as_ref()
    }

    pub fn update_definition(&self, v: Var, definition: Definition) -> Env {
        let r = self.repr(v);
        let mut env = self.clone();
        let entry = env.vars[&r].clone();
        env.vars.insert(r, VarEntry { definition: Some(definition), ..entry });
        env
    }

    pub fn get_fact(&self, v: Var) -> Option<Fact> {
        self.vars[&self.repr(v)].fact
    }

    pub fn set_fact(&self, v: Var, fact: Fact) -> Env {
        let r = self.repr(v);
        let mut env = self.clone();
        let entry = env.vars[&r].clone();
        env.vars.insert(r, VarEntry { fact: Some(fact), ..entry });
        env
    }

    pub fn get_variance(&self, v: Var) -> Vec<Variance> {
        self.vars[&self.repr(v)].variance.clone()
    }

    pub fn set_variance(&self, v: Var, variance: Vec<Variance>) -> Env {
        let r = self.repr(v);
        let mut env = self.clone();
        let entry = env.vars[&r].clone();
        env.vars.insert(r, VarEntry { variance, ..entry });
        env
    }

    /* -------------------------------- Iteration ------------------------------ */

    /// Live `Term`-kinded variables, in creation order.
    pub fn term_vars(&self) -> Vec<Var> {
        self.vars
            .iter()
            .filter(|(_, e)| {
                matches!(e.kind, Kind::Term) && !matches!(e.binder, Binder::Link(_))
            })
            .map(|(v, _)| *v)
            .collect()
    }

    /// Live `Type`-kinded (and arrow-kinded) variables, in creation order.
    pub fn type_vars(&self) -> Vec<Var> {
        self.vars
            .iter()
            .filter(|(_, e)| {
                !matches!(e.kind, Kind::Term) && !matches!(e.binder, Binder::Link(_))
            })
            .map(|(v, _)| *v)
            .collect()
    }

    /// Flexible variables introduced at or after `mark`.
    pub fn flexibles_since(&self, mark: usize) -> Vec<Var> {
        self.vars
            .iter()
            .filter(|(v, e)| v.0 >= mark && matches!(e.binder, Binder::Flexible(_)))
            .map(|(v, _)| *v)
            .collect()
    }

    /// A watermark for `flexibles_since`.
    pub fn mark(&self) -> usize {
        self.next
    }

    /// Imports the flexible-variable instantiations of `other` (a
    /// descendant of `self`) without importing its permissions. Variables
    /// unknown to `self` are copied wholesale so instantiations can refer
    /// to them.
    pub fn import_flex_instantiations(&self, other: &Env) -> Env {
        let mut env = self.clone();
        env.next = other.next;
        for (v, e) in other.vars.iter() {
            match env.vars.get(v) {
                None => {
                    env.vars.insert(*v, e.clone());
                }
                Some(mine) => {
                    let flexible_here = matches!(mine.binder, Binder::Flexible(None));
                    let decided_there = !matches!(e.binder, Binder::Flexible(None));
                    if flexible_here && decided_there {
                        let entry = VarEntry { binder: e.binder.clone(), ..mine.clone() };
                        env.vars.insert(*v, entry);
                    }
                }
            }
        }
        env
    }

    /// Re-opens an instantiated flexible, for merges that must forget a
    /// branch-local instantiation.
    pub fn reflexibilize(&self, v: Var) -> Env {
        let mut env = self.clone();
        let entry = env.vars[&v].clone();
        env.vars.insert(v, VarEntry { binder: Binder::Flexible(None), ..entry });
        env
    }
}
