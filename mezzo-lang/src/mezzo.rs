//! The compilation driver: loads a unit and its interfaces, runs the
//! phases in order, and reports the first failure of each class.

use crate::library::builtins;
use crate::parse::{self, parser, syntax as ps, token::Tok};
use crate::statics::elab::{self, Scope};
use crate::statics::err::{KindError, TyckError};
use crate::statics::{add, env::Env, show_env, show_type, sub, syntax::*, tyck, tyck::TypeCheck};
use logos::Logos;
use mezzo_utils::span::{span, FileInfo, SpanView};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/* --------------------------------- Failures --------------------------------- */

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{}: cannot find file", path.display())]
    FileNotFound { path: PathBuf },
    #[error("cannot find module {name} in the include path")]
    ModuleNotFound { name: String },
    #[error("{0}")]
    Lexical(String),
    #[error("{0}")]
    InvalidCodepoint(String),
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Kind(String),
    #[error("{0}")]
    Tyck(String),
}

impl DriverError {
    /// The documented failure classes.
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::Lexical(_) => 255,
            DriverError::InvalidCodepoint(_) => 254,
            DriverError::Parse(_) => 253,
            DriverError::Kind(_) => 252,
            DriverError::Tyck(_) => 251,
            DriverError::FileNotFound { .. } | DriverError::ModuleNotFound { .. } => 250,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

/* ---------------------------------- Options --------------------------------- */

pub struct Options {
    pub include_dirs: Vec<PathBuf>,
    pub auto_include: bool,
    pub debug: usize,
    pub explain: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { include_dirs: Vec::new(), auto_include: true, debug: 0, explain: false }
    }
}

/// Parsed interfaces, cached for the lifetime of one invocation.
#[derive(Default)]
pub struct InterfaceCache {
    map: HashMap<String, Rc<ps::Module>>,
}

/* ---------------------------------- Loading --------------------------------- */

pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    pub info: FileInfo,
}

pub fn load_file(path: &Path) -> Result<SourceFile> {
    let source = std::fs::read_to_string(path)
        .map_err(|_| DriverError::FileNotFound { path: path.to_path_buf() })?;
    let info = FileInfo::new(&source, Rc::new(path.to_path_buf()));
    Ok(SourceFile { path: path.to_path_buf(), source, info })
}

/// Rejects the two lexical failure classes before parsing proper.
fn lex_check(file: &SourceFile) -> Result<()> {
    let mut lexer = Tok::lexer(&file.source);
    while let Some(tok) = lexer.next() {
        if let Tok::Error = tok {
            let range = lexer.span();
            let slice = &file.source[range.clone()];
            let cursor = file.info.trans_span2(range.start);
            let msg = format!(
                "{}:{}: [lex] unexpected input `{}`",
                file.path.display(),
                cursor,
                slice.escape_default()
            );
            if slice.chars().any(|c| !c.is_ascii()) {
                return Err(DriverError::InvalidCodepoint(msg));
            }
            return Err(DriverError::Lexical(msg));
        }
    }
    Ok(())
}

pub fn parse_module(file: &SourceFile) -> Result<ps::Module> {
    lex_check(file)?;
    parser::ProgParser::new()
        .parse(&file.source, parse::Lexer::new(&file.source))
        .map_err(|error| {
            let error = parse::err::ParseError { error, file_info: &file.info };
            DriverError::Parse(format!("{}: [parse] {}", file.path.display(), error))
        })
}

/// Every module mentioned by an `open` or a qualified name, in order of
/// first mention.
pub fn scan_dependencies(source: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut push = |name: &str| {
        if !deps.iter().any(|d| d == name) {
            deps.push(name.to_string());
        }
    };
    let mut lexer = Tok::lexer(source);
    let mut after_open = false;
    while let Some(tok) = lexer.next() {
        match tok {
            Tok::Open => after_open = true,
            Tok::LowerIdent(s) => {
                if after_open {
                    push(s);
                } else if let Some((m, _)) = s.split_once("::") {
                    push(m);
                }
                after_open = false;
            }
            _ => after_open = false,
        }
    }
    deps
}

/* --------------------------------- Rendering --------------------------------- */

fn render_kind_error(file: &SourceFile, e: KindError) -> DriverError {
    e.span().set_info(&file.info);
    let (start, _) = e.span().span1;
    let cursor = file.info.trans_span2(start);
    DriverError::Kind(format!(
        "{}:{}: [kind] {}",
        file.path.display(),
        cursor,
        e.inner_ref()
    ))
}

fn render_tyck_error(file: &SourceFile, e: TyckError, explain: bool) -> DriverError {
    e.item.span().set_info(&file.info);
    let (start, _) = e.item.span().span1;
    let cursor = file.info.trans_span2(start);
    let mut msg = format!(
        "{}:{}: [type] {}",
        file.path.display(),
        cursor,
        e.item.inner_ref()
    );
    if explain {
        msg += &format!("\nDerivation:\n{}", e.trace);
    }
    DriverError::Tyck(msg)
}

/* ---------------------------------- Checking --------------------------------- */

/// One dependency's contribution: its exported names and, for the final
/// perturbation check, the variables and types of its exported values.
struct ImportedModule {
    scope: Scope,
    exports: Vec<(String, Var, RcType)>,
}

pub struct Mezzo {
    pub opts: Options,
    cache: InterfaceCache,
}

impl Mezzo {
    pub fn new(opts: Options) -> Self {
        Mezzo { opts, cache: InterfaceCache::default() }
    }

    /// Checks one compilation unit; the `Ok` value is the number of
    /// toplevel values checked.
    pub fn check(&mut self, path: &Path) -> Result<usize> {
        let file = load_file(path)?;
        self.announce(&file, "parse");
        let module = parse_module(&file)?;

        self.announce(&file, "imports");
        let mut env = Env::new();
        let mut global = Scope::default();
        let mut imported: HashMap<String, ImportedModule> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        let mut deps: Vec<String> = Vec::new();
        if self.opts.auto_include {
            deps.extend(builtins::AUTO_INCLUDE.iter().map(|s| s.to_string()));
        }
        let unit_name = module_name(path);
        for d in scan_dependencies(&file.source) {
            if d != unit_name && !deps.contains(&d) {
                deps.push(d);
            }
        }
        let mut i = 0;
        while i < deps.len() {
            let name = deps[i].clone();
            i += 1;
            if imported.contains_key(&name) {
                continue;
            }
            let (iface_file, iface) = self.load_interface(&name)?;
            // an interface may pull in further modules
            for d in scan_dependencies(&iface_file.source) {
                if d != name && !deps.contains(&d) {
                    deps.push(d.clone());
                }
            }
            let (e, m) = self.import_interface(env, &imported, &iface_file, &name, &iface)?;
            env = e;
            // qualified names are always visible; the auto-included
            // modules also export unqualified ones
            let auto = builtins::AUTO_INCLUDE.contains(&name.as_str());
            global = merge_scopes(&global, &m.scope, &name, auto);
            order.push(name.clone());
            imported.insert(name, m);
        }

        self.announce(&file, "check");
        let mut ctx = tyck::Ctx::new(env, global);
        let mut checked = 0;
        for decl in &module.decls {
            match decl.inner_ref() {
                ps::Declaration::Open(ps::Open(m)) => {
                    let name = m.name().to_string();
                    match imported.get(&name) {
                        Some(module) => {
                            ctx.scope = merge_scopes(&ctx.scope, &module.scope, &name, true);
                        }
                        None => return Err(DriverError::ModuleNotFound { name }),
                    }
                }
                ps::Declaration::Data(group) => {
                    let (env, scope, _) =
                        elab::bind_data_group(&ctx.env, &ctx.scope, group, decl.span())
                            .map_err(|e| render_kind_error(&file, e))?;
                    ctx.env = env;
                    ctx.scope = scope;
                }
                ps::Declaration::Val(ps::Val { pat, def }) => {
                    let pat = elab::elab_pattern(&ctx.env, &ctx.scope, pat)
                        .map_err(|e| render_kind_error(&file, e))?;
                    let expr = elab::elab_term(&ctx.env, &ctx.scope, def.as_ref())
                        .map_err(|e| render_kind_error(&file, e))?;
                    let (c, v) = expr
                        .syn(ctx)
                        .map_err(|e| render_tyck_error(&file, e, self.opts.explain))?;
                    ctx = tyck::bind_toplevel_pattern(c, &pat, v)
                        .map_err(|e| render_tyck_error(&file, e, self.opts.explain))?;
                    checked += 1;
                    if self.opts.explain {
                        for note in ctx.notes.iter() {
                            eprintln!("note: {}", note);
                        }
                    }
                    ctx.notes = im::Vector::new();
                    ctx.trace = Default::default();
                }
                ps::Declaration::ValSig(_)
                | ps::Declaration::Abstract(_)
                | ps::Declaration::Fact(_) => {
                    return Err(render_kind_error(
                        &file,
                        decl.span()
                            .make(crate::statics::err::KindErrorItem::IllegalImplementationDecl),
                    ));
                }
            }
        }

        if self.opts.debug >= 2 {
            eprintln!("{}", show_env(&ctx.env));
        }

        // the unit's own interface, when present
        if let Some((iface_file, iface)) = self.find_own_interface(path, &unit_name)? {
            self.announce(&file, "export");
            self.check_exports(&file, &iface_file, &iface, &mut ctx)?;
        }

        // nothing of the dependencies may have been consumed
        for name in &order {
            let m = &imported[name];
            for (export, v, t) in &m.exports {
                if sub::sub(&ctx.env, *v, t).is_none() {
                    let e = tyck::Ctx::new(ctx.env.clone(), ctx.scope.clone()).err(
                        &span(0, 0),
                        crate::statics::err::TyckErrorItem::PerturbedDependency {
                            module: name.clone(),
                            perm: format!("{} @ {}", export, show_type(&ctx.env, t)),
                        },
                    );
                    return Err(render_tyck_error(&file, e, self.opts.explain));
                }
            }
        }
        Ok(checked)
    }

    fn announce(&self, file: &SourceFile, phase: &str) {
        if self.opts.debug >= 1 {
            eprintln!("=== [{}] <{}>", file.path.display(), phase);
        }
    }

    fn module_search(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.opts.include_dirs {
            let candidate = dir.join(format!("{}.mzi", name));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn load_interface(&mut self, name: &str) -> Result<(SourceFile, Rc<ps::Module>)> {
        let file = match self.module_search(name) {
            Some(path) => load_file(&path)?,
            None => match builtins::embedded(name) {
                Some(src) => SourceFile {
                    path: PathBuf::from(format!("<builtin>/{}.mzi", name)),
                    source: src.to_string(),
                    info: FileInfo::new(src, Rc::new(PathBuf::from(format!("{}.mzi", name)))),
                },
                None => return Err(DriverError::ModuleNotFound { name: name.to_string() }),
            },
        };
        if let Some(m) = self.cache.map.get(name) {
            return Ok((file, m.clone()));
        }
        let module = Rc::new(parse_module(&file)?);
        self.cache.map.insert(name.to_string(), module.clone());
        Ok((file, module))
    }

    fn find_own_interface(
        &mut self, path: &Path, name: &str,
    ) -> Result<Option<(SourceFile, Rc<ps::Module>)>> {
        let sibling = path.with_extension("mzi");
        let iface_path = if sibling.is_file() {
            Some(sibling)
        } else {
            self.module_search(name)
        };
        match iface_path {
            None => Ok(None),
            Some(p) => {
                let file = load_file(&p)?;
                let module = Rc::new(parse_module(&file)?);
                Ok(Some((file, module)))
            }
        }
    }

    /// Installs one dependency's interface into the environment.
    fn import_interface(
        &self, env: Env, imported: &HashMap<String, ImportedModule>, file: &SourceFile,
        name: &str, module: &ps::Module,
    ) -> Result<(Env, ImportedModule)> {
        let mut env = env;
        // the interface sees the auto-included modules plus its own opens
        let mut local = Scope::default();
        for auto in builtins::AUTO_INCLUDE {
            if *auto == name {
                continue;
            }
            if let Some(m) = imported.get(*auto) {
                local = merge_scopes(&local, &m.scope, auto, true);
            }
        }
        let mut exported = Scope::default();
        let mut exports = Vec::new();
        for decl in &module.decls {
            match decl.inner_ref() {
                ps::Declaration::Open(ps::Open(m)) => {
                    let dep = m.name().to_string();
                    match imported.get(&dep) {
                        Some(module) => {
                            local = merge_scopes(&local, &module.scope, &dep, true);
                        }
                        None => return Err(DriverError::ModuleNotFound { name: dep }),
                    }
                }
                ps::Declaration::Data(group) => {
                    let (e, scope, _) = elab::bind_data_group(&env, &local, group, decl.span())
                        .map_err(|e| render_kind_error(file, e))?;
                    env = e;
                    export_scope_diff(&local, &scope, &mut exported);
                    local = scope;
                }
                ps::Declaration::Abstract(a) => {
                    let (e, scope, _) = elab::bind_abstract(&env, &local, a, decl.span())
                        .map_err(|e| render_kind_error(file, e))?;
                    env = e;
                    export_scope_diff(&local, &scope, &mut exported);
                    local = scope;
                }
                ps::Declaration::Fact(fd) => {
                    env = elab::apply_fact_decl(&env, &local, fd, decl.span())
                        .map_err(|e| render_kind_error(file, e))?;
                }
                ps::Declaration::ValSig(ps::ValSig { name: x, ty }) => {
                    let (t, k) = elab::elab_type(&env, &local, &Vec::new(), ty)
                        .map_err(|e| render_kind_error(file, e))?;
                    if k != Kind::Type {
                        return Err(render_kind_error(
                            file,
                            ty.span().make(crate::statics::err::KindErrorItem::KindMismatch {
                                context: format!("exported value `{}`", x),
                                expected: Kind::Type,
                                found: k,
                            }),
                        ));
                    }
                    let (e, v) = env.bind_term(x.name(), decl.span());
                    env = add::add(&e, v, t.clone());
                    local.terms.insert(x.clone(), v);
                    exported.terms.insert(x.clone(), v);
                    exports.push((x.name().to_string(), v, t));
                }
                ps::Declaration::Val(_) => {
                    return Err(render_kind_error(
                        file,
                        decl.span()
                            .make(crate::statics::err::KindErrorItem::IllegalInterfaceDecl),
                    ));
                }
            }
        }
        Ok((env, ImportedModule { scope: exported, exports }))
    }

    /// Matches the implementation's final environment against its own
    /// interface: kinds first, then a subtraction per exported value.
    fn check_exports(
        &self, file: &SourceFile, iface_file: &SourceFile, iface: &ps::Module,
        ctx: &mut tyck::Ctx,
    ) -> Result<()> {
        for decl in &iface.decls {
            match decl.inner_ref() {
                ps::Declaration::ValSig(ps::ValSig { name, ty }) => {
                    let Some(&v) = ctx.scope.terms.get(name) else {
                        let e = ctx.err(
                            decl.span(),
                            crate::statics::err::TyckErrorItem::MissingExport {
                                name: name.name().to_string(),
                            },
                        );
                        return Err(render_tyck_error(iface_file, e, self.opts.explain));
                    };
                    let (t, k) = elab::elab_type(&ctx.env, &ctx.scope, &Vec::new(), ty)
                        .map_err(|e| render_kind_error(iface_file, e))?;
                    if k != Kind::Type {
                        return Err(render_kind_error(
                            iface_file,
                            ty.span().make(crate::statics::err::KindErrorItem::KindMismatch {
                                context: format!("exported value `{}`", name),
                                expected: Kind::Type,
                                found: k,
                            }),
                        ));
                    }
                    match sub::sub(&ctx.env, v, &t) {
                        Some(env) => {
                            // exporting keeps the permission available
                            ctx.env = add::add(&env, v, t);
                        }
                        None => {
                            let e = ctx.err(
                                decl.span(),
                                crate::statics::err::TyckErrorItem::SignatureMismatch {
                                    name: name.name().to_string(),
                                    expected: show_type(&ctx.env, &t),
                                },
                            );
                            return Err(render_tyck_error(file, e, self.opts.explain));
                        }
                    }
                }
                ps::Declaration::Data(ps::DataGroup(ds)) => {
                    for d in ds {
                        if !ctx.scope.types.contains_key(&d.name) {
                            let e = ctx.err(
                                decl.span(),
                                crate::statics::err::TyckErrorItem::MissingExport {
                                    name: d.name.name().to_string(),
                                },
                            );
                            return Err(render_tyck_error(iface_file, e, self.opts.explain));
                        }
                    }
                }
                ps::Declaration::Abstract(a) => {
                    if !ctx.scope.types.contains_key(&a.name) {
                        let e = ctx.err(
                            decl.span(),
                            crate::statics::err::TyckErrorItem::MissingExport {
                                name: a.name.name().to_string(),
                            },
                        );
                        return Err(render_tyck_error(iface_file, e, self.opts.explain));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// The environment and scope a unit starts from when auto-include is on.
pub fn prelude_context() -> Result<tyck::Ctx> {
    let mut mz = Mezzo::new(Options::default());
    let mut env = Env::new();
    let mut global = Scope::default();
    let mut imported = HashMap::new();
    for name in builtins::AUTO_INCLUDE {
        let (file, iface) = mz.load_interface(name)?;
        let (e, m) = mz.import_interface(env, &imported, &file, name, &iface)?;
        env = e;
        global = merge_scopes(&global, &m.scope, name, true);
        imported.insert(name.to_string(), m);
    }
    Ok(tyck::Ctx::new(env, global))
}

fn module_name(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("main").to_string()
}

/// Adds `from`'s names to `into`, qualified with the module name, plus
/// unqualified aliases when the module is opened.
fn merge_scopes(into: &Scope, from: &Scope, module: &str, opened: bool) -> Scope {
    let mut out = into.clone();
    for (k, v) in from.types.iter() {
        let qualified = TypeV::new(format!("{}::{}", module, k.name()), span(0, 0));
        out.types.insert(qualified, *v);
        if opened {
            out.types.insert(k.clone(), *v);
        }
    }
    for (k, v) in from.terms.iter() {
        let qualified = TermV::new(format!("{}::{}", module, k.name()), span(0, 0));
        out.terms.insert(qualified, *v);
        if opened {
            out.terms.insert(k.clone(), *v);
        }
    }
    for (k, v) in from.ctors.iter() {
        out.ctors.insert(k.clone(), *v);
    }
    out
}

/// Everything `after` knows that `before` did not is an export.
fn export_scope_diff(before: &Scope, after: &Scope, exported: &mut Scope) {
    for (k, v) in after.types.iter() {
        if !before.types.contains_key(k) {
            exported.types.insert(k.clone(), *v);
        }
    }
    for (k, v) in after.ctors.iter() {
        if !before.ctors.contains_key(k) {
            exported.ctors.insert(k.clone(), *v);
        }
    }
    for (k, v) in after.terms.iter() {
        if !before.terms.contains_key(k) {
            exported.terms.insert(k.clone(), *v);
        }
    }
}
