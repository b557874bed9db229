use crate::syntax::*;
use mezzo_utils::span::{Span, SpanInfo, SpanView};
use std::fmt;
use thiserror::Error;

/* -------------------------------- Kind errors ------------------------------- */

/// Errors raised while kind-checking the surface syntax and translating it
/// to the internal representation. They abort the declaration.
#[derive(Error, Clone, Debug)]
pub enum KindErrorItem {
    #[error("Unbound variable {var}")]
    UnboundVar { var: TermV },
    #[error("Unbound type variable {tvar}")]
    UnboundTypeVar { tvar: TypeV },
    #[error("Unknown data constructor {ctor}")]
    UnknownConstructor { ctor: CtorV },
    #[error("Kind mismatch. In {context}, expected {expected}, but got {found}")]
    KindMismatch { context: String, expected: Kind, found: Kind },
    #[error("In {context}, expected {expected} arguments but got {found}")]
    ArityMismatch { context: String, expected: usize, found: usize },
    #[error("Constructor {ctor} has no field {field}")]
    UnknownField { ctor: CtorV, field: FieldV },
    #[error("Field {field} of {ctor} is missing")]
    MissingField { ctor: CtorV, field: FieldV },
    #[error("Field {field} of {ctor} is given twice")]
    DuplicateField { ctor: CtorV, field: FieldV },
    #[error("A consumes annotation is only legal in the domain of an arrow")]
    IllegalConsumes,
    #[error("A mode implication can only be attached to an arrow type")]
    ImplicationOnNonArrow,
    #[error("Data type {name} has {count} parameters; at most 64 are supported")]
    TooManyParameters { name: TypeV, count: usize },
    #[error("An adopts clause requires the data type to be mutable")]
    AdoptsOnImmutable,
    #[error("This declaration is not allowed in an implementation")]
    IllegalImplementationDecl,
    #[error("This declaration is not allowed in an interface")]
    IllegalInterfaceDecl,
    #[error("The lambda parameter needs a type annotation")]
    MissingParamAnnotation,
}

pub type KindError = Span<KindErrorItem>;

/* -------------------------------- Type errors ------------------------------- */

#[derive(Clone, Debug)]
pub struct TyckError {
    pub item: Span<TyckErrorItem>,
    pub trace: Trace,
}

impl fmt::Display for TyckError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.item.inner_ref())?;
        writeln!(f, "\t({})", self.item.span())?;
        writeln!(f)?;
        writeln!(f, "Trace:")?;
        write!(f, "{}", self.trace)?;
        Ok(())
    }
}

/// Errors raised by the permission checker. They abort the enclosing
/// toplevel item; the driver carries on with the next one.
#[derive(Error, Clone, Debug)]
pub enum TyckErrorItem {
    #[error("Unbound variable {var}")]
    UnboundVar { var: TermV },
    #[error("{var} does not have the expected permission {expected}")]
    ExpectedPermission { var: String, expected: String },
    #[error("The permission {wanted} cannot be obtained here")]
    NoSuchPermission { wanted: String },
    #[error("{found} is not a function")]
    NotAFunction { found: String },
    #[error("This quantifier may not be instantiated by hand")]
    CannotInstantiate,
    #[error("{found} has no polymorphic permission to instantiate")]
    NothingToInstantiate { found: String },
    #[error("Cannot assign: no exclusive permission with field {field}")]
    AssignToNonExclusive { field: FieldV },
    #[error("Cannot read field {field}: no concrete permission carries it")]
    NoSuchField { field: FieldV },
    #[error("Tag update requires {expected} fields, but {found} are present")]
    TagChangeArity { expected: usize, found: usize },
    #[error("{host} has no adopts clause")]
    NoAdoptsClause { host: String },
    #[error("The adoptee must have an exclusive type, but {ty} is not")]
    NonExclusiveAdoptee { ty: String },
    #[error("The scrutinee of this match is not a data type")]
    MatchScrutineeNotData,
    #[error("An if condition needs a two-constructor data type, but got {ty}")]
    IfNotTwoBranches { ty: String },
    #[error("This pattern does not match the shape of the value: {context}")]
    PatternMismatch { context: String },
    #[error("Conflicting type annotations: {left} vs {right}")]
    ConflictingAnnotations { left: String, right: String },
    #[error("The exported value {name} does not match its interface type {expected}")]
    SignatureMismatch { name: String, expected: String },
    #[error("The interface exports {name}, which the implementation does not define")]
    MissingExport { name: String },
    #[error("Checking this module consumed {perm} from module {module}")]
    PerturbedDependency { module: String, perm: String },
    #[error(transparent)]
    Kind(#[from] KindErrorItem),
}

/* ---------------------------------- Trace ---------------------------------- */

/// The derivation evidence: one frame per rule fired on the way to the
/// failure, innermost last.
#[derive(Clone, Debug, Default)]
pub struct Trace(pub im::Vector<Frame>);

impl Trace {
    pub fn push(&mut self, frame: Frame) {
        self.0.push_back(frame);
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in self.0.iter().rev() {
            write!(f, "- {}", frame)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub rule: String,
    pub subject: String,
    pub info: SpanInfo,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "When {}:", self.rule)?;
        writeln!(f, "\t{}", self.subject)?;
        writeln!(f, "\t({})", self.info)?;
        Ok(())
    }
}
