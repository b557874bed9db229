//! The two modules every compilation unit depends on unless told
//! otherwise. They are linked into the binary; an include directory may
//! shadow them with files of the same name.

pub const CORE: &str = include_str!("core.mzi");
pub const PERVASIVES: &str = include_str!("pervasives.mzi");

/// Auto-included modules, in import order.
pub const AUTO_INCLUDE: &[&str] = &["core", "pervasives"];

pub fn embedded(name: &str) -> Option<&'static str> {
    match name {
        "core" => Some(CORE),
        "pervasives" => Some(PERVASIVES),
        _ => None,
    }
}
