pub mod span;
pub mod fmt;
pub mod wrappers;

pub mod prelude {
    pub use crate::fmt::FmtArgs;
    pub use crate::span::{Span, SpanInfo, SpanView};
}
