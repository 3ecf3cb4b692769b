//! Small pieces shared by every taskbridge crate: the error-context macro and
//! text helpers for previews.

pub mod error;
pub mod text;

pub use error::FromMessage;
