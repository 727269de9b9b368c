//! Output writers - render a walked value graph as text.

pub mod stringify;
pub mod uneval;

pub use stringify::ArrayWriter;
pub use uneval::ExpressionWriter;
