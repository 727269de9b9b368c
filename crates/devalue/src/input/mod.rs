//! Input readers - decode array-format text back into a value graph.

pub mod unflatten;
pub mod wire;

pub use unflatten::unflatten;
pub use wire::read;
