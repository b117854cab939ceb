pub mod slice;
pub use slice::*;
