pub mod batch;
pub mod discover;
pub mod errors;
pub mod file;
pub mod layout;
pub mod ledger;
pub mod load;
pub mod metadata;
pub mod patient;
pub mod save;
pub mod series;
pub mod transform;
pub mod volume;

#[cfg(test)]
mod testing;

pub use layout::*;
pub use metadata::*;
pub use transform::*;
pub use volume::*;
