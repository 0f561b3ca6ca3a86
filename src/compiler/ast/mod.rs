pub mod location;

pub use location::{LineIndex, SourceLocationExt};
