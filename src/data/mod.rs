//! Data records and codecs: element sets, conjunction assessments and their file formats

mod conjunction;
mod loader;
mod source;
mod tle;

pub use conjunction::*;
pub use loader::*;
pub use source::*;
pub use tle::*;

#[cfg(test)]
pub(crate) use tle::fixtures;
