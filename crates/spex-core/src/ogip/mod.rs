//! Read-only OGIP source formats: pulse-height spectra (PHA), grouped
//! redistribution matrices with channel energy bounds (RMF), and effective
//! area curves (ARF).

mod arf;
mod pha;
mod rmf;

pub use arf::Arf;
pub use pha::{DataType, Pha};
pub use rmf::Rmf;
