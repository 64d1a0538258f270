//! Target-side SPEX data model: the flat multi-region spectrum (spo), the
//! sparse three-table response matrix (res), and the region/dataset algebra
//! on top of them.

mod dataset;
mod region;
mod res;
mod spo;

pub use dataset::Dataset;
pub use region::Region;
pub use res::{ResponseMatrix, ResponseRegionMask};
pub use spo::{Spectrum, SpectrumRegionMask};
