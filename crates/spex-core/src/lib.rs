//! Core data model and algorithms for converting OGIP spectral data
//! (PHA/RMF/ARF) into the SPEX spo/res format.
//!
//! The crate is organised around the two format families: [`ogip`] holds the
//! read-only source side, [`spex`] the target-side tables and their region
//! algebra, [`convert`] the pure mapping between them, and [`data`] the
//! post-conversion corrections (bad-channel cleaning, resolution and
//! optimal-binning analysis). All file access goes through the
//! [`table::TabularStore`] collaborator; the algorithms themselves never
//! touch a file.

pub mod convert;
pub mod data;
pub mod domain;
pub mod ogip;
pub mod spex;
pub mod table;
