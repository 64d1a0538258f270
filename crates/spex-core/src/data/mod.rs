//! Post-conversion data corrections and diagnostics: bad-channel cleaning
//! and the resolution / optimal-binning analysis.

mod badchannels;
mod resolution;

pub use badchannels::{bad_channel_masks, clean_region, BadChannelMasks};
pub use resolution::{
    optimal_bin_width, plan_model_grid, ResolutionElement, ResolutionProfile,
};
