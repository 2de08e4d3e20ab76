//! Math utilities for the Pmod demos.
//!
//! - `reaction`: encoder-based motor speed estimation
//! - `steering`: line-follower and joystick drive decisions

pub mod reaction;
pub mod steering;
