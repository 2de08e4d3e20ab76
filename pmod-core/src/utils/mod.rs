//! Utility re-exports and helper macros for the Pmod drivers.
//!
//! - `controllers`: peripheral drivers (accelerometer, ADC, joystick, LCD, motor,
//!   LEDs, buttons) and their command channels
//! - `errors`: bit-set argument error types
//! - `math`: motor speed estimation and demo steering decisions
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod controllers;
pub mod errors;
pub mod math;

pub use controllers::SystemController;
pub use embassy_time::*;
pub use math::reaction::{RealTimeClock, ReactionContext};

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
