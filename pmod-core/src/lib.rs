//! Drivers and demo logic for Digilent Pmod peripherals on no-std embedded platforms.
//!
//! For a runnable host simulation, see the `pmod-app/mock-mcu` binary.
#![no_std]

pub mod utils;
