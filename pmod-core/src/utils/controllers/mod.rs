//! Device drivers and command dispatch.
//!
//! - `acl`: ADXL345 accelerometer over SPI or I2C.
//! - `adc`: 12-bit SPI ADC.
//! - `buttons`: debounced two-button input.
//! - `jstk`: SPI joystick with two LEDs.
//! - `lcd`: parallel character LCD.
//! - `leds`: discrete LED bank.
//! - `motor`: H-bridge DC motor.

pub mod acl;
pub mod adc;
pub mod buttons;
pub mod jstk;
pub mod lcd;
pub mod leds;
pub mod motor;

use core::cell::RefCell;
use embedded_hal_bus::i2c::RefCellDevice;
use serde::{Deserialize, Serialize};

pub use acl::ACL_CHANNEL;
pub use lcd::LCD_CHANNEL;
pub use leds::LED_CHANNEL;
pub use motor::MOTOR_CHANNEL;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "ct", rename_all = "snake_case")] // ct = command type
pub enum SystemCommand {
    A(acl::AclCommand),
    D(lcd::LcdCommand),
    M(motor::MotorCommand),
    L(leds::LEDCommand),
}

impl SystemCommand {
    /// Forward to the owning controller's channel. Returns `false` if that
    /// channel is full and the command was dropped.
    pub fn dispatch(self) -> bool {
        let sent = match self {
            SystemCommand::A(c) => ACL_CHANNEL.try_send(c).is_ok(),
            SystemCommand::D(c) => LCD_CHANNEL.try_send(c).is_ok(),
            SystemCommand::M(c) => MOTOR_CHANNEL.try_send(c).is_ok(),
            SystemCommand::L(c) => LED_CHANNEL.try_send(c).is_ok(),
        };
        if !sent {
            tracing::warn!("command channel full, command dropped");
        }
        sent
    }
}

type SharedAcl<I2C> = acl::Acl<acl::I2cInterface<RefCellDevice<'static, I2C>>>;

pub struct SystemController<I2C: 'static> {
    i2c: &'static RefCell<I2C>,
    pub accel: Option<SharedAcl<I2C>>,
}

impl<I2C> SystemController<I2C>
where
    I2C: embedded_hal::i2c::I2c + 'static,
{
    /// Bring up the accelerometer on the shared bus. If it does not answer
    /// with the ADXL345 id, the bus is scanned and the controller runs
    /// without it.
    pub fn new(i2c_bus: &'static RefCell<I2C>) -> Self {
        let mut dev = acl::Acl::new_i2c(RefCellDevice::new(i2c_bus));

        let accel = match dev.dev_id() {
            Ok(acl::DEVICE_ID) => match dev.set_sfr_bit(acl::bit::MEASURE, true) {
                Ok(()) => {
                    tracing::info!("ADXL345 measuring");
                    Some(dev)
                }
                Err(e) => {
                    tracing::warn!("ADXL345 init failed, scanning instead: {:?}", e);
                    None
                }
            },
            Ok(id) => {
                tracing::warn!("unexpected device id 0x{:02X}, scanning instead", id);
                None
            }
            Err(e) => {
                tracing::warn!("ADXL345 init failed, scanning instead: {:?}", e);
                None
            }
        };

        let ctrl = SystemController { i2c: i2c_bus, accel };
        if ctrl.accel.is_none() {
            ctrl.scan_bus();
        }
        ctrl
    }

    /// Probe every 7-bit address and log the ones that acknowledge.
    pub fn scan_bus(&self) {
        let mut bus = self.i2c.borrow_mut();
        for addr in 0x03..0x78 {
            if bus.write(addr, &[]).is_ok() {
                tracing::warn!("I2C device found at 0x{:02X}", addr);
            }
        }
    }

    /// Execute accelerometer commands from `ACL_CHANNEL` forever.
    pub async fn acl_ch(&mut self) -> ! {
        loop {
            let command = ACL_CHANNEL.receiver().receive().await;
            tracing::debug!("Received ACL Command: {:?}", command);
            if let Some(dev) = self.accel.as_mut() {
                match dev.execute_command(command) {
                    Ok(Some(acl::AclReading::Accel(x, y, z))) => {
                        tracing::info!(x, y, z, "acceleration (g)");
                    }
                    Ok(Some(acl::AclReading::DevId(id))) => {
                        tracing::info!("device id 0x{:02X}", id);
                    }
                    Ok(None) => tracing::info!("ACL command executed successfully"),
                    Err(e) => tracing::error!("ACL command failed: {:?}", e),
                }
            } else {
                tracing::warn!(
                    "ACL command received but device not initialized: {:?}",
                    command
                );
            }
        }
    }
}
