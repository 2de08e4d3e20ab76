//! Simulated board peripherals.

use std::convert::Infallible;

use embedded_hal::{
    digital::{ErrorType as PinErrorType, OutputPin},
    i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation},
    pwm::{ErrorType as PwmErrorType, SetDutyCycle},
};
use pmod_core::utils::controllers::{
    acl::{self, reg},
    lcd::{LcdPort, Register, NO_COLS},
};
use tracing::{debug, info};

/// ADXL345 register file on I2C. The board lies flat with a slow wobble on X.
pub struct SimAdxl345 {
    regs: [u8; 0x40],
    pointer: u8,
    samples: u32,
}

impl SimAdxl345 {
    pub fn new() -> Self {
        let mut regs = [0u8; 0x40];
        regs[reg::DEVID as usize] = acl::DEVICE_ID;
        regs[reg::BW_RATE as usize] = 0x0A;
        Self {
            regs,
            pointer: 0,
            samples: 0,
        }
    }

    fn offset_g(
        &self,
        register: u8,
    ) -> f32 {
        self.regs[register as usize] as i8 as f32 * 0.0156
    }

    /// Latch a new sample into the data registers.
    fn refresh_data(&mut self) {
        self.samples = self.samples.wrapping_add(1);
        let lsb = acl::g_range_lsb(self.regs[reg::DATA_FORMAT as usize]);
        let wobble = ((self.samples % 40) as f32 - 20.0) * 0.001;
        let g = [
            wobble + self.offset_g(reg::OFSX),
            self.offset_g(reg::OFSY),
            1.0 + self.offset_g(reg::OFSZ),
        ];
        for (i, value) in g.iter().enumerate() {
            let raw = (value / lsb) as i16;
            let at = reg::DATAX0 as usize + 2 * i;
            self.regs[at..at + 2].copy_from_slice(&raw.to_le_bytes());
        }
    }

    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) {
        if (reg::DATAX0..=reg::DATAZ1).contains(&self.pointer) {
            self.refresh_data();
        }
        for b in buf.iter_mut() {
            *b = self.regs[(self.pointer & 0x3F) as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn write_from(
        &mut self,
        bytes: &[u8],
    ) {
        let Some((&first, values)) = bytes.split_first() else {
            return;
        };
        self.pointer = first;
        for &v in values {
            let at = (self.pointer & 0x3F) as usize;
            if at != reg::DEVID as usize {
                self.regs[at] = v;
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

impl i2c::ErrorType for SimAdxl345 {
    type Error = ErrorKind;
}

impl I2c for SimAdxl345 {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != acl::I2C_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => self.write_from(bytes),
                Operation::Read(buf) => self.read_into(buf),
            }
        }
        Ok(())
    }
}

/// Character LCD controller model: DDRAM for two lines, CGRAM, never busy.
pub struct SimLcd {
    ddram: [[u8; NO_COLS as usize]; 2],
    cgram: [u8; 64],
    address: u8,
    in_cgram: bool,
}

impl SimLcd {
    pub fn new() -> Self {
        Self {
            ddram: [[b' '; NO_COLS as usize]; 2],
            cgram: [0; 64],
            address: 0,
            in_cgram: false,
        }
    }

    /// Text of one DDRAM line.
    pub fn line(
        &self,
        line: usize,
    ) -> &str {
        core::str::from_utf8(&self.ddram[line]).unwrap_or("?")
    }

    fn command(
        &mut self,
        value: u8,
    ) {
        if value & 0x80 != 0 {
            self.address = value & 0x7F;
            self.in_cgram = false;
        } else if value & 0x40 != 0 {
            self.address = value & 0x3F;
            self.in_cgram = true;
        } else if value == 0x01 {
            self.ddram = [[b' '; NO_COLS as usize]; 2];
            self.address = 0;
            self.in_cgram = false;
        } else if value & 0xFE == 0x02 {
            self.address = 0;
            self.in_cgram = false;
        } else {
            debug!("LCD command 0x{:02X}", value);
        }
    }

    fn data(
        &mut self,
        value: u8,
    ) {
        if self.in_cgram {
            self.cgram[(self.address & 0x3F) as usize] = value;
            self.address = (self.address + 1) & 0x3F;
            return;
        }
        let line = usize::from(self.address >= 0x40);
        let col = (self.address & 0x3F) as usize;
        if col < NO_COLS as usize {
            self.ddram[line][col] = value;
        }
        self.address = (self.address + 1) & 0x7F;
    }
}

impl LcdPort for SimLcd {
    type Error = Infallible;

    fn write_byte(
        &mut self,
        register: Register,
        value: u8,
    ) -> Result<(), Self::Error> {
        match register {
            Register::Command => self.command(value),
            Register::Data => self.data(value),
        }
        Ok(())
    }

    fn read_byte(
        &mut self,
        register: Register,
    ) -> Result<u8, Self::Error> {
        Ok(match register {
            Register::Command => self.address & 0x7F,
            Register::Data if self.in_cgram => self.cgram[(self.address & 0x3F) as usize],
            Register::Data => {
                let line = usize::from(self.address >= 0x40);
                let col = (self.address & 0x3F) as usize;
                self.ddram[line].get(col).copied().unwrap_or(b' ')
            }
        })
    }

    fn set_backlight(
        &mut self,
        on: bool,
    ) -> Result<(), Self::Error> {
        info!(on, "LCD backlight");
        Ok(())
    }
}

/// Output pin that logs its level.
pub struct LogPin(pub &'static str);

impl PinErrorType for LogPin {
    type Error = Infallible;
}

impl OutputPin for LogPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        debug!(pin = self.0, "low");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        debug!(pin = self.0, "high");
        Ok(())
    }
}

/// PWM channel that logs the compare value.
pub struct LogPwm {
    pub name: &'static str,
    pub period: u16,
}

impl PwmErrorType for LogPwm {
    type Error = Infallible;
}

impl SetDutyCycle for LogPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.period
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        debug!(pwm = self.name, duty, "compare");
        Ok(())
    }
}
