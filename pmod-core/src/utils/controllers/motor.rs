//! H-bridge DC motor (Pmod HB5): a direction pin and PWM on the enable pin.
//!
//! The bridge must never switch direction while driven, so a direction change
//! forces enable low, waits, flips the direction pin, waits again and only then
//! restores the duty cycle. Commands are received via `MOTOR_CHANNEL`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::{delay::DelayNs, digital::OutputPin, pwm::SetDutyCycle};
use serde::{Deserialize, Serialize};

use super::buttons::ButtonEvent;

/// Channel used to receive motor commands (`MotorCommand` messages).
pub static MOTOR_CHANNEL: embassy_sync::channel::Channel<
    CriticalSectionRawMutex,
    MotorCommand,
    16,
> = embassy_sync::channel::Channel::new();

/// Duty change per button press in the motor demo.
pub const DUTY_STEP: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct MotorConfig {
    /// Enable is held low this long on each side of a direction change.
    pub force_low_us: u32,
    /// Duty applied by [`HBridge::new`], 0..=1.
    pub initial_duty: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            force_low_us: 1000,
            initial_duty: 0.0,
        }
    }
}

#[derive(Debug)]
pub enum MotorError<PE: core::fmt::Debug, WE: core::fmt::Debug> {
    DirError(PE),
    PwmError(WE),
}

/// Motor commands.
///
/// Serialized as JSON with tag `"mc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "mc", rename_all = "snake_case")]
pub enum MotorCommand {
    /// Signed duty in -1..=1, negative runs in reverse.
    Duty { d: f32 },
    /// One step faster forward.
    Up,
    /// One step faster in reverse.
    Down,
    /// Keep the magnitude, flip the direction.
    Reverse,
    Stop,
}

pub struct HBridge<DIR, EN, D> {
    dir: DIR,
    en: EN,
    delay: D,
    config: MotorConfig,
    reverse: bool,
    duty: f32,
}

impl<DIR, EN, D> HBridge<DIR, EN, D>
where
    DIR: OutputPin,
    EN: SetDutyCycle,
    D: DelayNs,
{
    /// Drive forward at the configured initial duty.
    pub fn new(
        dir: DIR,
        en: EN,
        delay: D,
        config: Option<MotorConfig>,
    ) -> Result<Self, MotorError<DIR::Error, EN::Error>> {
        let config = config.unwrap_or_default();
        let mut bridge = Self {
            dir,
            en,
            delay,
            config,
            reverse: false,
            duty: 0.0,
        };
        bridge.dir.set_low().map_err(MotorError::DirError)?;
        bridge.set_duty(config.initial_duty)?;
        Ok(bridge)
    }

    pub fn release(self) -> (DIR, EN, D) {
        (self.dir, self.en, self.delay)
    }

    /// Current duty magnitude, 0..=1.
    pub fn duty(&self) -> f32 {
        self.duty
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    fn set_duty(
        &mut self,
        duty: f32,
    ) -> Result<(), MotorError<DIR::Error, EN::Error>> {
        let duty = duty.clamp(0.0, 1.0);
        let counts = (self.en.max_duty_cycle() as f32 * duty) as u16;
        self.en
            .set_duty_cycle(counts)
            .map_err(MotorError::PwmError)?;
        self.duty = duty;
        Ok(())
    }

    /// Run at `duty` (0..=1, clamped) in the given direction.
    pub fn command(
        &mut self,
        duty: f32,
        reverse: bool,
    ) -> Result<(), MotorError<DIR::Error, EN::Error>> {
        if reverse != self.reverse {
            self.en
                .set_duty_cycle_fully_off()
                .map_err(MotorError::PwmError)?;
            self.delay.delay_us(self.config.force_low_us);
            self.dir
                .set_state(reverse.into())
                .map_err(MotorError::DirError)?;
            self.delay.delay_us(self.config.force_low_us);
            self.reverse = reverse;
            tracing::debug!(reverse, "motor direction changed");
        }
        self.set_duty(duty)
    }

    /// Run at a signed duty; negative values run in reverse.
    pub fn command_signed(
        &mut self,
        duty: f32,
    ) -> Result<(), MotorError<DIR::Error, EN::Error>> {
        self.command(libm::fabsf(duty), duty < 0.0)
    }
}

impl From<ButtonEvent> for MotorCommand {
    fn from(event: ButtonEvent) -> Self {
        match event {
            ButtonEvent::Btn1 => MotorCommand::Down,
            ButtonEvent::Btn2 => MotorCommand::Up,
            ButtonEvent::Both => MotorCommand::Reverse,
        }
    }
}

/// LED mask of the motor demo: LED 0 at full reverse, LED 3 at full forward,
/// plus the action-LED bits in `flash`.
pub fn status_leds(
    duty: f32,
    flash: u8,
) -> u8 {
    let mut mask = flash & 0b0110;
    if duty <= -1.0 {
        mask |= 0b0001;
    }
    if duty >= 1.0 {
        mask |= 0b1000;
    }
    mask
}

/// Signed duty setpoint of the motor demo, stepped by buttons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyController {
    duty: f32,
    step: f32,
}

impl DutyController {
    pub fn new(
        duty: f32,
        step: Option<f32>,
    ) -> Self {
        Self {
            duty: duty.clamp(-1.0, 1.0),
            step: step.unwrap_or(DUTY_STEP),
        }
    }

    pub fn duty(&self) -> f32 {
        self.duty
    }

    pub fn set(
        &mut self,
        duty: f32,
    ) -> f32 {
        self.duty = duty.clamp(-1.0, 1.0);
        self.duty
    }

    pub fn increase(&mut self) -> f32 {
        self.set(self.duty + self.step)
    }

    pub fn decrease(&mut self) -> f32 {
        self.set(self.duty - self.step)
    }

    pub fn reverse(&mut self) -> f32 {
        self.set(-self.duty)
    }

    pub fn at_max(&self) -> bool {
        self.duty >= 1.0
    }

    pub fn at_min(&self) -> bool {
        self.duty <= -1.0
    }

    /// Apply a command and return the new signed duty.
    pub fn apply(
        &mut self,
        command: MotorCommand,
    ) -> f32 {
        match command {
            MotorCommand::Duty { d } => self.set(d),
            MotorCommand::Up => self.increase(),
            MotorCommand::Down => self.decrease(),
            MotorCommand::Reverse => self.reverse(),
            MotorCommand::Stop => self.set(0.0),
        }
    }
}

/// Couples a [`DutyController`] with the bridge it drives.
pub struct MotorController<DIR, EN, D> {
    bridge: HBridge<DIR, EN, D>,
    setpoint: DutyController,
}

impl<DIR, EN, D> MotorController<DIR, EN, D>
where
    DIR: OutputPin,
    EN: SetDutyCycle,
    D: DelayNs,
{
    /// Take over `bridge` and drive it at `duty` right away.
    pub fn new(
        bridge: HBridge<DIR, EN, D>,
        duty: f32,
    ) -> Result<Self, MotorError<DIR::Error, EN::Error>> {
        let mut ctrl = Self {
            bridge,
            setpoint: DutyController::new(duty, None),
        };
        let d = ctrl.setpoint.duty();
        ctrl.bridge.command_signed(d)?;
        Ok(ctrl)
    }

    /// Signed duty currently applied.
    pub fn duty(&self) -> f32 {
        self.setpoint.duty()
    }

    pub fn setpoint(&self) -> &DutyController {
        &self.setpoint
    }

    pub fn bridge(&self) -> &HBridge<DIR, EN, D> {
        &self.bridge
    }

    /// Execute an incoming `MotorCommand` and return the applied signed duty.
    pub fn ex_command(
        &mut self,
        command: MotorCommand,
    ) -> Result<f32, MotorError<DIR::Error, EN::Error>> {
        let duty = self.setpoint.apply(command);
        self.bridge.command_signed(duty)?;
        Ok(duty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_steps_clamp_at_full_scale() {
        let mut ctrl = DutyController::new(0.995, None);
        assert_eq!(ctrl.increase(), 1.0);
        assert!(ctrl.at_max());
        ctrl.set(-0.995);
        assert_eq!(ctrl.decrease(), -1.0);
        assert!(ctrl.at_min());
        assert_eq!(ctrl.reverse(), 1.0);
    }

    #[test]
    fn limits_light_the_outer_leds() {
        assert_eq!(status_leds(1.0, 0), 0b1000);
        assert_eq!(status_leds(-1.0, 0b0010), 0b0011);
        assert_eq!(status_leds(0.3, 0b1111), 0b0110);
        assert_eq!(MotorCommand::from(ButtonEvent::Both), MotorCommand::Reverse);
    }

    #[test]
    fn commands_map_to_setpoints() {
        let mut ctrl = DutyController::new(0.5, Some(0.25));
        assert_eq!(ctrl.apply(MotorCommand::Up), 0.75);
        assert_eq!(ctrl.apply(MotorCommand::Reverse), -0.75);
        assert_eq!(ctrl.apply(MotorCommand::Down), -1.0);
        assert_eq!(ctrl.apply(MotorCommand::Duty { d: 3.0 }), 1.0);
        assert_eq!(ctrl.apply(MotorCommand::Stop), 0.0);
    }
}
