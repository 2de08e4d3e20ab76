//! Drive decisions for the robot demos: line following on four reflectance
//! sensors, joystick-to-motor mapping, and the period feedback that trims a
//! motor's duty cycle toward a target encoder period.
//!
//! Duty values are output-compare counts against a PWM period of
//! [`PWM_PERIOD`] counts.

/// PWM period register value of the drive motors.
pub const PWM_PERIOD: u16 = 9999;

pub const DUTY_STOPPED: u16 = 0;
pub const DUTY_SLOW: u16 = 8000;
pub const DUTY_MEDIUM: u16 = 4000;
pub const DUTY_FAST: u16 = 2500;

/// Target encoder periods (us) matching the duty presets.
pub const PERIOD_SLOW_US: u16 = 8000;
pub const PERIOD_MEDIUM_US: u16 = 4000;
pub const PERIOD_FAST_US: u16 = 2500;

/// Duties the feedback loop may settle on.
pub const FEEDBACK_DUTY_MIN: u16 = 50;
pub const FEEDBACK_DUTY_MAX: u16 = 1950;
/// Duty bump applied when a motor stops reporting.
pub const FEEDBACK_TIMEOUT_STEP: u16 = 20;

/// Period error thresholds (us) and the duty step each one earns.
const PERIOD_ERROR_US: [u16; 7] = [1, 10, 50, 100, 500, 1000, 2000];
const DUTY_STEP: [u16; 7] = [0, 1, 5, 10, 20, 30, 40];

/// Joystick thresholds on the 10-bit axes.
pub const POS_MIN: u16 = 300;
pub const POS_MAX: u16 = 700;

/// Direction pin levels for a forward-driving robot.
pub const DIR_LEFT_FWD: bool = true;
pub const DIR_RIGHT_FWD: bool = false;

/// Left/right duty pair.
pub type DutyPair = (u16, u16);

/// Motor duties for a line-sensor reading; `true` means the sensor sees the
/// line. Sensors are ordered far left, near left, near right, far right.
///
/// `None` when no sensor sees the line: keep the current duties.
pub fn line_follow(sensors: [bool; 4]) -> Option<DutyPair> {
    let [far_left, near_left, near_right, far_right] = sensors;
    if (far_left && far_right) || (near_left && near_right) {
        Some((DUTY_MEDIUM, DUTY_MEDIUM))
    } else if far_left {
        Some((DUTY_MEDIUM, DUTY_STOPPED))
    } else if far_right {
        Some((DUTY_STOPPED, DUTY_MEDIUM))
    } else if near_left {
        Some((DUTY_MEDIUM, DUTY_SLOW))
    } else if near_right {
        Some((DUTY_SLOW, DUTY_MEDIUM))
    } else {
        None
    }
}

/// Two-button line follower: button 1 stops and ignores the sensors,
/// button 2 starts at medium speed and follows them.
#[derive(Debug, Default)]
pub struct LineFollower {
    sensing: bool,
}

impl LineFollower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sensing(&self) -> bool {
        self.sensing
    }

    /// Debounced button states; both or neither pressed changes nothing.
    pub fn on_buttons(
        &mut self,
        btn1: bool,
        btn2: bool,
    ) -> Option<DutyPair> {
        match (btn1, btn2) {
            (true, false) => {
                self.sensing = false;
                Some((DUTY_STOPPED, DUTY_STOPPED))
            }
            (false, true) => {
                self.sensing = true;
                Some((DUTY_MEDIUM, DUTY_MEDIUM))
            }
            _ => None,
        }
    }

    pub fn on_sensors(
        &self,
        sensors: [bool; 4],
    ) -> Option<DutyPair> {
        if self.sensing {
            line_follow(sensors)
        } else {
            None
        }
    }
}

/// Motion selected from the joystick position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Forward,
    ForwardLeft,
    ForwardRight,
    Backward,
    BackwardLeft,
    BackwardRight,
    Left,
    Right,
    Stop,
}

/// Setpoints for both motors. `None` directions keep the current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveCommand {
    pub mode: DriveMode,
    pub left_dir: Option<bool>,
    pub right_dir: Option<bool>,
    pub left_duty: u16,
    pub right_duty: u16,
    pub left_period_us: u16,
    pub right_period_us: u16,
}

pub fn drive_mode(
    x: u16,
    y: u16,
) -> DriveMode {
    let fwd = x > POS_MAX;
    let bwd = x < POS_MIN;
    if y > POS_MAX {
        if fwd {
            DriveMode::ForwardLeft
        } else if bwd {
            DriveMode::BackwardLeft
        } else {
            DriveMode::Left
        }
    } else if y < POS_MIN {
        if fwd {
            DriveMode::ForwardRight
        } else if bwd {
            DriveMode::BackwardRight
        } else {
            DriveMode::Right
        }
    } else if fwd {
        DriveMode::Forward
    } else if bwd {
        DriveMode::Backward
    } else {
        DriveMode::Stop
    }
}

/// Motor setpoints for a joystick position.
pub fn joystick_drive(
    x: u16,
    y: u16,
) -> DriveCommand {
    let mode = drive_mode(x, y);
    let fwd = Some((DIR_LEFT_FWD, DIR_RIGHT_FWD));
    let bwd = Some((!DIR_LEFT_FWD, !DIR_RIGHT_FWD));
    let (dirs, (left_duty, right_duty), (left_period_us, right_period_us)) = match mode {
        DriveMode::Forward => (fwd, (DUTY_FAST, DUTY_FAST), (PERIOD_FAST_US, PERIOD_FAST_US)),
        DriveMode::ForwardLeft => (
            fwd,
            (DUTY_MEDIUM, DUTY_FAST),
            (PERIOD_MEDIUM_US, PERIOD_FAST_US),
        ),
        DriveMode::ForwardRight => (
            fwd,
            (DUTY_FAST, DUTY_MEDIUM),
            (PERIOD_FAST_US, PERIOD_MEDIUM_US),
        ),
        DriveMode::Backward => (bwd, (DUTY_FAST, DUTY_FAST), (PERIOD_FAST_US, PERIOD_FAST_US)),
        DriveMode::BackwardLeft => (
            bwd,
            (DUTY_MEDIUM, DUTY_FAST),
            (PERIOD_MEDIUM_US, PERIOD_FAST_US),
        ),
        DriveMode::BackwardRight => (
            bwd,
            (DUTY_FAST, DUTY_MEDIUM),
            (PERIOD_FAST_US, PERIOD_MEDIUM_US),
        ),
        DriveMode::Left => (
            Some((!DIR_LEFT_FWD, DIR_RIGHT_FWD)),
            (DUTY_SLOW, DUTY_SLOW),
            (PERIOD_SLOW_US, PERIOD_SLOW_US),
        ),
        DriveMode::Right => (
            Some((DIR_LEFT_FWD, !DIR_RIGHT_FWD)),
            (DUTY_SLOW, DUTY_SLOW),
            (PERIOD_SLOW_US, PERIOD_SLOW_US),
        ),
        DriveMode::Stop => (None, (DUTY_STOPPED, DUTY_STOPPED), (0, 0)),
    };
    DriveCommand {
        mode,
        left_dir: dirs.map(|d| d.0),
        right_dir: dirs.map(|d| d.1),
        left_duty,
        right_duty,
        left_period_us,
        right_period_us,
    }
}

/// Trim `duty` from one measured encoder period.
///
/// A period shorter than `target_us` means the motor runs too fast and the
/// duty drops; a longer one raises it. The step grows with the error. `None`
/// when the result falls outside the feedback duty window.
pub fn feedback_correction(
    duty: u16,
    measured_us: u16,
    target_us: u16,
) -> Option<u16> {
    let error = measured_us.abs_diff(target_us);
    let idx = PERIOD_ERROR_US
        .iter()
        .rposition(|&threshold| threshold <= error)
        .unwrap_or(0);
    let step = i32::from(DUTY_STEP[idx]);
    let next = match measured_us.cmp(&target_us) {
        core::cmp::Ordering::Less => i32::from(duty) - step,
        core::cmp::Ordering::Greater => i32::from(duty) + step,
        core::cmp::Ordering::Equal => i32::from(duty),
    };
    let window = i32::from(FEEDBACK_DUTY_MIN)..=i32::from(FEEDBACK_DUTY_MAX);
    window.contains(&next).then_some(next as u16)
}

/// Duty after a feedback timeout: bumped, capped at the window top.
pub fn feedback_timeout(duty: u16) -> u16 {
    duty.saturating_add(FEEDBACK_TIMEOUT_STEP)
        .min(FEEDBACK_DUTY_MAX)
}
