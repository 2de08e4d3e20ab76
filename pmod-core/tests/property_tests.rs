//! Property tests for the pure computations and argument validation.

use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use pmod_core::utils::controllers::{
    acl::{g_range_lsb, par, Acl, AclArgErrors, AclError},
    buttons::{ButtonPair, DebounceConfig},
    lcd::{ddram_address, LcdArgErrors, NO_COLS, NO_ROWS},
    motor::{DutyController, MotorCommand},
};
use pmod_core::utils::math::{
    reaction::{counter_delta, ReactionConfig, ReactionContext},
    steering::{feedback_correction, FEEDBACK_DUTY_MAX, FEEDBACK_DUTY_MIN},
};
use proptest::prelude::*;

// ── rotation counter ─────────────────────────────────────────

proptest! {
    /// The distance between two counter values does not depend on the order
    /// they are given in, across the u32 wrap.
    #[test]
    fn counter_delta_is_symmetric(a in any::<u32>(), b in any::<u32>()) {
        prop_assert_eq!(counter_delta(a, b), counter_delta(b, a));
    }

    #[test]
    fn counter_delta_counts_forward_edges(saved in any::<u32>(), n in 0u32..=0x8000_0000) {
        prop_assert_eq!(counter_delta(saved.wrapping_add(n), saved), n);
    }

    /// Speed is signed by the duty, and its magnitude does not depend on it.
    #[test]
    fn speed_sign_follows_duty(edges in 1u32..10_000, ticks in 1u32..100_000, duty in -1.0f32..1.0) {
        let ctx = ReactionContext::new(ReactionConfig::DEFAULT);
        for _ in 0..edges {
            ctx.on_edge(true, false);
        }
        let snap = ctx.compute_speed(ticks, duty);
        if duty < 0.0 {
            prop_assert!(snap.computed_speed_rpm < 0.0);
        } else {
            prop_assert!(snap.computed_speed_rpm > 0.0);
        }
        prop_assert_eq!(snap.saved_rotation_counter, edges);
        prop_assert_eq!(snap.saved_real_time, ticks);
    }
}

// ── accelerometer scale ──────────────────────────────────────

proptest! {
    #[test]
    fn scale_doubles_with_range(range in par::G_RANGE_PM2G..par::G_RANGE_PM16G) {
        prop_assert_eq!(g_range_lsb(range + 1), 2.0 * g_range_lsb(range));
    }
}

proptest! {
    /// Axes other than X, Y and Z are refused before any bus traffic.
    #[test]
    fn unknown_axis_never_reaches_bus(axis in 3u8..=255, offset in -2.0f32..2.0) {
        let expectations: [I2cTrans; 0] = [];
        let mut i2c = I2cMock::new(&expectations);
        let mut dev = Acl::new_i2c(i2c.clone());
        let read = dev.read_accel_g_one_axis(axis);
        prop_assert!(
            matches!(read, Err(AclError::InvalidArgument(f)) if f == AclArgErrors::INVALID_AXIS)
        );
        let offset_read = dev.offset_g(axis);
        prop_assert!(
            matches!(offset_read, Err(AclError::InvalidArgument(f)) if f == AclArgErrors::INVALID_AXIS)
        );
        let write = dev.set_offset_g(axis, offset);
        prop_assert!(
            matches!(write, Err(AclError::InvalidArgument(f)) if f == AclArgErrors::INVALID_AXIS)
        );
        i2c.done();
    }
}

// ── LCD positions ────────────────────────────────────────────

proptest! {
    #[test]
    fn position_flags_match_bounds(line in any::<u8>(), col in any::<u8>()) {
        match ddram_address(line, col) {
            Ok(address) => {
                prop_assert!(line < NO_ROWS && col < NO_COLS);
                prop_assert_eq!(address & 0x3F, col);
            }
            Err(flags) => {
                prop_assert_eq!(flags.contains(LcdArgErrors::ROW_RANGE), line >= NO_ROWS);
                prop_assert_eq!(flags.contains(LcdArgErrors::COL_RANGE), col >= NO_COLS);
            }
        }
    }
}

// ── motor demo ───────────────────────────────────────────────

fn motor_command() -> impl Strategy<Value = MotorCommand> {
    prop_oneof![
        (-2.0f32..2.0).prop_map(|d| MotorCommand::Duty { d }),
        Just(MotorCommand::Up),
        Just(MotorCommand::Down),
        Just(MotorCommand::Reverse),
        Just(MotorCommand::Stop),
    ]
}

proptest! {
    #[test]
    fn duty_stays_in_range(commands in proptest::collection::vec(motor_command(), 0..200)) {
        let mut ctrl = DutyController::new(0.5, None);
        for c in commands {
            let d = ctrl.apply(c);
            prop_assert!((-1.0..=1.0).contains(&d));
        }
    }

    #[test]
    fn feedback_duty_stays_in_window(
        duty in FEEDBACK_DUTY_MIN..=FEEDBACK_DUTY_MAX,
        measured in 0u16..20_000,
        target in 0u16..20_000,
    ) {
        if let Some(next) = feedback_correction(duty, measured, target) {
            prop_assert!((FEEDBACK_DUTY_MIN..=FEEDBACK_DUTY_MAX).contains(&next));
        }
    }
}

// ── buttons ──────────────────────────────────────────────────

proptest! {
    /// Runs shorter than the debounce count never change the accepted state.
    #[test]
    fn short_glitches_are_ignored(runs in proptest::collection::vec(1usize..=10, 1..50)) {
        let mut pair = ButtonPair::new(DebounceConfig::DEFAULT);
        let mut level = true;
        for run in runs {
            for _ in 0..run {
                pair.sample(level, false);
            }
            level = !level;
        }
        prop_assert_eq!(pair.states(), (false, false));
        prop_assert_eq!(pair.take_event(), None);
    }
}
