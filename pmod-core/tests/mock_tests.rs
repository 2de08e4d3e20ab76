use core::cell::RefCell;
use std::rc::Rc;

use embedded_hal::{delay::DelayNs, pwm::SetDutyCycle};
use embedded_hal_bus::i2c::RefCellDevice;
use embedded_hal_mock::eh1::{
    digital::{Mock as PinMock, State, Transaction as PinTrans},
    i2c::{Mock as I2cMock, Transaction as I2cTrans},
    spi::{Mock as SpiMock, Transaction as SpiTrans},
};
use pmod_core::utils::controllers::{
    acl::{self, bit, par, reg, Acl, AclArgErrors, AclError, AclInterface, I2cInterface},
    adc::Adc,
    jstk::{self, Joystick},
    motor::{HBridge, MotorCommand, MotorConfig, MotorController},
};

/// I2C address of the accelerometer.
pub const ACL_ADDRESS: u8 = 0x1D;

/// Create a write transaction for the accelerometer.
pub fn write(data: Vec<u8>) -> I2cTrans {
    I2cTrans::write(ACL_ADDRESS, data)
}
/// Create a register read transaction for the accelerometer.
pub fn write_read(
    register: u8,
    read: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write_read(ACL_ADDRESS, vec![register], read)
}

/// Expectations for one SPI transaction made of a command byte and a payload.
fn spi_frame(
    first: u8,
    payload: SpiTrans<u8>,
) -> Vec<SpiTrans<u8>> {
    vec![
        SpiTrans::transaction_start(),
        SpiTrans::write_vec(vec![first]),
        payload,
        SpiTrans::transaction_end(),
    ]
}

#[test]
fn test_spi_read_accel_burst() {
    // X = 256, Y = -256, Z = 0 at ±2 g
    let expectations = spi_frame(
        0xF2,
        SpiTrans::read_vec(vec![0x00, 0x01, 0x00, 0xFF, 0x00, 0x00]),
    );
    let mut spi = SpiMock::new(&expectations);
    let mut dev = Acl::new_spi(spi.clone());
    let (x, y, z) = dev.read_accel_g().unwrap();
    assert_eq!((x, y, z), (1.0, -1.0, 0.0));
    spi.done();
}

#[test]
fn test_spi_set_measure_bit() {
    let mut expectations = spi_frame(0x80 | reg::POWER_CTL, SpiTrans::read_vec(vec![0x20]));
    expectations.extend(spi_frame(reg::POWER_CTL, SpiTrans::write_vec(vec![0x28])));
    let mut spi = SpiMock::new(&expectations);
    let mut dev = Acl::new_spi(spi.clone());
    dev.set_sfr_bit(bit::MEASURE, true).unwrap();
    spi.done();
}

#[test]
fn test_i2c_dev_id() {
    let expectations = [write_read(reg::DEVID, vec![0xE5])];
    let mut i2c = I2cMock::new(&expectations);
    let mut dev = Acl::new_i2c(i2c.clone());
    assert_eq!(dev.dev_id().unwrap(), acl::DEVICE_ID);
    i2c.done();
}

#[test]
fn test_pm4g_scale_applies_to_reads() {
    let expectations = [
        write_read(reg::DATA_FORMAT, vec![0x08]),
        write(vec![reg::DATA_FORMAT, 0x09]),
        write_read(reg::DATAX0, vec![0x80, 0x00]),
        write_read(reg::DATAZ0, vec![0x00, 0x01]),
    ];
    let mut i2c = I2cMock::new(&expectations);
    let mut dev = Acl::new_i2c(i2c.clone());
    dev.set_data_format_g_range_par(par::G_RANGE_PM4G).unwrap();
    assert_eq!(dev.read_accel_g_one_axis(par::AXIS_X).unwrap(), 1.0);
    assert_eq!(dev.read_accel_g_one_axis(par::AXIS_Z).unwrap(), 2.0);
    i2c.done();
}

#[test]
fn test_invalid_axis_skips_bus() {
    let expectations: [I2cTrans; 0] = [];
    let mut i2c = I2cMock::new(&expectations);
    let mut dev = Acl::new_i2c(i2c.clone());
    match dev.read_accel_g_one_axis(3) {
        Err(AclError::InvalidArgument(flags)) => assert_eq!(flags, AclArgErrors::INVALID_AXIS),
        other => panic!("unexpected result: {:?}", other),
    }
    match dev.set_offset_g(3, 0.5) {
        Err(AclError::InvalidArgument(flags)) => assert_eq!(flags, AclArgErrors::INVALID_AXIS),
        other => panic!("unexpected result: {:?}", other),
    }
    i2c.done();
}

#[test]
fn test_offset_reports_all_violations() {
    let expectations: [I2cTrans; 0] = [];
    let mut i2c = I2cMock::new(&expectations);
    let mut dev = Acl::new_i2c(i2c.clone());
    match dev.set_offset_g(7, 3.0) {
        Err(AclError::InvalidArgument(flags)) => {
            assert!(flags.contains(AclArgErrors::INVALID_AXIS));
            assert!(flags.contains(AclArgErrors::RANGE_PM2G));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    i2c.done();
}

#[test]
fn test_output_rate_round_trip() {
    // LOW_POWER stays set across every rate code
    let mut expectations = Vec::new();
    for rate in 0u8..=15 {
        expectations.extend([
            write_read(reg::BW_RATE, vec![0x1A]),
            write(vec![reg::BW_RATE, 0x10 | rate]),
            write_read(reg::BW_RATE, vec![0x10 | rate]),
        ]);
    }
    let mut i2c = I2cMock::new(&expectations);
    let mut dev = Acl::new_i2c(i2c.clone());
    for rate in 0u8..=15 {
        dev.set_bw_rate_output_rate_par(rate).unwrap();
        assert_eq!(dev.bw_rate_output_rate_par().unwrap(), rate);
    }
    match dev.set_bw_rate_output_rate_par(16) {
        Err(AclError::InvalidArgument(flags)) => assert_eq!(flags, AclArgErrors::RANGE_0_15),
        other => panic!("unexpected result: {:?}", other),
    }
    i2c.done();
}

#[test]
fn test_i2c_long_burst_is_split() {
    let expectations = [
        write(vec![reg::OFSX, 1, 2, 3, 4, 5, 6]),
        write(vec![reg::OFSX + 6, 7]),
    ];
    let mut i2c = I2cMock::new(&expectations);
    let mut bus = I2cInterface::new(i2c.clone());
    bus.write_registers(reg::OFSX, &[1, 2, 3, 4, 5, 6, 7]).unwrap();
    i2c.done();
}

#[test]
fn test_threshold_and_time_report_all_violations() {
    let expectations: [I2cTrans; 0] = [];
    let mut i2c = I2cMock::new(&expectations);
    let mut dev = Acl::new_i2c(i2c.clone());
    match dev.set_threshold_g(9, 20.0) {
        Err(AclError::InvalidArgument(flags)) => {
            assert_eq!(flags, AclArgErrors::INVALID_THRESH | AclArgErrors::RANGE_0_16G)
        }
        other => panic!("unexpected result: {:?}", other),
    }
    match dev.set_threshold_g(9, 1.0) {
        Err(AclError::InvalidArgument(flags)) => assert_eq!(flags, AclArgErrors::INVALID_THRESH),
        other => panic!("unexpected result: {:?}", other),
    }
    match dev.set_time_s(9, 2.0) {
        Err(AclError::InvalidArgument(flags)) => {
            assert_eq!(flags, AclArgErrors::INVALID_TIME | AclArgErrors::RANGE_0_1280MS)
        }
        other => panic!("unexpected result: {:?}", other),
    }
    match dev.set_time_s(9, 0.1) {
        Err(AclError::InvalidArgument(flags)) => assert_eq!(flags, AclArgErrors::INVALID_TIME),
        other => panic!("unexpected result: {:?}", other),
    }
    match dev.set_time_s(par::TIME_DUR, 0.2) {
        Err(AclError::InvalidArgument(flags)) => assert_eq!(flags, AclArgErrors::RANGE_0_160MS),
        other => panic!("unexpected result: {:?}", other),
    }
    i2c.done();
}

#[test]
fn test_calibrate_z_up() {
    let mut expectations = vec![
        write_read(reg::POWER_CTL, vec![0x08]),
        write(vec![reg::POWER_CTL, 0x00]),
        write(vec![reg::OFSX, 0x00]),
        write(vec![reg::OFSY, 0x00]),
        write(vec![reg::OFSZ, 0x00]),
        write_read(reg::POWER_CTL, vec![0x00]),
        write(vec![reg::POWER_CTL, 0x08]),
    ];
    // X = 16 (0.0625 g), Y = 0, Z = 240 (0.9375 g) at ±2 g
    for _ in 0..256 {
        expectations.push(write_read(
            reg::DATAX0,
            vec![0x10, 0x00, 0x00, 0x00, 0xF0, 0x00],
        ));
    }
    expectations.extend([
        write_read(reg::POWER_CTL, vec![0x08]),
        write(vec![reg::POWER_CTL, 0x00]),
        write(vec![reg::OFSX, 0xFC]),
        write(vec![reg::OFSY, 0x00]),
        write(vec![reg::OFSZ, 0x04]),
        write_read(reg::POWER_CTL, vec![0x00]),
        write(vec![reg::POWER_CTL, 0x08]),
    ]);
    let mut i2c = I2cMock::new(&expectations);
    let mut dev = Acl::new_i2c(i2c.clone());
    dev.calibrate_one_axis_gravitational(par::AXIS_ZP).unwrap();
    i2c.done();
}

#[test]
fn test_shared_bus_device() {
    let expectations = [write_read(reg::DEVID, vec![0xE5])];
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    {
        let mut dev = Acl::new_i2c(RefCellDevice::new(&i2c_bus));
        assert_eq!(dev.dev_id().unwrap(), 0xE5);
    }
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_adc_masks_to_12_bits() {
    let expectations = [
        SpiTrans::transaction_start(),
        SpiTrans::read_vec(vec![0xFA, 0xBC]),
        SpiTrans::transaction_end(),
        SpiTrans::transaction_start(),
        SpiTrans::read_vec(vec![0x0F, 0xFF]),
        SpiTrans::transaction_end(),
    ];
    let mut spi = SpiMock::new(&expectations);
    let mut adc = Adc::new(spi.clone(), None);
    assert_eq!(adc.integer_value().unwrap(), 0x0ABC);
    assert!((adc.physical_value().unwrap() - 3.3).abs() < 1e-5);
    spi.done();
}

fn joystick_exchange(
    sent: [u8; 5],
    received: [u8; 5],
) -> Vec<SpiTrans<u8>> {
    let mut t = vec![SpiTrans::transaction_start()];
    for (s, r) in sent.into_iter().zip(received) {
        t.push(SpiTrans::delay(1_000_000));
        t.push(SpiTrans::transfer_in_place(vec![s], vec![r]));
    }
    t.push(SpiTrans::transaction_end());
    t
}

#[test]
fn test_joystick_read_and_leds() {
    let mut expectations = joystick_exchange([0x01, 0, 0, 0, 0], [0xFF, 0x01, 0x2C, 0x01, 0x02]);
    expectations.extend(joystick_exchange(
        [0x83, 0, 0, 0, 0],
        [0x00, 0x02, 0x00, 0x00, 0x00],
    ));
    let mut spi = SpiMock::new(&expectations);
    let mut js = Joystick::new(spi.clone());

    let data = js.read_all(jstk::LED1 | 0x10).unwrap();
    assert_eq!((data.x, data.y), (511, 300));
    assert!(data.pressed(jstk::BTN1));
    assert!(!data.pressed(jstk::BTN_JOY));

    js.set_leds(jstk::LED1 | jstk::LED2).unwrap();
    assert_eq!(js.last().x, 512);
    assert_eq!(js.last().buttons, 0);
    assert_eq!(js.led_state(), jstk::LED1 | jstk::LED2);
    spi.done();
}

#[test]
fn test_joystick_getters_sample_each_call() {
    let mut expectations = joystick_exchange([0x82, 0, 0, 0, 0], [0; 5]);
    expectations.extend(joystick_exchange(
        [0x02, 0, 0, 0, 0],
        [0x10, 0x00, 0x20, 0x00, 0x00],
    ));
    expectations.extend(joystick_exchange(
        [0x02, 0, 0, 0, 0],
        [0x11, 0x00, 0x21, 0x00, 0x00],
    ));
    expectations.extend(joystick_exchange(
        [0x02, 0, 0, 0, 0],
        [0x12, 0x00, 0x22, 0x00, 0x06],
    ));
    let mut spi = SpiMock::new(&expectations);
    let mut js = Joystick::new(spi.clone());

    js.set_leds(jstk::LED2).unwrap();
    assert_eq!(js.x().unwrap(), 0x10);
    assert_eq!(js.y().unwrap(), 0x21);
    assert_eq!(js.buttons().unwrap(), jstk::BTN1 | jstk::BTN2);
    assert_eq!(js.last().x, 0x12);
    spi.done();
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Duty(u16),
    DelayNs(u32),
}

#[derive(Clone, Default)]
struct Log(Rc<RefCell<Vec<Event>>>);

impl Log {
    fn take(&self) -> Vec<Event> {
        self.0.borrow_mut().drain(..).collect()
    }
}

struct FakePwm(Log);

impl embedded_hal::pwm::ErrorType for FakePwm {
    type Error = core::convert::Infallible;
}

impl SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        1000
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.0 .0.borrow_mut().push(Event::Duty(duty));
        Ok(())
    }
}

struct FakeDelay(Log);

impl DelayNs for FakeDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.0 .0.borrow_mut().push(Event::DelayNs(ns));
    }
}

#[test]
fn test_motor_direction_change_sequence() {
    let log = Log::default();
    let mut dir = PinMock::new(&[
        PinTrans::set(State::Low),
        PinTrans::set(State::High),
    ]);
    let mut bridge = HBridge::new(
        dir.clone(),
        FakePwm(log.clone()),
        FakeDelay(log.clone()),
        None,
    )
    .unwrap();
    assert_eq!(log.take(), vec![Event::Duty(0)]);

    bridge.command(0.5, false).unwrap();
    assert_eq!(log.take(), vec![Event::Duty(500)]);

    bridge.command_signed(-0.25).unwrap();
    assert_eq!(
        log.take(),
        vec![
            Event::Duty(0),
            Event::DelayNs(1_000_000),
            Event::DelayNs(1_000_000),
            Event::Duty(250),
        ]
    );
    assert!(bridge.is_reversed());
    assert_eq!(bridge.duty(), 0.25);

    bridge.command(1.5, true).unwrap();
    assert_eq!(log.take(), vec![Event::Duty(1000)]);
    dir.done();
}

#[test]
fn test_motor_controller_reverse_keeps_magnitude() {
    let log = Log::default();
    let mut dir = PinMock::new(&[
        PinTrans::set(State::Low),
        PinTrans::set(State::High),
    ]);
    let bridge = HBridge::new(
        dir.clone(),
        FakePwm(log.clone()),
        FakeDelay(log.clone()),
        Some(MotorConfig {
            force_low_us: 10,
            initial_duty: 0.0,
        }),
    )
    .unwrap();
    let mut ctrl = MotorController::new(bridge, 0.5).unwrap();
    assert_eq!(ctrl.ex_command(MotorCommand::Reverse).unwrap(), -0.5);
    assert!(ctrl.bridge().is_reversed());
    assert_eq!(
        log.take(),
        vec![
            Event::Duty(0),
            Event::Duty(500),
            Event::Duty(0),
            Event::DelayNs(10_000),
            Event::DelayNs(10_000),
            Event::Duty(500),
        ]
    );
    dir.done();
}
