use core::convert::Infallible;

use embedded_hal_mock::eh1::delay::NoopDelay;
use heapless::String;
use pmod_core::utils::controllers::lcd::{
    cmd, opt, ddram_address, Lcd, LcdArgErrors, LcdCommand, LcdError, LcdPort, Register,
};

/// In-memory controller port: records writes, reports busy for a set number
/// of status reads.
#[derive(Default)]
struct FakePort {
    writes: Vec<(Register, u8)>,
    busy_reads: usize,
    status_reads: usize,
    backlight: bool,
}

impl LcdPort for FakePort {
    type Error = Infallible;

    fn write_byte(
        &mut self,
        register: Register,
        value: u8,
    ) -> Result<(), Self::Error> {
        self.writes.push((register, value));
        Ok(())
    }

    fn read_byte(
        &mut self,
        register: Register,
    ) -> Result<u8, Self::Error> {
        assert_eq!(register, Register::Command);
        self.status_reads += 1;
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
            Ok(cmd::BUSY)
        } else {
            Ok(0)
        }
    }

    fn set_backlight(
        &mut self,
        on: bool,
    ) -> Result<(), Self::Error> {
        self.backlight = on;
        Ok(())
    }
}

fn lcd() -> Lcd<FakePort, NoopDelay> {
    Lcd::new(FakePort::default(), NoopDelay::new())
}

fn commands(port: &FakePort) -> Vec<u8> {
    port.writes
        .iter()
        .filter(|(r, _)| *r == Register::Command)
        .map(|(_, v)| *v)
        .collect()
}

fn data(port: &FakePort) -> Vec<u8> {
    port.writes
        .iter()
        .filter(|(r, _)| *r == Register::Data)
        .map(|(_, v)| *v)
        .collect()
}

#[test]
fn test_init_sequence() {
    let mut lcd = lcd();
    lcd.init(opt::DISPLAY_ON).unwrap();
    let (port, _) = lcd.release();
    assert_eq!(commands(&port), vec![0x38, 0x0C, 0x01]);
    assert_eq!(port.status_reads, 3);
}

#[test]
fn test_display_options_accumulate() {
    let mut lcd = lcd();
    lcd.set_display(true).unwrap();
    lcd.set_cursor(true).unwrap();
    lcd.set_blink(true).unwrap();
    lcd.set_cursor(false).unwrap();
    assert_eq!(lcd.display_mode(), opt::DISPLAY_ON | opt::BLINK_ON);
    let (port, _) = lcd.release();
    assert_eq!(commands(&port), vec![0x0C, 0x0E, 0x0F, 0x0D]);
}

#[test]
fn test_position_flags() {
    assert_eq!(ddram_address(0, 0), Ok(0x00));
    assert_eq!(ddram_address(1, 39), Ok(0x67));
    assert_eq!(ddram_address(2, 0), Err(LcdArgErrors::ROW_RANGE));
    assert_eq!(
        ddram_address(2, 40),
        Err(LcdArgErrors::ROW_RANGE | LcdArgErrors::COL_RANGE)
    );

    let mut lcd = lcd();
    match lcd.set_pos(0, 40) {
        Err(LcdError::InvalidArgument(flags)) => assert_eq!(flags, LcdArgErrors::COL_RANGE),
        other => panic!("unexpected result: {:?}", other),
    }
    let (port, _) = lcd.release();
    assert!(port.writes.is_empty());
}

#[test]
fn test_string_is_cut_at_last_column() {
    let mut lcd = lcd();
    lcd.write_string_at_pos("Hello", 1, 37).unwrap();
    let (port, _) = lcd.release();
    assert_eq!(commands(&port), vec![cmd::SET_DDRAM | 0x40 | 37]);
    assert_eq!(data(&port), b"Hel".to_vec());
}

#[test]
fn test_busy_flag_is_polled() {
    let mut lcd = Lcd::new(
        FakePort {
            busy_reads: 4,
            ..Default::default()
        },
        NoopDelay::new(),
    );
    lcd.write_char(b'A').unwrap();
    let (port, _) = lcd.release();
    assert_eq!(port.status_reads, 5);
    assert_eq!(port.writes, vec![(Register::Data, b'A')]);
}

#[test]
fn test_user_chars() {
    let glyph = [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11, 0x00];
    let mut lcd = lcd();
    lcd.define_user_char(&glyph, 2).unwrap();
    lcd.write_user_chars_at_pos(&[2, 2], 0, 5).unwrap();
    match lcd.define_user_char(&glyph, 8) {
        Err(LcdError::InvalidArgument(flags)) => {
            assert_eq!(flags, LcdArgErrors::UCHAR_POSITION_INVALID)
        }
        other => panic!("unexpected result: {:?}", other),
    }
    let (port, _) = lcd.release();
    assert_eq!(commands(&port), vec![cmd::SET_CGRAM | 0x10, cmd::SET_DDRAM | 5]);
    let mut expected = glyph.to_vec();
    expected.extend([2, 2]);
    assert_eq!(data(&port), expected);
}

#[test]
fn test_command_dispatch() {
    let mut lcd = lcd();
    let text: String<40> = String::try_from("RPM").unwrap();
    lcd.ex_command(&LcdCommand::Write { l: 0, c: 0, t: text }).unwrap();
    lcd.ex_command(&LcdCommand::Shift { right: true }).unwrap();
    lcd.ex_command(&LcdCommand::Backlight { on: true }).unwrap();
    lcd.ex_command(&LcdCommand::Home).unwrap();
    let (port, _) = lcd.release();
    assert!(port.backlight);
    assert_eq!(commands(&port), vec![cmd::SET_DDRAM, 0x1C, cmd::RETURN_HOME]);
    assert_eq!(data(&port), b"RPM".to_vec());
}
