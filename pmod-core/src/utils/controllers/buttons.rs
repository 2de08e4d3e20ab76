//! Debounced two-button input, sampled from a periodic interrupt.
//!
//! [`ButtonPair::sample`] runs every tick with the raw pin levels. A new level
//! is accepted after `accept_after` identical consecutive reads. A press marks
//! the button for processing; holding it marks it again every `repeat_after`
//! samples. Releasing one button while the other is still held records a
//! double press, which the foreground sees as [`ButtonEvent::Both`].
//!
//! Each button also owns an action-LED countdown so the ISR can switch the
//! LED off after a flash without foreground help.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// Samples an action LED stays lit after a press (100 ms at a 100 µs tick).
pub const FLASH_SAMPLES: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Identical consecutive reads needed to accept a new level.
    pub accept_after: u8,
    /// Samples in the pressed state before the press is reported again.
    pub repeat_after: Option<u16>,
}

impl DebounceConfig {
    pub const DEFAULT: Self = Self {
        accept_after: 10,
        repeat_after: None,
    };

    /// Motor demo timing: auto-repeat after 600 ms at a 100 µs tick.
    pub const AUTO_REPEAT: Self = Self {
        accept_after: 10,
        repeat_after: Some(6000),
    };
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Btn1,
    Btn2,
    /// One button was released while the other was held.
    Both,
}

#[derive(Debug, Clone, Copy, Default)]
struct Button {
    pressed: bool,
    prev: bool,
    same_reads: u8,
    same_state: u16,
    process: bool,
    released_on_double: bool,
    flash: u16,
}

impl Button {
    const NEW: Self = Self {
        pressed: false,
        prev: false,
        same_reads: 0,
        same_state: 0,
        process: false,
        released_on_double: false,
        flash: 0,
    };

    fn count(
        &mut self,
        raw: bool,
    ) {
        self.same_reads = if raw == self.prev {
            self.same_reads.saturating_add(1)
        } else {
            0
        };
        self.prev = raw;
        if self.flash > 0 {
            self.flash -= 1;
        }
    }

    fn update(
        &mut self,
        other_prev: bool,
        config: &DebounceConfig,
    ) {
        let raw = self.prev;
        if self.same_reads == config.accept_after && self.pressed != raw {
            if self.pressed && other_prev {
                self.released_on_double = true;
            }
            self.pressed = raw;
            self.same_reads = 0;
            self.same_state = 0;
            self.process = raw;
        } else if self.pressed == raw {
            self.same_state = self.same_state.saturating_add(1);
            if Some(self.same_state) == config.repeat_after {
                if self.pressed {
                    self.process = true;
                }
                self.same_state = 0;
            }
        }
    }
}

/// Debounce state of two buttons.
#[derive(Debug, Clone, Copy)]
pub struct ButtonPair {
    config: DebounceConfig,
    btn1: Button,
    btn2: Button,
}

impl ButtonPair {
    pub const fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            btn1: Button::NEW,
            btn2: Button::NEW,
        }
    }

    /// Feed one raw sample per button (`true` = pressed).
    pub fn sample(
        &mut self,
        raw1: bool,
        raw2: bool,
    ) {
        self.btn1.count(raw1);
        self.btn2.count(raw2);
        let prev2 = self.btn2.prev;
        self.btn1.update(prev2, &self.config);
        let prev1 = self.btn1.prev;
        self.btn2.update(prev1, &self.config);
    }

    /// Debounced levels of button 1 and button 2.
    pub fn states(&self) -> (bool, bool) {
        (self.btn1.pressed, self.btn2.pressed)
    }

    /// Consume the pending event, if any.
    pub fn take_event(&mut self) -> Option<ButtonEvent> {
        if self.btn1.released_on_double || self.btn2.released_on_double {
            self.btn1.process = false;
            self.btn2.process = false;
            self.btn1.released_on_double = false;
            self.btn2.released_on_double = false;
            return Some(ButtonEvent::Both);
        }
        if self.btn2.pressed && self.btn2.process {
            self.btn2.process = false;
            return Some(ButtonEvent::Btn2);
        }
        if self.btn1.pressed && self.btn1.process {
            self.btn1.process = false;
            return Some(ButtonEvent::Btn1);
        }
        None
    }

    /// Light the action LED of `event`'s button for [`FLASH_SAMPLES`].
    pub fn start_flash(
        &mut self,
        event: ButtonEvent,
    ) {
        match event {
            ButtonEvent::Btn1 => self.btn1.flash = FLASH_SAMPLES,
            ButtonEvent::Btn2 => self.btn2.flash = FLASH_SAMPLES,
            ButtonEvent::Both => {}
        }
    }

    /// Action LEDs still lit: bit 1 for button 1, bit 2 for button 2.
    pub fn flash_mask(&self) -> u8 {
        let mut mask = 0;
        if self.btn1.flash > 0 {
            mask |= 0b0010;
        }
        if self.btn2.flash > 0 {
            mask |= 0b0100;
        }
        mask
    }
}

/// [`ButtonPair`] shared between the sampling interrupt and the main loop.
pub struct SharedButtons {
    inner: Mutex<CriticalSectionRawMutex, RefCell<ButtonPair>>,
}

impl SharedButtons {
    pub const fn new(config: DebounceConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(ButtonPair::new(config))),
        }
    }

    pub fn sample(
        &self,
        raw1: bool,
        raw2: bool,
    ) {
        self.inner.lock(|b| b.borrow_mut().sample(raw1, raw2));
    }

    pub fn states(&self) -> (bool, bool) {
        self.inner.lock(|b| b.borrow().states())
    }

    /// Take the pending event and start the matching action-LED flash.
    pub fn take_event(&self) -> Option<ButtonEvent> {
        self.inner.lock(|b| {
            let mut pair = b.borrow_mut();
            let event = pair.take_event();
            if let Some(e) = event {
                pair.start_flash(e);
            }
            event
        })
    }

    pub fn flash_mask(&self) -> u8 {
        self.inner.lock(|b| b.borrow().flash_mask())
    }
}
