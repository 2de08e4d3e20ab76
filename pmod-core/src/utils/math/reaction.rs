//! Motor speed estimation from encoder edges.
//!
//! An edge interrupt bumps a rotation counter and a periodic interrupt bumps a
//! real-time tick counter. The foreground turns the counter and tick deltas
//! since its previous call into RPM at the gearbox output shaft.
//!
//! Both counters are shared with interrupt context, so every access goes
//! through a critical-section mutex. Both counters wrap.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// Real-time ticks per second (one tick every 100 us).
pub const REAL_TIME_FACTOR: u32 = 10_000;
/// Hall sensor A cycles per motor revolution times both edges.
pub const EDGES_PER_REV: f32 = 3.0 * 2.0;
/// Gearbox reduction of the stock motor.
pub const DEFAULT_REDUCTION: f32 = 19.0;

/// Counter deltas above this are treated as a backwards wrap.
const HALF_RANGE: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionConfig {
    pub ticks_per_second: u32,
    pub edges_per_rev: f32,
    pub reduction: f32,
}

impl ReactionConfig {
    pub const DEFAULT: Self = Self {
        ticks_per_second: REAL_TIME_FACTOR,
        edges_per_rev: EDGES_PER_REV,
        reduction: DEFAULT_REDUCTION,
    };
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Free-running tick counter advanced from a periodic interrupt.
pub struct RealTimeClock {
    ticks: Mutex<CriticalSectionRawMutex, Cell<u32>>,
}

impl RealTimeClock {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    pub fn tick(&self) {
        self.advance(1);
    }

    pub fn advance(
        &self,
        ticks: u32,
    ) {
        self.ticks.lock(|t| t.set(t.get().wrapping_add(ticks)));
    }

    pub fn now(&self) -> u32 {
        self.ticks.lock(Cell::get)
    }
}

impl Default for RealTimeClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of the reaction state taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionSnapshot {
    /// True when sensors A and B read the same level at the last edge.
    pub direction: bool,
    pub rotation_counter: u32,
    pub saved_real_time: u32,
    pub saved_rotation_counter: u32,
    pub computed_speed_rpm: f32,
}

impl ReactionSnapshot {
    const ZERO: Self = Self {
        direction: false,
        rotation_counter: 0,
        saved_real_time: 0,
        saved_rotation_counter: 0,
        computed_speed_rpm: 0.0,
    };
}

/// Magnitude of the distance between two wrapping counter values.
pub fn counter_delta(
    current: u32,
    saved: u32,
) -> u32 {
    let delta = current.wrapping_sub(saved);
    if delta > HALF_RANGE {
        delta.wrapping_neg()
    } else {
        delta
    }
}

/// Output shaft RPM for `edges` counted over `ticks`.
pub fn speed_rpm(
    edges: u32,
    ticks: u32,
    config: &ReactionConfig,
) -> f32 {
    edges as f32 * 60.0 * config.ticks_per_second as f32
        / config.edges_per_rev
        / ticks as f32
        / config.reduction
}

/// Shared rotation state of one motor.
pub struct ReactionContext {
    state: Mutex<CriticalSectionRawMutex, Cell<ReactionSnapshot>>,
    config: ReactionConfig,
}

impl ReactionContext {
    pub const fn new(config: ReactionConfig) -> Self {
        Self {
            state: Mutex::new(Cell::new(ReactionSnapshot::ZERO)),
            config,
        }
    }

    pub fn config(&self) -> &ReactionConfig {
        &self.config
    }

    /// Record one encoder edge. Call from the edge interrupt with the current
    /// levels of sensors A and B.
    pub fn on_edge(
        &self,
        sa_high: bool,
        sb_high: bool,
    ) {
        self.state.lock(|s| {
            let mut v = s.get();
            v.direction = sa_high == sb_high;
            v.rotation_counter = v.rotation_counter.wrapping_add(1);
            s.set(v);
        });
    }

    /// Compute the speed since the previous call and stamp `now` and the
    /// counter for the next one. The sign follows `duty`.
    ///
    /// With no elapsed tick the previous result is returned unchanged.
    pub fn compute_speed(
        &self,
        now: u32,
        duty: f32,
    ) -> ReactionSnapshot {
        let config = self.config;
        self.state.lock(|s| {
            let mut v = s.get();
            let ticks = now.wrapping_sub(v.saved_real_time);
            if ticks == 0 {
                return v;
            }
            let edges = counter_delta(v.rotation_counter, v.saved_rotation_counter);
            let rpm = libm::fabsf(speed_rpm(edges, ticks, &config));
            v.computed_speed_rpm = if duty < 0.0 { -rpm } else { rpm };
            v.saved_real_time = now;
            v.saved_rotation_counter = v.rotation_counter;
            s.set(v);
            v
        })
    }

    pub fn snapshot(&self) -> ReactionSnapshot {
        self.state.lock(Cell::get)
    }
}
