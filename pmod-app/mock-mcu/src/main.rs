mod sim;

use clap::Parser;
use core::{cell::Cell, cell::RefCell, fmt::Write as _};
use embassy_executor::{Executor, Spawner};
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embassy_time::{Delay, Timer};
use heapless::String as HString;
use pmod_core::mk_static;
use pmod_core::utils::controllers::{
    LCD_CHANNEL, LED_CHANNEL, MOTOR_CHANNEL, SystemCommand,
    acl::{ACL_CHANNEL, AclCommand},
    buttons::{DebounceConfig, SharedButtons},
    lcd::{Lcd, LcdCommand, opt},
    leds::{LEDCommand, LedBank, LedModule},
    motor::{HBridge, MotorController, status_leds},
};
use pmod_core::utils::math::{
    reaction::{EDGES_PER_REV, ReactionConfig},
    steering::PWM_PERIOD,
};
use pmod_core::utils::{RealTimeClock, ReactionContext, SystemController};
use sim::{LogPin, LogPwm, SimAdxl345, SimLcd};
use static_cell::StaticCell;
use tracing::{error, info, warn};

/// Output shaft speed of the simulated motor at full duty.
const NO_LOAD_RPM: f32 = 300.0;
/// Wake-up period of the simulated interrupt loop.
const ISR_BATCH_US: u32 = 10_000;
/// Samples a simulated button press is held for.
const PRESS_SAMPLES: u16 = 300;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Gearbox reduction between motor and output shaft
    #[clap(long, default_value_t = 19.0)]
    reduction: f32,
    /// Real-time tick period in microseconds; must divide 10000
    #[clap(long, default_value_t = 100, value_parser = parse_tick_us)]
    tick_us: u32,
    /// LCD refresh period in milliseconds
    #[clap(long, default_value_t = 200)]
    display_ms: u64,
    /// Initial signed motor duty, -1..=1
    #[clap(long, default_value_t = 0.5, allow_hyphen_values = true)]
    duty: f32,
    /// Do not log the LCD contents after each write
    #[clap(long)]
    no_lcd_echo: bool,
}

/// Tick periods that fit a whole number of times into one interrupt batch,
/// so the simulated clock keeps pace with `ticks_per_second`.
fn parse_tick_us(arg: &str) -> Result<u32, String> {
    let tick_us: u32 = arg.parse().map_err(|e| format!("{e}"))?;
    if tick_us == 0 || ISR_BATCH_US % tick_us != 0 {
        return Err(format!("{tick_us} does not divide {ISR_BATCH_US}"));
    }
    Ok(tick_us)
}

static CLOCK: RealTimeClock = RealTimeClock::new();
static BUTTONS: SharedButtons = SharedButtons::new(DebounceConfig::AUTO_REPEAT);
/// Signed duty currently driven by the motor task.
static APPLIED_DUTY: Mutex<CriticalSectionRawMutex, Cell<f32>> = Mutex::new(Cell::new(0.0));
/// Remaining held samples of the simulated buttons 1 and 2.
static PRESSES: Mutex<CriticalSectionRawMutex, Cell<(u16, u16)>> = Mutex::new(Cell::new((0, 0)));

#[embassy_executor::task]
async fn acl_task(mut ctrl: SystemController<SimAdxl345>) -> ! {
    ctrl.acl_ch().await
}

#[embassy_executor::task]
async fn acl_poll_task() -> ! {
    loop {
        Timer::after_secs(1).await;
        if ACL_CHANNEL.try_send(AclCommand::ReadAccel).is_err() {
            warn!("accelerometer queue full");
        }
    }
}

#[embassy_executor::task]
async fn lcd_task(
    mut lcd: Lcd<SimLcd, Delay>,
    echo: bool,
) -> ! {
    loop {
        let cmd: LcdCommand = LCD_CHANNEL.receiver().receive().await;
        if let Err(e) = lcd.ex_command(&cmd) {
            error!("LCD command failed: {:?}", e);
            continue;
        }
        if echo && matches!(cmd, LcdCommand::Write { .. }) {
            info!("LCD |{}|", lcd.port().line(0));
            info!("LCD |{}|", lcd.port().line(1));
        }
    }
}

#[embassy_executor::task]
async fn motor_task(mut motor: MotorController<LogPin, LogPwm, Delay>) -> ! {
    loop {
        let cmd = MOTOR_CHANNEL.receiver().receive().await;
        match motor.ex_command(cmd) {
            Ok(duty) => {
                APPLIED_DUTY.lock(|d| d.set(duty));
                info!(duty, "motor command {:?}", cmd);
            }
            Err(e) => error!("motor command failed: {:?}", e),
        }
    }
}

#[embassy_executor::task]
async fn led_task(mut leds: LedModule<LogPin, Delay, 4>) -> ! {
    loop {
        let cmd: LEDCommand = LED_CHANNEL.receiver().receive().await;
        if let Err(e) = leds.ex_command(cmd) {
            error!("LED command failed: {:?}", e);
        }
    }
}

/// Stands in for the timer and encoder interrupts: advances the real-time
/// clock, samples the buttons and emits encoder edges in proportion to duty.
#[embassy_executor::task]
async fn tick_task(
    reaction: &'static ReactionContext,
    tick_us: u32,
) -> ! {
    let ticks = ISR_BATCH_US / tick_us;
    let config = *reaction.config();
    let edges_per_s = NO_LOAD_RPM / 60.0 * config.reduction * config.edges_per_rev;
    let mut pending_edges = 0.0f32;
    loop {
        Timer::after_micros(u64::from(ISR_BATCH_US)).await;
        for _ in 0..ticks {
            CLOCK.tick();
            let (raw1, raw2) = PRESSES.lock(|p| {
                let (b1, b2) = p.get();
                p.set((b1.saturating_sub(1), b2.saturating_sub(1)));
                (b1 > 0, b2 > 0)
            });
            BUTTONS.sample(raw1, raw2);
        }

        let duty = APPLIED_DUTY.lock(Cell::get);
        pending_edges += duty.abs() * edges_per_s * ISR_BATCH_US as f32 / 1_000_000.0;
        while pending_edges >= 1.0 {
            reaction.on_edge(true, duty >= 0.0);
            pending_edges -= 1.0;
        }
    }
}

/// Motor demo front panel: buttons step the duty, LEDs show limits and
/// presses.
#[embassy_executor::task]
async fn panel_task() -> ! {
    let mut shown = None;
    loop {
        Timer::after_millis(10).await;
        if let Some(event) = BUTTONS.take_event() {
            info!("button event {:?}", event);
            MOTOR_CHANNEL.send(event.into()).await;
        }
        let mask = status_leds(APPLIED_DUTY.lock(Cell::get), BUTTONS.flash_mask());
        if shown != Some(mask) {
            LED_CHANNEL.send(LEDCommand::Mask { m: mask }).await;
            shown = Some(mask);
        }
    }
}

#[embassy_executor::task]
async fn display_task(
    reaction: &'static ReactionContext,
    display_ms: u64,
) -> ! {
    loop {
        Timer::after_millis(display_ms).await;
        let duty = APPLIED_DUTY.lock(Cell::get);
        let snapshot = reaction.compute_speed(CLOCK.now(), duty);

        let mut line: HString<40> = HString::new();
        let _ = write!(line, "Duty: {:7.3}", duty);
        LCD_CHANNEL
            .send(LcdCommand::Write { l: 0, c: 0, t: line })
            .await;
        let mut line: HString<40> = HString::new();
        let _ = write!(line, "RPM: {:8.3}", snapshot.computed_speed_rpm);
        LCD_CHANNEL
            .send(LcdCommand::Write { l: 1, c: 0, t: line })
            .await;
    }
}

/// Read JSON commands from stdin. `b1`, `b2` and `b12` press the buttons.
fn stdin_reader() {
    for line in std::io::stdin().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        let press = match line {
            "" => continue,
            "b1" => Some((PRESS_SAMPLES, 0)),
            "b2" => Some((0, PRESS_SAMPLES)),
            "b12" => Some((PRESS_SAMPLES, 2 * PRESS_SAMPLES)),
            _ => None,
        };
        if let Some(p) = press {
            PRESSES.lock(|c| c.set(p));
            continue;
        }
        match serde_json::from_str::<SystemCommand>(line) {
            Ok(cmd) => {
                cmd.dispatch();
            }
            Err(e) => warn!("invalid command {:?}: {}", line, e),
        }
    }
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
) {
    static I2C_BUS: StaticCell<RefCell<SimAdxl345>> = StaticCell::new();
    let i2c_bus = I2C_BUS.init(RefCell::new(SimAdxl345::new()));
    let sys_ctrl = SystemController::new(i2c_bus);
    spawner.spawn(acl_task(sys_ctrl)).unwrap();
    spawner.spawn(acl_poll_task()).unwrap();

    let mut lcd = Lcd::new(SimLcd::new(), Delay);
    if let Err(e) = lcd.init(opt::DISPLAY_ON) {
        error!("LCD init failed: {:?}", e);
    }
    spawner.spawn(lcd_task(lcd, !opts.no_lcd_echo)).unwrap();

    let bank = LedBank::new([LogPin("LD1"), LogPin("LD2"), LogPin("LD3"), LogPin("LD4")]).unwrap();
    let mut leds = LedModule::new(bank, Delay);
    leds.ex_command(LEDCommand::Cycle).unwrap();
    leds.ex_command(LEDCommand::Off).unwrap();
    leds.ex_command(LEDCommand::On).unwrap();
    spawner.spawn(led_task(leds)).unwrap();

    let bridge = HBridge::new(
        LogPin("HB_DIR"),
        LogPwm {
            name: "HB_EN",
            period: PWM_PERIOD,
        },
        Delay,
        None,
    )
    .unwrap();
    let motor = MotorController::new(bridge, opts.duty).unwrap();
    APPLIED_DUTY.lock(|d| d.set(motor.duty()));
    spawner.spawn(motor_task(motor)).unwrap();

    let reaction: &'static ReactionContext = mk_static!(
        ReactionContext,
        ReactionContext::new(ReactionConfig {
            ticks_per_second: 1_000_000 / opts.tick_us,
            edges_per_rev: EDGES_PER_REV,
            reduction: opts.reduction,
        })
    );
    spawner.spawn(tick_task(reaction, opts.tick_us)).unwrap();
    spawner.spawn(panel_task()).unwrap();
    spawner.spawn(display_task(reaction, opts.display_ms)).unwrap();

    std::thread::spawn(stdin_reader);
    info!("board running; send JSON commands or b1/b2/b12 on stdin");
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts)).unwrap();
    });
}
