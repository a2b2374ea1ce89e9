#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the power feed.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section except `[pins]` has defaults matching the reference
//!   lathe build (13 kHz driver, 200 step motor, 4 tpi screw with two 1.5:1
//!   reductions, 12-bit ADC).
use serde::Deserialize;

/// Millimetres per inch, for the mechanics defaults.
const MM_PER_INCH: f32 = 25.4;

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub left: u8,
    pub right: u8,
    pub rapid: u8,
    /// ADC channel of the speed potentiometer.
    pub speed_adc: u8,
    pub step: Option<u8>,
    pub dir: Option<u8>,
    pub enable: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusCfg {
    pub command_capacity: usize,
    pub ui_capacity: usize,
    pub command_post_timeout_ms: u64,
    pub ui_post_timeout_ms: u64,
    /// Max block inside one command consumer iteration.
    pub command_wait_ms: u64,
    /// Yield between command consumer iterations.
    pub command_idle_ms: u64,
    pub ui_wait_ms: u64,
    pub ui_idle_ms: u64,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            command_capacity: 16,
            ui_capacity: 16,
            command_post_timeout_ms: 250,
            ui_post_timeout_ms: 250,
            command_wait_ms: 100,
            command_idle_ms: 10,
            ui_wait_ms: 500,
            ui_idle_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplerCfg {
    pub sample_rate_hz: u32,
    pub adc_min: u32,
    pub adc_max: u32,
    /// Normal speed range in steps per second.
    pub speed_min: u32,
    pub speed_max: u32,
    /// Rapid preset in steps per second; defaults to the driver maximum when absent.
    pub rapid_speed: Option<u32>,
    /// Post `UpdateNormalSpeed` when the mapped speed moves at least this far.
    /// Absent disables sampler-driven posting.
    pub change_threshold: Option<u32>,
}

impl Default for SamplerCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50,
            adc_min: 0,
            adc_max: 4095,
            speed_min: 0,
            speed_max: 13_000,
            rapid_speed: None,
            change_threshold: Some(20),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StepperCfg {
    /// Highest pulse rate the driver accepts at 50% duty.
    pub max_steps_per_sec: u32,
    pub steps_per_rev: u32,
    pub mm_per_rev: f32,
    /// steps/s^2
    pub acceleration: u32,
    /// steps/s^2
    pub deceleration: u32,
}

impl Default for StepperCfg {
    fn default() -> Self {
        Self {
            max_steps_per_sec: 13_000,
            steps_per_rev: 200,
            mm_per_rev: 0.25 * MM_PER_INCH * 1.5 * 4.0,
            acceleration: 20_000,
            deceleration: 200_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StopDetectorCfg {
    pub poll_ms: u64,
    pub post_timeout_ms: u64,
    /// Attempts to post `SetStopped` before the fault is escalated.
    pub post_attempts: u32,
    /// Give up waiting for the axis to report stopped after this long.
    pub stop_timeout_ms: u64,
}

impl Default for StopDetectorCfg {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            post_timeout_ms: 250,
            post_attempts: 3,
            stop_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayCfg {
    /// "mmpm" (mm/min) or "ipm" (in/min)
    pub units: String,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            units: "mmpm".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ButtonsCfg {
    /// Treat low level as pressed when true
    pub active_low: bool,
    /// Number of consecutive equal polls required to accept an edge
    pub debounce_n: u8,
    pub poll_ms: u64,
}

impl Default for ButtonsCfg {
    fn default() -> Self {
        Self {
            active_low: true,
            debounce_n: 3,
            poll_ms: 5,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub bus: BusCfg,
    #[serde(default)]
    pub sampler: SamplerCfg,
    #[serde(default)]
    pub stepper: StepperCfg,
    #[serde(default)]
    pub stop_detector: StopDetectorCfg,
    #[serde(default)]
    pub display: DisplayCfg,
    #[serde(default)]
    pub buttons: ButtonsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl SamplerCfg {
    /// Rapid preset, falling back to the driver maximum.
    pub fn effective_rapid_speed(&self, stepper: &StepperCfg) -> u32 {
        self.rapid_speed.unwrap_or(stepper.max_steps_per_sec)
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Bus
        if self.bus.command_capacity == 0 {
            eyre::bail!("bus.command_capacity must be >= 1");
        }
        if self.bus.ui_capacity == 0 {
            eyre::bail!("bus.ui_capacity must be >= 1");
        }
        if self.bus.command_post_timeout_ms == 0 || self.bus.ui_post_timeout_ms == 0 {
            eyre::bail!("bus post timeouts must be >= 1 ms");
        }
        if self.bus.command_post_timeout_ms >= 1_000 {
            eyre::bail!("bus.command_post_timeout_ms must stay sub-second");
        }
        if self.bus.command_wait_ms == 0 || self.bus.ui_wait_ms == 0 {
            eyre::bail!("bus consumer wait periods must be >= 1 ms");
        }

        // Sampler
        if self.sampler.sample_rate_hz == 0 {
            eyre::bail!("sampler.sample_rate_hz must be > 0");
        }
        if self.sampler.adc_max <= self.sampler.adc_min {
            eyre::bail!("sampler.adc_max must be > sampler.adc_min");
        }
        if self.sampler.speed_max < self.sampler.speed_min {
            eyre::bail!("sampler.speed_max must be >= sampler.speed_min");
        }
        if self.sampler.speed_max > self.stepper.max_steps_per_sec {
            eyre::bail!("sampler.speed_max exceeds stepper.max_steps_per_sec");
        }
        let rapid = self.sampler.effective_rapid_speed(&self.stepper);
        if rapid == 0 || rapid > self.stepper.max_steps_per_sec {
            eyre::bail!("sampler.rapid_speed must be in [1, stepper.max_steps_per_sec]");
        }
        if self.sampler.change_threshold == Some(0) {
            eyre::bail!("sampler.change_threshold must be >= 1 when set");
        }

        // Stepper
        if self.stepper.max_steps_per_sec == 0 {
            eyre::bail!("stepper.max_steps_per_sec must be > 0");
        }
        if self.stepper.steps_per_rev == 0 {
            eyre::bail!("stepper.steps_per_rev must be > 0");
        }
        if !(self.stepper.mm_per_rev.is_finite() && self.stepper.mm_per_rev > 0.0) {
            eyre::bail!("stepper.mm_per_rev must be a positive number");
        }
        if self.stepper.acceleration == 0 || self.stepper.deceleration == 0 {
            eyre::bail!("stepper acceleration and deceleration must be > 0");
        }

        // Stop detector
        if self.stop_detector.poll_ms == 0 {
            eyre::bail!("stop_detector.poll_ms must be >= 1");
        }
        if self.stop_detector.post_timeout_ms == 0 {
            eyre::bail!("stop_detector.post_timeout_ms must be >= 1");
        }
        if self.stop_detector.post_attempts == 0 {
            eyre::bail!("stop_detector.post_attempts must be >= 1");
        }
        if self.stop_detector.stop_timeout_ms <= self.stop_detector.poll_ms {
            eyre::bail!("stop_detector.stop_timeout_ms must exceed poll_ms");
        }

        // Display
        match self.display.units.as_str() {
            "mmpm" | "ipm" => {}
            other => eyre::bail!("display.units must be \"mmpm\" or \"ipm\", got {other:?}"),
        }

        // Buttons
        if self.buttons.debounce_n == 0 {
            eyre::bail!("buttons.debounce_n must be >= 1");
        }
        if self.buttons.poll_ms == 0 {
            eyre::bail!("buttons.poll_ms must be >= 1");
        }

        // Logging: rotation is free-form here and resolved by the CLI

        Ok(())
    }
}
