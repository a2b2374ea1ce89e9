#![no_main]
use libfuzzer_sys::fuzz_target;

// Loading and validating arbitrary text must never panic; for configs that
// validate, the derived rapid preset must stay within the driver limit.
fuzz_target!(|data: &str| {
    let Ok(cfg) = feed_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        let rapid = cfg.sampler.effective_rapid_speed(&cfg.stepper);
        assert!(rapid >= 1 && rapid <= cfg.stepper.max_steps_per_sec);
        assert!(cfg.sampler.adc_max > cfg.sampler.adc_min);
    }
});
