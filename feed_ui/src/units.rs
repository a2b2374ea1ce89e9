//! Feed rate units shown on the display.

/// Millimetres per inch.
pub const MM_PER_INCH: f32 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SpeedUnit {
    /// Millimetres per minute
    #[default]
    Mmpm,
    /// Inches per minute
    Ipm,
}

impl SpeedUnit {
    pub fn label(self) -> &'static str {
        match self {
            SpeedUnit::Mmpm => "mm/min",
            SpeedUnit::Ipm => "in/min",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SpeedUnit::Mmpm => SpeedUnit::Ipm,
            SpeedUnit::Ipm => SpeedUnit::Mmpm,
        }
    }
}

impl std::str::FromStr for SpeedUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mmpm" => Ok(SpeedUnit::Mmpm),
            "ipm" => Ok(SpeedUnit::Ipm),
            other => Err(format!("unknown speed unit {other:?} (expected mmpm or ipm)")),
        }
    }
}

/// Lead screw geometry needed to turn step rates into feed rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mechanics {
    pub steps_per_rev: u32,
    pub mm_per_rev: f32,
}

impl Default for Mechanics {
    fn default() -> Self {
        Self {
            steps_per_rev: 200,
            mm_per_rev: 0.25 * MM_PER_INCH * 1.5 * 4.0,
        }
    }
}

impl Mechanics {
    /// Feed per minute for `steps_per_sec` in `unit`.
    pub fn per_minute(&self, steps_per_sec: u32, unit: SpeedUnit) -> f32 {
        let revs_per_min = steps_per_sec as f32 * 60.0 / self.steps_per_rev.max(1) as f32;
        let mm = revs_per_min * self.mm_per_rev;
        match unit {
            SpeedUnit::Mmpm => mm,
            SpeedUnit::Ipm => mm / MM_PER_INCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, SpeedUnit::Mmpm, 0.0)]
    #[case(200, SpeedUnit::Mmpm, 2286.0)]
    #[case(200, SpeedUnit::Ipm, 90.0)]
    #[case(13_000, SpeedUnit::Ipm, 5850.0)]
    fn converts_step_rate(#[case] sps: u32, #[case] unit: SpeedUnit, #[case] expected: f32) {
        let m = Mechanics::default();
        let got = m.per_minute(sps, unit);
        assert!((got - expected).abs() < 0.5, "{got} != {expected}");
    }

    #[test]
    fn parses_config_spelling() {
        assert_eq!("ipm".parse::<SpeedUnit>(), Ok(SpeedUnit::Ipm));
        assert!("furlongs".parse::<SpeedUnit>().is_err());
        assert_eq!(SpeedUnit::Ipm.toggled(), SpeedUnit::Mmpm);
    }
}
