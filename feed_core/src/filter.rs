//! Speed potentiometer filtering: a fixed moving-average window followed by a
//! clamped linear map from ADC counts to steps per second.
//!
//! All arithmetic is integer. The window starts zero-filled, so the average
//! ramps up from 0 over the first `N` samples.

use crate::error::FeedError;

#[derive(Debug, Clone)]
pub struct MovingAverage<const N: usize> {
    readings: [u32; N],
    index: usize,
    sum: u64,
    filled: usize,
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MovingAverage<N> {
    pub fn new() -> Self {
        const { assert!(N > 0, "moving average needs at least one slot") };
        Self {
            readings: [0; N],
            index: 0,
            sum: 0,
            filled: 0,
        }
    }

    /// Replace the oldest sample with `raw` and return the new average.
    pub fn push(&mut self, raw: u32) -> u32 {
        self.sum -= u64::from(self.readings[self.index]);
        self.readings[self.index] = raw;
        self.sum += u64::from(raw);
        self.index = (self.index + 1) % N;
        if self.filled < N {
            self.filled += 1;
        }
        self.average()
    }

    /// Sum of the window divided by `N`, truncated.
    pub fn average(&self) -> u32 {
        // Every slot is a u32, so the mean fits.
        (self.sum / N as u64) as u32
    }

    /// True once `N` real samples have been pushed.
    pub fn is_primed(&self) -> bool {
        self.filled == N
    }
}

/// Clamped integer linear map `[in_min, in_max]` to `[out_min, out_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedMap {
    in_min: u32,
    in_max: u32,
    out_min: u32,
    out_max: u32,
}

impl SpeedMap {
    pub fn new(in_min: u32, in_max: u32, out_min: u32, out_max: u32) -> Result<Self, FeedError> {
        if in_max <= in_min {
            return Err(FeedError::Config(format!(
                "ADC range is empty ({in_min}..={in_max})"
            )));
        }
        if out_max < out_min {
            return Err(FeedError::Config(format!(
                "speed range is inverted ({out_min}..={out_max})"
            )));
        }
        Ok(Self {
            in_min,
            in_max,
            out_min,
            out_max,
        })
    }

    pub fn map(&self, value: u32) -> u32 {
        let v = u64::from(value.clamp(self.in_min, self.in_max));
        let span_in = u64::from(self.in_max - self.in_min);
        let span_out = u64::from(self.out_max - self.out_min);
        let scaled = (v - u64::from(self.in_min)) * span_out / span_in;
        // scaled <= span_out, so the sum stays within out_max
        (scaled + u64::from(self.out_min)) as u32
    }
}
