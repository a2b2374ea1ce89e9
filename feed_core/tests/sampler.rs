use std::sync::Arc;
use std::time::Duration;

use feed_core::mocks::{CollectingHandler, SharedInput};
use feed_core::{
    CommandEvent, EventBus, MovingAverage, SamplerCfg, SpeedFilter, SpeedMap, SpeedNotify,
    SpeedReadings, SpeedSampler, WINDOW_SIZE,
};
use feed_traits::clock::MonotonicClock;
use proptest::prelude::*;
use rstest::rstest;

#[rstest]
#[case(0, 4095, 0, 13_000)]
#[case(100, 3900, 200, 9_000)]
#[case(512, 513, 1, 2)]
fn full_window_hits_range_ends_exactly(
    #[case] in_min: u32,
    #[case] in_max: u32,
    #[case] out_min: u32,
    #[case] out_max: u32,
) {
    let cfg = SamplerCfg {
        adc_min: in_min,
        adc_max: in_max,
        speed_min: out_min,
        speed_max: out_max,
        ..SamplerCfg::default()
    };
    let mut low = SpeedFilter::new(&cfg).unwrap();
    let mut high = SpeedFilter::new(&cfg).unwrap();
    let (mut lo, mut hi) = (u32::MAX, 0);
    for _ in 0..WINDOW_SIZE {
        lo = low.push(in_min);
        hi = high.push(in_max);
    }
    assert_eq!(lo, out_min);
    assert_eq!(hi, out_max);
}

proptest! {
    #[test]
    fn single_outlier_moves_average_by_an_eighth(base in 0u32..=4095, outlier in 0u32..=4095) {
        let mut ma = MovingAverage::<WINDOW_SIZE>::new();
        for _ in 0..WINDOW_SIZE {
            ma.push(base);
        }
        prop_assert_eq!(ma.average(), base);
        let avg = ma.push(outlier);
        let shift = u64::from(avg.abs_diff(base));
        let deviation = u64::from(outlier.abs_diff(base));
        // truncation can add less than one count
        prop_assert!(shift * WINDOW_SIZE as u64 <= deviation + (WINDOW_SIZE as u64 - 1));
    }

    #[test]
    fn mapped_speed_stays_in_range(raw in any::<u32>(), lo in 0u32..2000, span in 1u32..3000) {
        let map = SpeedMap::new(0, 4095, lo, lo + span).unwrap();
        let v = map.map(raw);
        prop_assert!((lo..=lo + span).contains(&v));
    }
}

#[test]
fn publishes_mapped_average() {
    let cfg = SamplerCfg {
        sample_rate_hz: 500,
        ..SamplerCfg::default()
    };
    let speeds = Arc::new(SpeedReadings::default());
    let input = SharedInput::new(4095);
    let sampler =
        SpeedSampler::spawn(input.clone(), &cfg, speeds.clone(), None, MonotonicClock::new())
            .unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(speeds.normal_speed(), 13_000);
    assert_eq!(speeds.rapid_speed(), cfg.rapid_speed);
    input.set(0);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(speeds.normal_speed(), 0);
    drop(sampler);
}

#[test]
fn posts_once_primed_and_only_on_meaningful_change() {
    let cfg = SamplerCfg {
        sample_rate_hz: 500,
        ..SamplerCfg::default()
    };
    let bus = EventBus::new("command", 16).unwrap();
    let speeds = Arc::new(SpeedReadings::default());
    let notify = SpeedNotify {
        commands: bus.poster(),
        post_timeout: Duration::from_millis(5),
        threshold: 20,
    };
    let sampler = SpeedSampler::spawn(
        SharedInput::new(2048),
        &cfg,
        speeds,
        Some(notify),
        MonotonicClock::new(),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(150));
    drop(sampler);

    let (mut h, seen) = CollectingHandler::new();
    bus.run_once(Duration::from_millis(5), &mut h);
    // 2048 counts map to 6501 sps; the ramp-up before priming is never posted.
    assert_eq!(*seen.lock().unwrap(), vec![CommandEvent::UpdateNormalSpeed(6501)]);
}
