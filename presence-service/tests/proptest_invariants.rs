use presence_client::domain::Reading;
use presence_service::model::{
    align, build_profiles, clean, quantile_levels, score, score_samples, AggregationStrategy,
    CleanedReading, HourlySample, KeySelector, ProfileIndex, QuantileGrid,
};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use time::macros::datetime;
use time::Duration;

const MIN_PROPTEST_CASES: u32 = 256;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn observations_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1_000.0f64..1_000.0, 1..60)
}

fn household_series_strategy() -> impl Strategy<Value = Vec<(u8, f64)>> {
    // (household index, value); values straddle a threshold of 100.
    prop::collection::vec((0u8..3, 0.0f64..200.0), 0..80)
}

fn to_readings(raw: &[(u8, f64)]) -> Vec<Reading> {
    let start = datetime!(2021-03-01 00:00:00 UTC);
    raw.iter()
        .enumerate()
        .map(|(i, &(h, value))| Reading {
            ts: start + Duration::minutes(i as i64),
            household_id: format!("h{h}"),
            value,
        })
        .collect()
}

fn samples_strategy() -> impl Strategy<Value = Vec<HourlySample>> {
    prop::collection::vec(
        (0u8..2, 1u8..29, 0u8..24, 10.0f64..30.0, prop::option::of(0.0f64..3_000.0)),
        1..120,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(h, day, hour, temperature, power)| HourlySample {
                household_id: format!("h{h}"),
                month: 1,
                day,
                hour,
                mean_temperature: Some(temperature),
                mean_power: power,
                part_of_day: hour / 6,
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        .. ProptestConfig::default()
    })]

    #[test]
    fn grid_has_21_non_decreasing_values(values in observations_strategy()) {
        let grid = QuantileGrid::from_observations(values.clone()).unwrap();
        let v = grid.values();

        prop_assert_eq!(v.len(), 21);
        prop_assert!(v.windows(2).all(|w| w[0] <= w[1]));

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert_eq!(v[0], min);
        prop_assert_eq!(v[20], max);
    }

    #[test]
    fn score_is_monotonic(values in observations_strategy(), a in -1_500.0f64..1_500.0, b in -1_500.0f64..1_500.0) {
        let grid = QuantileGrid::from_observations(values).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        prop_assert!(grid.score(lo) <= grid.score(hi));
        prop_assert!((0.0..=1.0).contains(&grid.score(lo)));
    }

    #[test]
    fn scoring_a_profile_value_returns_the_level_of_its_last_tie(values in observations_strategy(), k in 0usize..21) {
        let grid = QuantileGrid::from_observations(values).unwrap();
        let levels = quantile_levels();
        let v = grid.values();

        let last_tie = v.iter().rposition(|&x| x == v[k]).unwrap();
        prop_assert_eq!(score(v[k], v, &levels), levels[last_tie]);
    }

    #[test]
    fn cleaned_values_are_below_threshold_and_no_row_is_dropped(raw in household_series_strategy()) {
        let readings = to_readings(&raw);
        let cleaned = clean(readings, 100.0);

        prop_assert_eq!(cleaned.readings.len(), raw.len());
        let unresolved = cleaned.readings.iter().filter(|r| r.value.is_none()).count();
        prop_assert_eq!(unresolved, cleaned.report.unresolved);
        prop_assert!(cleaned.readings.iter().filter_map(|r| r.value).all(|v| v < 100.0));
    }

    #[test]
    fn alignment_preserves_temperature_count(power in household_series_strategy(), temperature in household_series_strategy()) {
        let cleaned_power: Vec<CleanedReading> = clean(to_readings(&power), 1e9).readings;
        let cleaned_temperature: Vec<CleanedReading> = clean(to_readings(&temperature), 1e9).readings;
        let expected = cleaned_temperature.len();

        prop_assert_eq!(align(cleaned_power, cleaned_temperature).len(), expected);
    }

    #[test]
    fn profiles_and_presence_stay_in_bounds(samples in samples_strategy()) {
        for profile in build_profiles(&samples, KeySelector::Hour) {
            let temperature = profile.temperature.as_ref().unwrap();
            prop_assert_eq!(temperature.values().len(), 21);
            prop_assert!(temperature.values().windows(2).all(|w| w[0] <= w[1]));
        }

        let hourly = ProfileIndex::build(&samples, KeySelector::Hour);
        let daily = ProfileIndex::build(&samples, KeySelector::PartOfDay);
        for strategy in [AggregationStrategy::Mean, AggregationStrategy::Max] {
            let batch = score_samples(samples.clone(), &hourly, &daily, strategy);
            prop_assert_eq!(batch.skipped, 0);
            prop_assert!(batch.scored.iter().all(|s| (0.0..=1.0).contains(&s.prob_presence)));
        }
    }
}
