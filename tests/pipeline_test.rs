//! Range service integration tests.
//!
//! Tests cover:
//! - The quiet/breakout/quiet scenario end to end
//! - Cache hits, TTL expiry, lookback mismatch and forced refresh
//! - Cache clearing by symbol prefix
//! - Session filtering per instrument class
//! - Bulk sweeps with failing instruments and the read-only accessors
//! - One fetch per key under concurrent requests

mod common;

use common::*;
use rangescan::adapters::csv_export_adapter::CsvRangeExporter;
use rangescan::domain::bar::Timeframe;
use rangescan::domain::error::RangeError;
use rangescan::domain::merger::{MergeOrder, OverlapRule};
use rangescan::domain::request::RangeRequest;
use rangescan::domain::settings::RangeSettings;
use std::sync::Arc;

fn xau_request(force_refresh: bool) -> RangeRequest {
    RangeRequest::new("XAUUSD", 5, 20, 4, force_refresh).unwrap()
}

fn scenario_source() -> Arc<MockBarSource> {
    Arc::new(MockBarSource::new().with_bars("XAUUSD+", scenario_bars()))
}

mod scenario_tests {
    use super::*;

    #[test]
    fn quiet_breakout_quiet_yields_two_ranges() {
        let service = service_with(scenario_source());

        let response = service.calculate(&xau_request(false)).unwrap();
        assert!(response.success);
        let report = response.report.unwrap();

        assert_eq!(report.range_size, 1.5);
        assert_eq!(report.bar_count, 20);

        let starts: Vec<usize> = report.body_ranges.iter().map(|r| r.start_idx).collect();
        assert_eq!(starts, vec![0, 1, 2, 3, 4, 5, 6, 15, 16]);
        for r in &report.body_ranges {
            assert!(r.range_value <= 1.5);
            assert_eq!(r.symbol, "XAUUSD");
        }

        assert_eq!(report.merged_ranges_count, 2);
        let first = &report.merged_ranges[0];
        assert_eq!((first.start_idx, first.end_idx), (0, 9));
        assert_eq!(first.duration_bars, 28);
        assert_eq!(first.member_count, 7);
        assert_eq!(first.top, 100.5);
        assert_eq!(first.bottom, 100.0);
        assert_eq!(first.start_label, "02-07-2024 09:00");
        assert_eq!(first.end_label, "02-07-2024 09:45");

        let second = &report.merged_ranges[1];
        assert_eq!((second.start_idx, second.end_idx), (15, 19));
        assert_eq!(second.duration_bars, 8);
    }

    #[test]
    fn time_overlap_rule_gives_same_groups() {
        let service = service_with(scenario_source()).with_settings(RangeSettings {
            overlap: OverlapRule::Time,
            ..RangeSettings::default()
        });
        let report = service.calculate(&xau_request(false)).unwrap().report.unwrap();
        let spans: Vec<(usize, usize)> = report
            .merged_ranges
            .iter()
            .map(|m| (m.start_idx, m.end_idx))
            .collect();
        assert_eq!(spans, vec![(0, 9), (15, 19)]);
    }

    #[test]
    fn configured_order_applies_on_demand() {
        let service = service_with(scenario_source()).with_settings(RangeSettings {
            merge_order: MergeOrder::MostRecentFirst,
            ..RangeSettings::default()
        });
        let report = service.calculate(&xau_request(false)).unwrap().report.unwrap();
        assert_eq!(report.merged_ranges[0].start_idx, 15);
        assert_eq!(report.latest_range().unwrap().start_idx, 15);
    }

    #[test]
    fn fewer_session_bars_than_lookback_is_empty_success() {
        let source = Arc::new(
            MockBarSource::new().with_bars("XAUUSD+", flat_bars(epoch(2024, 7, 2, 9, 0), 300, 3, 2330.0)),
        );
        let service = service_with(source);

        let response = service.calculate(&xau_request(false)).unwrap();
        let report = response.report.unwrap();
        assert_eq!(report.bar_count, 3);
        assert_eq!(report.body_ranges_count, 0);
        assert_eq!(report.merged_ranges_count, 0);
    }

    #[test]
    fn missing_source_data_is_unsuccessful() {
        let service = service_with(Arc::new(MockBarSource::new()));
        let response = service.fetch_and_calculate_ranges(&xau_request(false));
        assert!(!response.success);
        assert!(response.error.unwrap().contains("XAUUSD+"));
    }
}

mod session_tests {
    use super::*;

    #[test]
    fn weekend_bars_dropped_for_session_instruments_only() {
        // Saturday 2024-07-06 06:00 through Sunday 2024-07-07 23:00, hourly.
        let weekend = flat_bars(epoch(2024, 7, 6, 6, 0), 3600, 42, 1.0);
        let source = Arc::new(
            MockBarSource::new()
                .with_bars("EURUSD+", weekend.clone())
                .with_bars("BTCUSD", weekend),
        );
        let service = service_with(source);

        let eur = service
            .calculate(&RangeRequest::new("EURUSD", 60, 42, 1, false).unwrap())
            .unwrap()
            .report
            .unwrap();
        // Only Saturday 06:00 survives.
        assert_eq!(eur.bar_count, 1);

        let btc = service
            .calculate(&RangeRequest::new("BTCUSD", 60, 42, 1, false).unwrap())
            .unwrap()
            .report
            .unwrap();
        assert_eq!(btc.bar_count, 42);
    }

    #[test]
    fn duplicate_timestamps_are_collapsed() {
        let mut bars = flat_bars(epoch(2024, 7, 2, 9, 0), 300, 6, 1.0);
        bars.push(bars[2]);
        bars.reverse();
        let source = Arc::new(MockBarSource::new().with_bars("BTCUSD", bars));
        let service = service_with(source);

        let report = service
            .calculate(&RangeRequest::new("BTCUSD", 5, 100, 2, false).unwrap())
            .unwrap()
            .report
            .unwrap();
        assert_eq!(report.bar_count, 6);
    }
}

mod cache_tests {
    use super::*;

    #[test]
    fn repeated_request_is_served_from_cache() {
        let source = scenario_source();
        let service = service_with(source.clone());

        let first = service.calculate(&xau_request(false)).unwrap();
        let second = service.calculate(&xau_request(false)).unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert!(second.cache_age_seconds.unwrap() >= 0.0);
        assert_eq!(first.report, second.report);
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn forced_refresh_is_idempotent() {
        let source = scenario_source();
        let service = service_with(source.clone());

        let first = service.calculate(&xau_request(true)).unwrap();
        let second = service.calculate(&xau_request(true)).unwrap();

        assert!(!first.cached && !second.cached);
        assert_eq!(first.report, second.report);
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let source = scenario_source();
        let clock = ManualClock::new();
        let service = service_with(source.clone()).with_clock(clock.clock());

        service.calculate(&xau_request(false)).unwrap();
        clock.advance(299);
        let hit = service.calculate(&xau_request(false)).unwrap();
        assert!(hit.cached);
        assert_eq!(hit.cache_age_seconds, Some(299.0));
        assert_eq!(source.fetch_count(), 1);

        clock.advance(1);
        let miss = service.calculate(&xau_request(false)).unwrap();
        assert!(!miss.cached);
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn stale_entries_are_still_readable() {
        let clock = ManualClock::new();
        let service = service_with(scenario_source()).with_clock(clock.clock());

        service.calculate(&xau_request(false)).unwrap();
        clock.advance(3600);

        let cached = service.get_cached("xauusd", Timeframe::M5, 20).unwrap();
        assert!(cached.cached);
        assert_eq!(cached.cache_age_seconds, Some(3600.0));
        assert!(service.cache_status().entries[0].stale);
    }

    #[test]
    fn lookback_mismatch_recomputes_and_overwrites() {
        let source = scenario_source();
        let service = service_with(source.clone());

        service.calculate(&xau_request(false)).unwrap();
        let other = RangeRequest::new("XAUUSD", 5, 20, 5, false).unwrap();
        let response = service.calculate(&other).unwrap();

        assert!(!response.cached);
        assert_eq!(source.fetch_count(), 2);
        let cached = service.get_cached("XAUUSD", Timeframe::M5, 20).unwrap();
        assert_eq!(cached.report.unwrap().lookback, 5);
    }

    #[test]
    fn never_computed_key_is_not_found() {
        let service = service_with(scenario_source());
        assert!(matches!(
            service.get_cached("XAUUSD", Timeframe::M5, 20),
            Err(RangeError::NotFound { .. })
        ));
    }

    #[test]
    fn clear_by_symbol_leaves_other_symbols() {
        let source = Arc::new(
            MockBarSource::new()
                .with_bars("XAUUSD+", scenario_bars())
                .with_bars("EURUSD+", flat_bars(epoch(2024, 7, 2, 9, 0), 300, 20, 1.07)),
        );
        let service = service_with(source);
        service.calculate(&xau_request(false)).unwrap();
        service
            .calculate(&RangeRequest::new("EURUSD", 5, 20, 4, false).unwrap())
            .unwrap();

        assert_eq!(service.cache_status().symbols, vec!["EURUSD", "XAUUSD"]);
        assert_eq!(service.clear_cache(Some("xau")), 1);

        assert!(service.get_cached("XAUUSD", Timeframe::M5, 20).is_err());
        assert!(service.get_cached("EURUSD", Timeframe::M5, 20).is_ok());

        assert_eq!(service.clear_cache(None), 1);
        assert_eq!(service.cache_status().total_entries, 0);
    }

    #[test]
    fn concurrent_requests_fetch_once_per_key() {
        let source = scenario_source();
        let service = service_with(source.clone());

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let response = service.calculate(&xau_request(false)).unwrap();
                    assert_eq!(response.report.unwrap().merged_ranges_count, 2);
                });
            }
        });

        assert_eq!(source.fetch_count(), 1);
    }
}

mod sweep_tests {
    use super::*;

    fn sweep_source() -> Arc<MockBarSource> {
        Arc::new(
            MockBarSource::new()
                .with_bars("XAUUSD+", scenario_bars())
                .with_bars("BTCUSD", flat_bars(epoch(2024, 7, 2, 9, 0), 300, 30, 57000.0))
                .with_error("NAS100", "market data offline"),
        )
    }

    #[test]
    fn sweep_covers_whole_registry_and_continues_past_failures() {
        let service = service_with(sweep_source());

        let counts = service.fetch_all_symbols_data(Timeframe::M5, 20);

        assert_eq!(counts.len(), 7);
        assert_eq!(counts["XAUUSD"], 20);
        assert_eq!(counts["BTCUSD"], 20);
        assert_eq!(counts["NAS100"], 0);
        assert_eq!(counts["EURUSD"], 0);
    }

    #[test]
    fn sweep_results_are_newest_first() {
        let service = service_with(sweep_source());
        service.fetch_all_symbols_data(Timeframe::M5, 20);

        let merged = service.get_merged_ranges(Some("XAUUSD+")).unwrap();
        let xau = &merged["XAUUSD"];
        assert_eq!(xau.len(), 2);
        assert_eq!(xau[0].start_idx, 15);
        assert_eq!(xau[1].start_idx, 0);

        let body = service.get_calculated_ranges(Some("xauusd")).unwrap();
        assert_eq!(body["XAUUSD"].len(), 9);
    }

    #[test]
    fn accessors_report_unknown_symbols() {
        let service = service_with(sweep_source());
        service.fetch_all_symbols_data(Timeframe::M5, 20);

        assert!(matches!(
            service.get_merged_ranges(Some("NAS100")),
            Err(RangeError::NotFound { .. })
        ));
        assert!(matches!(
            service.get_calculated_ranges(Some("DOGEUSD")),
            Err(RangeError::NotFound { .. })
        ));

        let all = service.get_merged_ranges(None).unwrap();
        let keys: Vec<&String> = all.keys().collect();
        assert_eq!(keys, vec!["BTCUSD", "XAUUSD"]);
    }

    #[test]
    fn failed_symbol_drops_previous_sweep_results() {
        let source = sweep_source();
        let service = service_with(source.clone());
        service.fetch_all_symbols_data(Timeframe::M5, 20);
        assert_eq!(service.get_merged_ranges(Some("XAUUSD")).unwrap()["XAUUSD"].len(), 2);

        source.set_offline(true);
        let counts = service.fetch_all_symbols_data(Timeframe::M5, 20);

        assert_eq!(counts["XAUUSD"], 0);
        assert!(matches!(
            service.get_merged_ranges(Some("XAUUSD")),
            Err(RangeError::NotFound { .. })
        ));
        assert!(matches!(
            service.get_calculated_ranges(Some("XAUUSD")),
            Err(RangeError::NotFound { .. })
        ));
        assert!(service.get_merged_ranges(None).unwrap().is_empty());
    }

    #[test]
    fn sweep_does_not_touch_the_cache() {
        let service = service_with(sweep_source());
        service.fetch_all_symbols_data(Timeframe::M5, 20);
        assert_eq!(service.cache_status().total_entries, 0);
    }

    #[test]
    fn sweep_exports_when_configured() {
        let dir = tempfile::TempDir::new().unwrap();
        let exporter = Arc::new(CsvRangeExporter::new(dir.path().to_path_buf()));
        let service = service_with(sweep_source()).with_exporter(exporter.clone());

        service.fetch_all_symbols_data(Timeframe::M5, 20);

        let merged_csv = std::fs::read_to_string(exporter.merged_path("XAUUSD")).unwrap();
        assert_eq!(merged_csv.lines().count(), 3);
        assert!(exporter.body_path("BTCUSD").exists());
        assert!(!exporter.body_path("NAS100").exists());
    }
}

mod validation_tests {
    use super::*;

    #[test]
    fn invalid_requests_are_rejected_before_fetching() {
        for (symbol, tf, bars, lookback) in [
            ("XAUUSD", 7, 20, 4),
            ("XAUUSD", 5, 0, 4),
            ("XAUUSD", 5, 10_001, 4),
            ("XAUUSD", 5, 20, 0),
            ("", 5, 20, 4),
        ] {
            assert!(matches!(
                RangeRequest::new(symbol, tf, bars, lookback, false),
                Err(RangeError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn lookback_longer_than_requested_bars_is_empty_success() {
        let service = service_with(scenario_source());
        let request = RangeRequest::new("XAUUSD", 5, 3, 4, false).unwrap();

        let response = service.fetch_and_calculate_ranges(&request);

        assert!(response.success);
        let report = response.report.unwrap();
        assert_eq!(report.bar_count, 3);
        assert_eq!(report.body_ranges_count, 0);
        assert_eq!(report.merged_ranges_count, 0);

        let scanned = service.quick_scan(&["XAUUSD".into()], 5, 10, 11);
        assert!(scanned[0].success);
        assert!(scanned[0].latest_range.is_none());
    }

    #[test]
    fn quick_scan_mixes_results_and_errors() {
        let source = scenario_source();
        let service = service_with(source.clone());

        let results = service.quick_scan(&["XAUUSD".into(), "NAS100".into(), "bad/sym".into()], 5, 20, 4);

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert_eq!(results[0].latest_range.as_ref().unwrap().start_idx, 15);
        assert!(!results[1].success);
        assert!(!results[2].success);
        // The malformed symbol never reached the source.
        assert_eq!(source.fetch_count(), 2);
    }
}
