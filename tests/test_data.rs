use std::io::Write;

use chrono::NaiveDate;
use rstest::rstest;
use tempfile::NamedTempFile;

use attribution_engine::data::{NormalizationParams, SeriesLoader};

#[test]
fn csv_rows_are_grouped_by_tenant_and_metric() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "tenant_id,metric,period,value").unwrap();
    // Rows arrive out of period order on purpose
    writeln!(file, "tenant-1,spend,2023-02-01,12.0").unwrap();
    writeln!(file, "tenant-1,spend,2023-01-01,10.0").unwrap();
    writeln!(file, "tenant-1,revenue,2023-01-01,100.0").unwrap();
    writeln!(file, "tenant-2,spend,2023-01-01,7.0").unwrap();
    file.flush().unwrap();

    let series = SeriesLoader::from_csv(file.path()).unwrap();
    assert_eq!(series.len(), 3);

    let spend = series
        .iter()
        .find(|s| s.tenant_id == "tenant-1" && s.metric == "spend")
        .unwrap();
    assert_eq!(spend.len(), 2);
    assert_eq!(
        spend.periods(),
        vec![
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        ]
    );
    assert_eq!(spend.values(), vec![10.0, 12.0]);
}

#[test]
fn a_malformed_csv_row_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "tenant_id,metric,period,value").unwrap();
    writeln!(file, "tenant-1,spend,not-a-date,10.0").unwrap();
    file.flush().unwrap();

    assert!(SeriesLoader::from_csv(file.path()).is_err());
}

#[rstest]
#[case(NormalizationParams::Standard { mean: 12.5, std_dev: 3.2 })]
#[case(NormalizationParams::MinMax { min: 4.0, max: 19.0 })]
fn normalization_inverts_exactly(#[case] params: NormalizationParams) {
    for raw in [4.0, 7.5, 12.5, 19.0] {
        let normalized = params.apply(raw);
        assert!((params.invert(normalized) - raw).abs() < 1e-9);
    }
}

#[rstest]
#[case(NormalizationParams::Standard { mean: 10.0, std_dev: 0.0 })]
#[case(NormalizationParams::MinMax { min: 10.0, max: 10.0 })]
fn a_constant_column_normalizes_to_zero(#[case] params: NormalizationParams) {
    assert_eq!(params.apply(10.0), 0.0);
}
