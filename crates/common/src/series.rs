use crate::types::{PricePoint, RawSample};
use chrono::{DateTime, Datelike};
use std::collections::BTreeMap;

/// 원시 샘플을 UTC 달력 월 단위로 평균 낸다
///
/// One entry per distinct (year, month); price is the mean of that month's
/// samples rounded to the nearest dollar. Output is sorted ascending by month.
/// Samples with an unrepresentable timestamp or a non-finite/negative price
/// are skipped.
pub fn bucket_monthly(samples: &[RawSample]) -> Vec<PricePoint> {
    let mut buckets: BTreeMap<(i32, u32), (f64, u32)> = BTreeMap::new();

    for sample in samples {
        if !sample.price.is_finite() || sample.price < 0.0 {
            continue;
        }
        let Some(at) = DateTime::from_timestamp_millis(sample.timestamp_ms) else {
            continue;
        };

        let bucket = buckets.entry((at.year(), at.month())).or_insert((0.0, 0));
        bucket.0 += sample.price;
        bucket.1 += 1;
    }

    buckets
        .into_iter()
        .map(|((year, month), (sum, count))| {
            let mean = sum / count as f64;
            PricePoint::new(format!("{:04}-{:02}", year, month), mean.round() as u64)
        })
        .collect()
}

/// 시리즈의 가장 최근 월 가격
pub fn latest_price(series: &[PricePoint]) -> Option<u64> {
    series.iter().max_by(|a, b| a.month.cmp(&b.month)).map(|p| p.price)
}
