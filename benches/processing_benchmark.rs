use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hrrr_fetcher::models::{JoinKey, ObservationRecord, ResultTable, TableRow, Variable};
use hrrr_fetcher::processors::{GapCoalescer, GapDetector, ResultMerger, TimeColumn};
use hrrr_fetcher::writers::normalize_records;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 12, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

// One table per variable group, covering `hours` hours for `points` points
fn create_tables(points: u32, hours: i64) -> Vec<ResultTable> {
    let all = Variable::ALL;
    let groups: [&[Variable]; 3] = [&all[..8], &all[8..10], &all[10..]];

    groups
        .iter()
        .enumerate()
        .map(|(i, variables)| {
            let columns: Vec<String> = variables.iter().map(|v| v.column_name().to_string()).collect();
            let mut table = ResultTable::new(format!("pattern-{}", i), columns.clone());
            for hour in 0..hours {
                let time = t0() + Duration::hours(hour);
                for point_id in 1..=points {
                    let key = JoinKey {
                        valid_time: time + Duration::hours(1),
                        time,
                        step_hours: 1,
                        point_id,
                    };
                    let mut row = TableRow::new(key);
                    for column in &columns {
                        row = row.with_value(column, Some(hour as f64 * 0.1));
                    }
                    table.push(row);
                }
            }
            table
        })
        .collect()
}

fn create_records(points: u32, hours: i64) -> Vec<ObservationRecord> {
    let mut records = Vec::new();
    for hour in 0..hours {
        // Every seventh hour is missing
        if hour % 7 == 3 {
            continue;
        }
        for point_id in 1..=points {
            let mut record = ObservationRecord::new(point_id, t0() + Duration::hours(hour), 1);
            for variable in Variable::ALL {
                record.set(variable, Some(1.0));
            }
            records.push(record);
        }
    }
    records
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_merge");

    for points in [10, 50, 200].iter() {
        let tables = create_tables(*points, 6);
        group.bench_with_input(BenchmarkId::new("merge", points), &tables, |b, tables| {
            b.iter(|| {
                let merger = ResultMerger::new(20);
                black_box(merger.merge(tables.clone()).unwrap())
            });
        });
    }

    group.finish();
}

fn benchmark_gap_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("gap_scan");
    let detector = GapDetector::new(vec![6, 7, 8, 9]);
    let coalescer = GapCoalescer::new(Duration::hours(6));

    for hours in [24 * 7, 24 * 30, 24 * 90].iter() {
        let records = create_records(20, *hours);
        let end = t0() + Duration::hours(*hours - 1);

        group.bench_with_input(BenchmarkId::new("scan_and_coalesce", hours), &records, |b, records| {
            b.iter(|| {
                let missing = detector.scan(records, t0(), end, TimeColumn::Time).missing();
                black_box(coalescer.coalesce(&missing))
            });
        });
    }

    group.finish();
}

fn benchmark_normalize(c: &mut Criterion) {
    let records = create_records(50, 24 * 30);
    let mut doubled = records.clone();
    doubled.extend(records);

    c.bench_function("normalize_records", |b| {
        b.iter(|| black_box(normalize_records(doubled.clone())))
    });
}

criterion_group!(benches, benchmark_merge, benchmark_gap_scan, benchmark_normalize);
criterion_main!(benches);
