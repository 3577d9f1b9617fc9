use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sqleval_db::{Cell, ResultSet};

fn result_set(rows: usize, reversed: bool) -> ResultSet {
    let mut data: Vec<Vec<Cell>> = (0..rows)
        .map(|i| {
            vec![
                Cell::Integer(i as i64),
                Cell::real(i as f64 * 0.37),
                Cell::Text(format!("name-{}", i % 97)),
            ]
        })
        .collect();
    if reversed {
        data.reverse();
    }
    ResultSet::new(3, data)
}

fn bench_compare(c: &mut Criterion) {
    let gold = result_set(10_000, false);
    let predicted = result_set(10_000, true);

    c.bench_function("multiset 10k rows", |b| {
        b.iter(|| black_box(predicted.same_rows(black_box(&gold))))
    });
    c.bench_function("sequence 10k rows", |b| {
        b.iter(|| black_box(predicted.same_sequence(black_box(&gold))))
    });
}

criterion_group!(benches, bench_compare);
criterion_main!(benches);
