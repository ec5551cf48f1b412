use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use odbc_rowset::testing::{column, MemoryDriver, Value};
use odbc_rowset::{
    ColumnBuffer, Connection, EngineConfig, ResultSetConcurrency, ResultSetType, Rowset, SqlType,
};

const QUERY: &str = "SELECT ID, NAME, PRICE FROM ITEMS";

fn items_driver(rows: i64) -> MemoryDriver {
    let driver = MemoryDriver::new();
    driver.create_table(
        "ITEMS",
        vec![
            column("ID", SqlType::INTEGER, 10, 0),
            column("NAME", SqlType::VARCHAR, 30, 0),
            column("PRICE", SqlType::DECIMAL, 12, 2),
        ],
    );
    driver.insert_rows(
        "ITEMS",
        (1..=rows)
            .map(|i| {
                vec![
                    Value::Int(i),
                    Value::text(format!("item_{}", i)),
                    Value::text(format!("{}.{:02}", i, i % 100)),
                ]
            })
            .collect(),
    );
    driver.script_query(QUERY, "ITEMS");
    driver
}

fn benchmark_numeric_coercion(c: &mut Criterion) {
    let mut buffer = ColumnBuffer::new(SqlType::DECIMAL, 12, 2, 1, true).unwrap();
    buffer.set_string("12345.67").unwrap();
    c.bench_function("decimal_get_double", |b| {
        b.iter(|| black_box(buffer.get_double().unwrap()));
    });

    let mut buffer = ColumnBuffer::new(SqlType::INTEGER, 10, 0, 1, true).unwrap();
    c.bench_function("integer_set_get_string", |b| {
        b.iter(|| {
            buffer.set_int(black_box(424_242)).unwrap();
            black_box(buffer.get_string().unwrap())
        });
    });
}

fn benchmark_rowset_fill(c: &mut Criterion) {
    c.bench_function("rowset_fill_100_rows", |b| {
        b.iter(|| {
            let mut rowset = Rowset::new(100, true);
            rowset.add_column(SqlType::INTEGER, 10, 0).unwrap();
            rowset.add_column(SqlType::VARCHAR, 30, 0).unwrap();
            for row in 0..100 {
                rowset.set_current_row(row);
                rowset.column_mut(1).set_int(row as i32).unwrap();
                rowset.column_mut(2).set_string("user").unwrap();
            }
            black_box(rowset.column_count())
        });
    });
}

fn benchmark_paged_fetch(c: &mut Criterion) {
    let driver = items_driver(1000);
    let conn = Connection::with_config(Box::new(driver.connect()), EngineConfig::default())
        .unwrap();
    let mut group = c.benchmark_group("scroll_1000_rows");
    for fetch_size in [1i64, 50, 500] {
        group.bench_with_input(
            BenchmarkId::from_parameter(fetch_size),
            &fetch_size,
            |b, &fetch_size| {
                b.iter(|| {
                    let mut stmt = conn
                        .create_statement_with(
                            ResultSetType::ScrollInsensitive,
                            ResultSetConcurrency::ReadOnly,
                        )
                        .unwrap();
                    stmt.set_fetch_size(fetch_size).unwrap();
                    let mut rs = stmt.execute_query(QUERY).unwrap();
                    let mut total = 0i64;
                    while rs.next().unwrap() {
                        total += rs.get_long(1).unwrap();
                    }
                    black_box(total)
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_numeric_coercion,
    benchmark_rowset_fill,
    benchmark_paged_fetch
);
criterion_main!(benches);
