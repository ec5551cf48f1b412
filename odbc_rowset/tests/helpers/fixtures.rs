//! In-memory data sources for scenario tests.

use odbc_rowset::engine::{Connection, EngineConfig};
use odbc_rowset::testing::{column, MemoryDriver, Value};
use odbc_rowset::{Date, SqlType};

pub const ORDERS_QUERY: &str = "SELECT ID, CUSTOMER, AMOUNT, PLACED, NOTES FROM ORDERS";

/// Driver with an ORDERS table of `rows` rows and `ORDERS_QUERY` scripted.
/// Even rows have NULL notes.
pub fn orders_driver(rows: i64) -> MemoryDriver {
    let driver = MemoryDriver::new();
    driver.create_table(
        "ORDERS",
        vec![
            column("ID", SqlType::INTEGER, 10, 0),
            column("Customer", SqlType::VARCHAR, 30, 0),
            column("AMOUNT", SqlType::DOUBLE, 15, 0),
            column("PLACED", SqlType::DATE, 10, 0),
            column("NOTES", SqlType::LONGVARCHAR, 0, 0),
        ],
    );
    driver.insert_rows(
        "ORDERS",
        (1..=rows)
            .map(|i| {
                vec![
                    Value::Int(i),
                    Value::text(format!("customer {}", i)),
                    Value::Double(i as f64 * 10.5),
                    Value::Date(Date::new(2024, 1, i as u32 % 28 + 1).unwrap()),
                    if i % 2 == 0 {
                        Value::Null
                    } else {
                        Value::text("x".repeat(i as usize * 1000))
                    },
                ]
            })
            .collect(),
    );
    driver.script_query(ORDERS_QUERY, "ORDERS");
    driver
}

pub fn connect(driver: &MemoryDriver) -> Connection {
    Connection::with_config(Box::new(driver.connect()), EngineConfig::default())
        .expect("connect to memory driver")
}
