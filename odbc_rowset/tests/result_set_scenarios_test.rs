mod helpers;

use helpers::{connect, init_logging, orders_driver, ORDERS_QUERY};
use odbc_rowset::testing::{column, MemoryDriver, Value};
use odbc_rowset::{
    ChunkStream, Connection, Date, OdbcError, ResultSet, ResultSetConcurrency, ResultSetType,
    SqlType,
};

const ITEMS_QUERY: &str = "SELECT ID, NAME FROM ITEMS";

fn items_driver(rows: i64) -> MemoryDriver {
    let driver = MemoryDriver::new();
    driver.create_table(
        "ITEMS",
        vec![
            column("ID", SqlType::INTEGER, 10, 0),
            column("NAME", SqlType::VARCHAR, 20, 0),
        ],
    );
    driver.insert_rows(
        "ITEMS",
        (1..=rows)
            .map(|i| vec![Value::Int(i), Value::text(format!("item {}", i))])
            .collect(),
    );
    driver.script_query(ITEMS_QUERY, "ITEMS");
    driver
}

fn scrollable_orders(conn: &Connection, fetch_size: i64) -> ResultSet {
    let mut stmt = conn
        .create_statement_with(ResultSetType::ScrollInsensitive, ResultSetConcurrency::Updatable)
        .unwrap();
    stmt.set_fetch_size(fetch_size).unwrap();
    stmt.execute_query(ORDERS_QUERY).unwrap()
}

#[test]
fn test_forward_only_pages_through_rowsets() {
    init_logging();
    let driver = items_driver(3);
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    stmt.set_fetch_size(2).unwrap();
    let mut rs = stmt.execute_query(ITEMS_QUERY).unwrap();
    assert_eq!(rs.fetch_size(), 2);

    assert!(rs.next().unwrap());
    assert_eq!(driver.call_count("fetch"), 1);
    assert_eq!(rs.get_string("name").unwrap(), "item 1");

    assert!(rs.next().unwrap());
    assert_eq!(driver.call_count("fetch"), 1);
    assert_eq!(rs.get_int(1).unwrap(), 2);

    assert!(rs.next().unwrap());
    assert_eq!(driver.call_count("fetch"), 2);
    assert_eq!(rs.get_int(1).unwrap(), 3);
    assert_eq!(rs.get_row(), 3);

    assert!(!rs.next().unwrap());
    assert_eq!(driver.call_count("fetch"), 3);
    assert!(rs.is_after_last());
    assert!(!rs.next().unwrap());
    assert_eq!(driver.call_count("fetch"), 3);
}

#[test]
fn test_scrolling_back_mirrors_scrolling_forward() {
    init_logging();
    let driver = orders_driver(7);
    let conn = connect(&driver);
    let mut rs = scrollable_orders(&conn, 3);

    let mut forward = Vec::new();
    while rs.next().unwrap() {
        forward.push(rs.get_row());
        assert_eq!(rs.get_long("id").unwrap(), rs.get_row());
    }
    assert!(rs.is_after_last());

    let mut backward = Vec::new();
    while rs.previous().unwrap() {
        backward.push(rs.get_row());
        assert_eq!(rs.get_long("id").unwrap(), rs.get_row());
    }
    assert!(rs.is_before_first());

    assert_eq!(forward, vec![1, 2, 3, 4, 5, 6, 7]);
    backward.reverse();
    assert_eq!(backward, forward);
}

#[test]
fn test_long_values_span_several_chunks() {
    init_logging();
    let driver = orders_driver(5);
    let conn = connect(&driver);
    let mut rs = scrollable_orders(&conn, 2);

    assert!(rs.absolute(5).unwrap());
    let notes = rs.get_string("NOTES").unwrap();
    assert_eq!(notes.len(), 5000);
    assert!(notes.bytes().all(|b| b == b'x'));
    assert!(driver.call_count("get_data") >= 2);

    assert_eq!(rs.get_double("amount").unwrap(), 52.5);
    assert_eq!(rs.get_date("placed").unwrap().to_string(), "2024-01-06");
    assert_eq!(rs.get_string(4).unwrap(), "2024-01-06");

    assert!(rs.absolute(3).unwrap());
    let stream = rs.get_ascii_stream(5).unwrap().expect("notes are not null");
    let bytes = stream.read_to_vec().unwrap();
    assert_eq!(bytes.len(), 3000);

    assert!(rs.absolute(4).unwrap());
    assert!(rs.get_ascii_stream(5).unwrap().is_none());
    assert!(rs.was_null());
}

#[test]
fn test_scalar_getters_reject_long_values() {
    let driver = orders_driver(3);
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    let mut rs = stmt.execute_query(ORDERS_QUERY).unwrap();

    assert!(rs.next().unwrap());
    let err = rs.get_int("NOTES").unwrap_err();
    assert!(matches!(err, OdbcError::UnsupportedCoercion { .. }));
    assert!(!rs.was_null());
    assert_eq!(rs.get_string("NOTES").unwrap().len(), 1000);
    let err = rs.get_long("NOTES").unwrap_err();
    assert!(matches!(err, OdbcError::UnsupportedCoercion { .. }));

    assert!(rs.next().unwrap());
    assert_eq!(rs.get_int("NOTES").unwrap(), 0);
    assert!(rs.was_null());

    assert!(rs.next().unwrap());
    assert!(rs.get_date("NOTES").is_err());
    assert!(!rs.was_null());
    assert_eq!(rs.get_string("NOTES").unwrap().len(), 3000);
}

#[test]
fn test_column_lookup_ignores_case() {
    let driver = orders_driver(1);
    let conn = connect(&driver);
    let mut rs = scrollable_orders(&conn, 1);
    assert!(rs.next().unwrap());

    assert_eq!(rs.find_column("customer").unwrap(), 2);
    assert_eq!(rs.find_column("Amount").unwrap(), 3);
    assert_eq!(rs.get_string("CUSTOMER").unwrap(), "customer 1");
    assert_eq!(rs.get_string("Customer").unwrap(), "customer 1");
    assert_eq!(rs.metadata().column_name(2).unwrap(), "Customer");

    let err = rs.get_string("region").unwrap_err();
    assert_eq!(err.sqlstate_str(), "42S22");
}

#[test]
fn test_insert_row_returns_to_the_previous_row() {
    init_logging();
    let driver = orders_driver(5);
    let conn = connect(&driver);
    let mut rs = scrollable_orders(&conn, 2);

    assert!(rs.absolute(3).unwrap());
    assert_eq!(rs.get_row(), 3);

    rs.move_to_insert_row().unwrap();
    rs.update_int("id", 6).unwrap();
    rs.update_string("customer", "walk-in").unwrap();
    rs.update_double("amount", 99.5).unwrap();
    rs.update_date("placed", &Date::new(2024, 2, 29).unwrap())
        .unwrap();
    rs.update_ascii_stream(
        "notes",
        ChunkStream::from_bytes("delivered to the side door"),
        26,
    )
    .unwrap();
    rs.insert_row().unwrap();
    rs.move_to_current_row().unwrap();

    assert_eq!(rs.get_row(), 3);
    assert_eq!(rs.get_int(1).unwrap(), 3);
    assert_eq!(rs.get_string(2).unwrap(), "customer 3");

    let rows = driver.rows("ORDERS");
    assert_eq!(rows.len(), 6);
    let added = &rows[5];
    assert_eq!(added.values[0], Value::Int(6));
    assert_eq!(added.values[1], Value::text("walk-in"));
    assert_eq!(added.values[2], Value::Double(99.5));
    assert_eq!(added.values[3], Value::Date(Date::new(2024, 2, 29).unwrap()));
    assert_eq!(added.values[4], Value::text("delivered to the side door"));

    assert!(rs.next().unwrap());
    assert_eq!(rs.get_row(), 4);
}

#[test]
fn test_updates_are_visible_after_refetch() {
    let driver = orders_driver(3);
    let conn = connect(&driver);
    let mut rs = scrollable_orders(&conn, 2);

    assert!(rs.absolute(2).unwrap());
    rs.update_string("customer", "renamed").unwrap();
    rs.update_null("notes").unwrap();
    rs.update_row().unwrap();
    assert!(rs.row_updated().unwrap());

    assert!(rs.first().unwrap());
    assert!(rs.next().unwrap());
    assert_eq!(rs.get_string("customer").unwrap(), "renamed");
    assert_eq!(rs.get_string("notes").unwrap(), "");
    assert!(rs.was_null());
}
