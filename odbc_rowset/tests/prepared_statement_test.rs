mod helpers;

use helpers::{connect, init_logging, orders_driver};
use odbc_rowset::testing::Value;
use odbc_rowset::{ChunkStream, Date};

const INSERT_ORDER: &str = "INSERT INTO ORDERS VALUES (?, ?, ?, ?, ?)";
const ORDERS_AFTER: &str = "SELECT ID, CUSTOMER, AMOUNT, PLACED, NOTES FROM ORDERS WHERE ID > ?";

#[test]
fn test_stream_parameter_is_sent_in_chunks() {
    init_logging();
    let driver = orders_driver(0);
    driver.script_insert(INSERT_ORDER, "ORDERS");
    let conn = connect(&driver);
    let mut ps = conn.prepare_statement(INSERT_ORDER).unwrap();
    assert_eq!(ps.param_count(), 5);

    ps.set_int(1, 1).unwrap();
    ps.set_string(2, "bulk buyer").unwrap();
    ps.set_double(3, 1250.0).unwrap();
    ps.set_date(4, &Date::new(2024, 3, 1).unwrap()).unwrap();
    ps.set_ascii_stream(5, ChunkStream::from_bytes("y".repeat(12_000)), 10_000)
        .unwrap();
    assert!(!ps.execute().unwrap());
    assert_eq!(ps.update_count().unwrap(), 1);

    assert_eq!(driver.put_chunks(), vec![4096, 4096, 1808]);
    let rows = driver.rows("ORDERS");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values[0], Value::Int(1));
    assert_eq!(rows[0].values[1], Value::text("bulk buyer"));
    assert_eq!(rows[0].values[2], Value::Double(1250.0));
    assert_eq!(rows[0].values[3], Value::Date(Date::new(2024, 3, 1).unwrap()));
    assert_eq!(rows[0].values[4], Value::text("y".repeat(10_000)));
}

#[test]
fn test_reexecute_with_new_values() {
    let driver = orders_driver(0);
    driver.script_insert(INSERT_ORDER, "ORDERS");
    let conn = connect(&driver);
    let mut ps = conn.prepare_statement(INSERT_ORDER).unwrap();

    for id in 1..=3 {
        ps.set_int(1, id).unwrap();
        ps.set_string(2, &format!("customer {}", id)).unwrap();
        ps.set_double(3, id as f64).unwrap();
        ps.set_date(4, &Date::new(2024, 4, id as u32).unwrap()).unwrap();
        ps.set_ascii_stream(5, ChunkStream::from_bytes(format!("note {}", id)), 6)
            .unwrap();
        assert_eq!(ps.execute_update().unwrap(), 1);
    }
    ps.clear_parameters().unwrap();
    ps.set_int(1, 4).unwrap();
    assert_eq!(ps.execute_update().unwrap(), 1);

    let rows = driver.rows("ORDERS");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[2].values[1], Value::text("customer 3"));
    assert_eq!(rows[2].values[4], Value::text("note 3"));
    assert_eq!(rows[3].values[0], Value::Int(4));
    assert_eq!(rows[3].values[1], Value::Null);
    assert_eq!(rows[3].values[3], Value::Null);
}

#[test]
fn test_prepared_query_opens_result_set() {
    let driver = orders_driver(3);
    driver.script_query(ORDERS_AFTER, "ORDERS");
    let conn = connect(&driver);
    let mut ps = conn.prepare_statement(ORDERS_AFTER).unwrap();
    ps.set_int(1, 0).unwrap();

    let mut rs = ps.execute_query().unwrap();
    let mut customers = Vec::new();
    while rs.next().unwrap() {
        customers.push(rs.get_string("customer").unwrap());
    }
    assert_eq!(customers, vec!["customer 1", "customer 2", "customer 3"]);

    let err = ps.execute().unwrap_err();
    assert_eq!(err.sqlstate_str(), "24000");

    drop(rs);
    assert!(ps.execute().unwrap());
    let mut rs = ps.result_set().unwrap().expect("query has rows");
    assert!(rs.next().unwrap());
    assert_eq!(rs.get_long("id").unwrap(), 1);
}

#[test]
fn test_unset_parameters_are_sent_as_null() {
    let driver = orders_driver(0);
    driver.script_insert(INSERT_ORDER, "ORDERS");
    let conn = connect(&driver);
    let mut ps = conn.prepare_statement(INSERT_ORDER).unwrap();
    assert_eq!(ps.set_int(7, 1).unwrap_err().sqlstate_str(), "S1093");
    assert_eq!(ps.execute_update().unwrap(), 1);
    assert!(driver.rows("ORDERS")[0].values.iter().all(Value::is_null));
}
