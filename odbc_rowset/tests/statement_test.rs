mod helpers;

use helpers::{connect, init_logging, orders_driver, ORDERS_QUERY};
use odbc_rowset::testing::Outcome;
use odbc_rowset::{Diagnostic, OdbcError};

const BATCH: &str = "UPDATE ORDERS SET AMOUNT = 0 WHERE ID = 1; SELECT * FROM ORDERS";
const DELETE: &str = "DELETE FROM ORDERS WHERE ID > 100";

#[test]
fn test_batch_reports_count_then_rows() {
    init_logging();
    let driver = orders_driver(3);
    driver.script_results(
        BATCH,
        vec![Outcome::Count(2), Outcome::Rows("ORDERS".to_string())],
    );
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();

    assert!(!stmt.execute(BATCH).unwrap());
    assert_eq!(stmt.update_count().unwrap(), 2);
    assert!(stmt.result_set().unwrap().is_none());

    assert!(stmt.more_results().unwrap());
    let mut rs = stmt.result_set().unwrap().expect("second result has rows");
    let mut ids = Vec::new();
    while rs.next().unwrap() {
        ids.push(rs.get_int("ID").unwrap());
    }
    assert_eq!(ids, vec![1, 2, 3]);

    let err = stmt.more_results().unwrap_err();
    assert!(matches!(err, OdbcError::OpenResultSetExists));
    assert_eq!(err.sqlstate_str(), "24000");
    assert!(stmt.result_set().unwrap().is_none());

    drop(rs);
    assert!(!stmt.more_results().unwrap());
    assert_eq!(stmt.update_count().unwrap(), -1);
}

#[test]
fn test_execute_while_result_set_open_fails() {
    let driver = orders_driver(2);
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    let mut rs = stmt.execute_query(ORDERS_QUERY).unwrap();
    assert!(rs.next().unwrap());

    let err = stmt.execute(ORDERS_QUERY).unwrap_err();
    assert_eq!(err.sqlstate_str(), "24000");
    assert_eq!(
        err.to_string(),
        "Cannot re-execute; statement has an open result set"
    );

    rs.close().unwrap();
    let mut again = stmt.execute_query(ORDERS_QUERY).unwrap();
    assert!(again.next().unwrap());
    assert_eq!(again.get_int(1).unwrap(), 1);
}

#[test]
fn test_update_with_no_matching_rows() {
    let driver = orders_driver(2);
    driver.script_update(DELETE, 0);
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    assert_eq!(stmt.execute_update(DELETE).unwrap(), -1);

    let err = stmt.execute_query(DELETE).unwrap_err();
    assert!(matches!(err, OdbcError::NoResultSet));
    assert_eq!(err.sqlstate_str(), "24000");
}

#[test]
fn test_driver_errors_carry_state_and_sql() {
    let driver = orders_driver(1);
    driver.script_error(
        "DROP TABLE ORDERS",
        Diagnostic::new("42000", 1205, "Permission denied"),
    );
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    let err = stmt.execute("DROP TABLE ORDERS").unwrap_err();
    assert_eq!(err.sqlstate_str(), "42000");
    assert_eq!(
        err.to_string(),
        "Error executing \"DROP TABLE ORDERS\": Permission denied"
    );

    let err = stmt.execute("SELECT nothing").unwrap_err();
    assert_eq!(err.sqlstate_str(), "42000");
}

#[test]
fn test_warnings_are_collected_per_statement() {
    let driver = orders_driver(1);
    driver.script_warning(
        ORDERS_QUERY,
        Diagnostic::new("01004", 0, "String data, right truncated"),
    );
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    let rs = stmt.execute_query(ORDERS_QUERY).unwrap();

    let warnings = stmt.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].sqlstate_str(), "01004");
    assert!(stmt.take_warnings().is_empty());
    assert!(conn.take_warnings().is_empty());
    drop(rs);
}

#[test]
fn test_result_column_warnings_are_kept() {
    let driver = orders_driver(1);
    driver.warn_next(
        "num_result_cols",
        Diagnostic::new("01S02", 0, "Option value changed"),
    );
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    assert!(stmt.execute(ORDERS_QUERY).unwrap());

    let warnings = stmt.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].sqlstate_str(), "01S02");
    assert_eq!(warnings[0].message, "Option value changed");
}

#[test]
fn test_closed_statement_leaves_the_registry() {
    let driver = orders_driver(1);
    let conn = connect(&driver);
    let mut stmt = conn.create_statement().unwrap();
    stmt.execute(ORDERS_QUERY).unwrap();
    assert_eq!(conn.open_statement_count(), 1);
    assert_eq!(conn.open_statements(), vec![ORDERS_QUERY.to_string()]);

    stmt.close().unwrap();
    assert!(stmt.is_closed());
    assert_eq!(conn.open_statement_count(), 0);
    assert!(stmt.execute(ORDERS_QUERY).is_err());
}

#[test]
fn test_cancel_is_forwarded_to_the_driver() {
    let driver = orders_driver(1);
    let conn = connect(&driver);
    let stmt = conn.create_statement().unwrap();
    let canceller = stmt.canceller();
    let sent = std::thread::spawn(move || canceller.cancel().is_ok())
        .join()
        .unwrap();
    assert!(sent);
    assert_eq!(driver.cancel_count(), 1);
}
