//! Environment handling shared by the integration tests.

use odbc_rowset::testing::load_dotenv;

/// `ODBC_TEST_DSN` from the environment or `.env`; `None` when unset.
pub fn get_test_dsn() -> Option<String> {
    load_dotenv();
    std::env::var("ODBC_TEST_DSN")
        .ok()
        .filter(|s| !s.is_empty())
}

/// Whether tests against a real data source can run.
pub fn should_run_e2e_tests() -> bool {
    get_test_dsn().is_some()
}

/// Routes `log` output to the test harness; `RUST_LOG` picks the level.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
