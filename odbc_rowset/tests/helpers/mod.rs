pub mod env;
pub mod fixtures;

#[allow(unused_imports)]
pub use env::{get_test_dsn, init_logging, should_run_e2e_tests};
#[allow(unused_imports)]
pub use fixtures::{connect, orders_driver, ORDERS_QUERY};
