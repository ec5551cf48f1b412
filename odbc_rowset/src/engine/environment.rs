use crate::error::{OdbcError, Result};
use odbc_api::Environment;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Data source name registered with the driver manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub name: String,
    pub driver: String,
}

/// Driver installed with the driver manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledDriver {
    pub description: String,
    pub attributes: HashMap<String, String>,
}

struct ManagerState {
    env: Option<Environment>,
    login_timeout: i32,
}

lazy_static::lazy_static! {
    static ref MANAGER: Mutex<ManagerState> = Mutex::new(ManagerState {
        env: None,
        login_timeout: -1,
    });
}

fn state() -> Result<MutexGuard<'static, ManagerState>> {
    MANAGER
        .lock()
        .map_err(|_| OdbcError::InternalError("Failed to lock driver manager mutex".to_string()))
}

/// Process-wide ODBC environment.
///
/// The environment exists between `initialize` and `shutdown`; listings made
/// outside that window fail with `EnvironmentNotInitialized`.
pub struct DriverManager;

impl DriverManager {
    /// Allocates the environment. Does nothing when it already exists.
    pub fn initialize() -> Result<()> {
        let mut state = state()?;
        if state.env.is_some() {
            return Ok(());
        }
        state.env = Some(Environment::new()?);
        log::info!("ODBC environment initialized");
        Ok(())
    }

    /// Frees the environment. Later listings fail until `initialize` runs
    /// again.
    pub fn shutdown() -> Result<()> {
        let mut state = state()?;
        if state.env.take().is_some() {
            log::info!("ODBC environment released");
        }
        Ok(())
    }

    pub fn is_initialized() -> bool {
        state().map(|s| s.env.is_some()).unwrap_or(false)
    }

    /// Seconds to wait for a login; -1 when not set.
    pub fn login_timeout() -> i32 {
        state().map(|s| s.login_timeout).unwrap_or(-1)
    }

    /// Negative values clear the timeout.
    pub fn set_login_timeout(seconds: i32) -> Result<()> {
        state()?.login_timeout = seconds.max(-1);
        Ok(())
    }

    /// Login timeout for connection options; `None` when not set.
    pub fn login_timeout_secs() -> Option<u32> {
        u32::try_from(Self::login_timeout()).ok()
    }

    pub fn data_sources() -> Result<Vec<DataSource>> {
        let state = state()?;
        let env = state.env.as_ref().ok_or(OdbcError::EnvironmentNotInitialized)?;
        let sources = env
            .data_sources()?
            .into_iter()
            .map(|info| DataSource {
                name: info.server_name,
                driver: info.driver,
            })
            .collect();
        Ok(sources)
    }

    pub fn drivers() -> Result<Vec<InstalledDriver>> {
        let state = state()?;
        let env = state.env.as_ref().ok_or(OdbcError::EnvironmentNotInitialized)?;
        let drivers = env
            .drivers()?
            .into_iter()
            .map(|info| InstalledDriver {
                description: info.description,
                attributes: info.attributes,
            })
            .collect();
        Ok(drivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_listings_need_environment() {
        DriverManager::shutdown().unwrap();
        assert!(!DriverManager::is_initialized());
        let err = DriverManager::data_sources().unwrap_err();
        assert!(matches!(err, OdbcError::EnvironmentNotInitialized));
        assert_eq!(err.sqlstate_str(), "HY010");
        assert!(DriverManager::drivers().is_err());
    }

    #[test]
    #[serial]
    fn test_login_timeout() {
        DriverManager::set_login_timeout(-1).unwrap();
        assert_eq!(DriverManager::login_timeout(), -1);
        assert_eq!(DriverManager::login_timeout_secs(), None);

        DriverManager::set_login_timeout(15).unwrap();
        assert_eq!(DriverManager::login_timeout(), 15);
        assert_eq!(DriverManager::login_timeout_secs(), Some(15));

        DriverManager::set_login_timeout(-20).unwrap();
        assert_eq!(DriverManager::login_timeout(), -1);
    }
}
