use crate::engine::connection::Connection;
use crate::error::Result;
use std::cell::Cell;

/// Transaction isolation levels (`SQL_TXN_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn from_odbc(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::ReadUncommitted),
            2 => Some(Self::ReadCommitted),
            4 => Some(Self::RepeatableRead),
            8 => Some(Self::Serializable),
            _ => None,
        }
    }

    pub fn odbc_code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::ReadUncommitted => 1,
            Self::ReadCommitted => 2,
            Self::RepeatableRead => 4,
            Self::Serializable => 8,
        }
    }

    /// SQL clause for `SET TRANSACTION ISOLATION LEVEL <level>` (SQL-92).
    pub fn to_sql_keyword(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::ReadUncommitted => Some("READ UNCOMMITTED"),
            Self::ReadCommitted => Some("READ COMMITTED"),
            Self::RepeatableRead => Some("REPEATABLE READ"),
            Self::Serializable => Some("SERIALIZABLE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// Manual-commit scope over a connection.
///
/// Auto-commit is switched off for the lifetime of the guard and restored
/// afterwards; dropping an active transaction rolls it back.
pub struct Transaction<'c> {
    connection: &'c Connection,
    previous_auto_commit: bool,
    state: Cell<TransactionState>,
}

impl<'c> Transaction<'c> {
    pub fn begin(connection: &'c Connection, isolation: Option<IsolationLevel>) -> Result<Self> {
        let previous_auto_commit = connection.auto_commit()?;
        if let Some(level) = isolation {
            connection.set_transaction_isolation(level)?;
        }
        connection.set_auto_commit(false)?;
        Ok(Self {
            connection,
            previous_auto_commit,
            state: Cell::new(TransactionState::Active),
        })
    }

    pub fn commit(self) -> Result<()> {
        self.connection.commit()?;
        self.state.set(TransactionState::Committed);
        self.connection.set_auto_commit(self.previous_auto_commit)
    }

    pub fn rollback(self) -> Result<()> {
        self.connection.rollback()?;
        self.state.set(TransactionState::RolledBack);
        self.connection.set_auto_commit(self.previous_auto_commit)
    }

    /// Runs `f` inside a transaction, committing on success.
    pub fn execute<F, T>(
        connection: &'c Connection,
        isolation: Option<IsolationLevel>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let txn = Self::begin(connection, isolation)?;
        match f(connection) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback() {
                    log::debug!("Rollback after failure also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    pub fn is_active(&self) -> bool {
        self.state.get() == TransactionState::Active
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state.get() == TransactionState::Active {
            log::warn!("Transaction dropped without commit - auto-rollback");
            if let Err(e) = self.connection.rollback() {
                log::debug!("Auto-rollback failed: {}", e);
            }
            if let Err(e) = self.connection.set_auto_commit(self.previous_auto_commit) {
                log::debug!("Restoring auto-commit failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_odbc_codes() {
        for level in [
            IsolationLevel::None,
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ] {
            assert_eq!(IsolationLevel::from_odbc(level.odbc_code()), Some(level));
        }
        assert_eq!(IsolationLevel::from_odbc(3), None);
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_isolation_level_sql_keyword() {
        assert_eq!(
            IsolationLevel::RepeatableRead.to_sql_keyword(),
            Some("REPEATABLE READ")
        );
        assert_eq!(IsolationLevel::None.to_sql_keyword(), None);
    }
}
