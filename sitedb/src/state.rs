use crate::error::SiteDbError;

/// Lifecycle of a wrapper's single logical connection.
///
/// ```text
/// Disconnected --connect()--> Connected --begin()--> InTransaction
///      ^                          |  ^                     |
///      +------disconnect()--------+  +--commit()|rollback()+
/// ```
///
/// `disconnect()` from `InTransaction` is refused. There is no terminal
/// state; a wrapper can be connected again after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    InTransaction,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }

    pub fn in_transaction(self) -> bool {
        matches!(self, ConnectionState::InTransaction)
    }

    /// Whether `connect()` has real work to do.
    pub(crate) fn needs_connect(self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }

    /// Guard for issuing a statement.
    pub(crate) fn require_connected(self) -> Result<(), SiteDbError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SiteDbError::NotConnected)
        }
    }

    /// Whether `disconnect()` has real work to do; `Err` when a transaction is open.
    pub(crate) fn needs_disconnect(self) -> Result<bool, SiteDbError> {
        match self {
            ConnectionState::Disconnected => Ok(false),
            ConnectionState::Connected => Ok(true),
            ConnectionState::InTransaction => Err(SiteDbError::TransactionInProgress),
        }
    }

    /// State after a successful `BEGIN`.
    pub(crate) fn begin(self) -> Result<ConnectionState, SiteDbError> {
        match self {
            ConnectionState::Connected => Ok(ConnectionState::InTransaction),
            ConnectionState::Disconnected => Err(SiteDbError::NotConnected),
            ConnectionState::InTransaction => Err(SiteDbError::TransactionError(
                "a transaction is already open".to_string(),
            )),
        }
    }

    /// State after `COMMIT` or `ROLLBACK`.
    pub(crate) fn finish(self) -> Result<ConnectionState, SiteDbError> {
        match self {
            ConnectionState::InTransaction => Ok(ConnectionState::Connected),
            _ => Err(SiteDbError::TransactionError(
                "no transaction is open".to_string(),
            )),
        }
    }
}
