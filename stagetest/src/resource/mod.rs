//! Resource protocol collaborator seam.
//!
//! The exercise stage talks to the provisioned database through these
//! traits. Drivers live outside this crate; tests use the in-memory server
//! from [`crate::testing`].

mod descriptor;

pub use descriptor::ConnectionDescriptor;

use crate::errors::ConnectionError;
use async_trait::async_trait;

/// Result of a statement execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Server-assigned identifier of the last inserted row.
    pub last_insert_id: i64,
    /// Rows changed by the statement.
    pub rows_affected: u64,
}

/// Opens connections to a provisioned resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlConnector: Send + Sync {
    /// Opens a connection.
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlConnection>, ConnectionError>;
}

/// An open connection, exclusively owned by one stage.
#[async_trait]
pub trait SqlConnection: Send {
    /// Checks that the server answers.
    async fn ping(&mut self) -> Result<(), ConnectionError>;

    /// Executes a statement with positional parameters.
    async fn execute(
        &mut self,
        statement: &str,
        params: &[serde_json::Value],
    ) -> Result<ExecResult, ConnectionError>;

    /// Releases the connection.
    async fn close(&mut self);
}
