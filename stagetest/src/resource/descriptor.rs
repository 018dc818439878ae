//! Connection descriptors.

use std::fmt;

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Database (schema) name.
    pub database: String,
}

impl ConnectionDescriptor {
    /// Default MySQL port.
    pub const MYSQL_PORT: u16 = 3306;

    /// Creates a descriptor for a MySQL endpoint on the default port.
    #[must_use]
    pub fn mysql(
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            host: host.into(),
            port: Self::MYSQL_PORT,
            database: database.into(),
        }
    }

    /// `host:port`, safe to log.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Go-driver style DSN: `user:password@tcp(host:port)/database`.
    ///
    /// Contains the password; never log it.
    #[must_use]
    pub fn dsn(&self) -> String {
        format!(
            "{}:{}@tcp({})/{}",
            self.user,
            self.password,
            self.target(),
            self.database
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}
