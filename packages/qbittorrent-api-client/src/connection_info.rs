use std::fmt;

use url::Url;

/// Web UI credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The Web UI URL, for example `http://127.0.0.1:8080/`.
    pub origin: Url,

    /// `None` when the Web UI does not require authentication, for example
    /// when it bypasses authentication for clients on localhost.
    pub credentials: Option<Credentials>,
}

impl ConnectionInfo {
    #[must_use]
    pub fn authenticated(origin: Url, username: &str, password: &str) -> Self {
        Self {
            origin,
            credentials: Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn anonymous(origin: Url) -> Self {
        Self {
            origin,
            credentials: None,
        }
    }
}
