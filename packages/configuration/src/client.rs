use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// Connection settings for the qBittorrent Web UI.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Client {
    /// Base URL of the Web UI, for example `http://127.0.0.1:8080/`.
    #[serde(default = "Client::default_url")]
    pub url: Url,

    /// Web UI user name. Leave it empty when the Web UI bypasses
    /// authentication for local clients.
    #[serde(default)]
    pub username: Option<String>,

    /// Web UI password.
    #[serde(default)]
    pub password: Option<String>,

    /// Timeout in seconds for every request to the Web UI.
    #[serde(default = "Client::default_timeout")]
    pub timeout: u64,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            username: None,
            password: None,
            timeout: Self::default_timeout(),
        }
    }
}

impl Client {
    fn default_url() -> Url {
        Url::parse("http://127.0.0.1:8080/").expect("the default Web UI URL should be valid")
    }

    fn default_timeout() -> u64 {
        10
    }

    pub fn mask_secrets(&mut self) {
        if self.password.is_some() {
            self.password = Some("***".to_string());
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !matches!(self.url.scheme(), "http" | "https") {
            return Err(Error::InvalidValue {
                field: "client.url",
                reason: format!("unsupported scheme `{}`", self.url.scheme()),
            });
        }

        if self.timeout == 0 {
            return Err(Error::InvalidValue {
                field: "client.timeout",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
