use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::responses::{TorrentInfo, TorrentPeers};
use crate::common::http::{Query, QueryParam, ReqwestQuery};
use crate::connection_info::ConnectionInfo;

/// Errors returned by the Web UI client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to build the HTTP client: {source}")]
    BuildClient { source: reqwest::Error },

    #[error("Invalid URL for path {path}: {source}")]
    InvalidUrl { path: String, source: url::ParseError },

    #[error("Request to {url} failed: {source}")]
    Request { url: Url, source: reqwest::Error },

    #[error("Unexpected response status {status} from {url}")]
    UnexpectedStatus { url: Url, status: StatusCode },

    /// The session is missing or expired, or the address is banned by the
    /// Web UI.
    #[error("Forbidden: {url}")]
    Forbidden { url: Url },

    #[error("Authentication refused by {url}")]
    AuthenticationRefused { url: Url },

    #[error("Invalid response body from {url}: {source}")]
    InvalidResponse { url: Url, source: reqwest::Error },

    #[error("Failed to encode the preferences: {source}")]
    EncodePreferences { source: serde_json::Error },
}

/// Preferences changed by the banner.
#[derive(Serialize, Debug)]
struct BannedIpsPreferences<'a> {
    #[serde(rename = "banned_IPs")]
    banned_ips: &'a str,
}

/// A client for the Web UI API v2.
///
/// The session cookie returned by [`Client::login`] is kept by the
/// underlying HTTP client and sent with every request.
pub struct Client {
    connection_info: ConnectionInfo,
    base_path: String,
    http_client: reqwest::Client,
}

impl Client {
    /// # Errors
    ///
    /// Will return an error if the HTTP client can't be built.
    pub fn new(connection_info: ConnectionInfo, timeout: Duration) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|source| Error::BuildClient { source })?;

        Ok(Self {
            connection_info,
            base_path: "api/v2/".to_string(),
            http_client,
        })
    }

    #[must_use]
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    /// It opens a session. It does nothing when there are no credentials.
    ///
    /// # Errors
    ///
    /// Will return an error if the request fails or the credentials are
    /// refused.
    pub async fn login(&self) -> Result<(), Error> {
        let Some(credentials) = &self.connection_info.credentials else {
            return Ok(());
        };

        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];

        let url = self.url("auth/login")?;
        let response = self.post_form("auth/login", &form).await?;
        let body = response
            .text()
            .await
            .map_err(|source| Error::InvalidResponse { url: url.clone(), source })?;

        if body.trim() == "Ok." {
            debug!(%url, "logged in");
            Ok(())
        } else {
            Err(Error::AuthenticationRefused { url })
        }
    }

    /// # Errors
    ///
    /// Will return an error if the request fails.
    pub async fn app_version(&self) -> Result<String, Error> {
        let url = self.url("app/version")?;
        let response = self.get("app/version", Query::empty()).await?;

        response.text().await.map_err(|source| Error::InvalidResponse { url, source })
    }

    /// All the torrents.
    ///
    /// # Errors
    ///
    /// Will return an error if the request fails or the body can't be decoded.
    pub async fn torrents_info(&self) -> Result<Vec<TorrentInfo>, Error> {
        let url = self.url("torrents/info")?;
        let response = self.get("torrents/info", Query::empty()).await?;

        response
            .json::<Vec<TorrentInfo>>()
            .await
            .map_err(|source| Error::InvalidResponse { url, source })
    }

    /// All the peers of a torrent.
    ///
    /// # Errors
    ///
    /// Will return an error if the request fails or the body can't be decoded.
    pub async fn torrent_peers(&self, hash: &str) -> Result<TorrentPeers, Error> {
        let url = self.url("sync/torrentPeers")?;
        let query = Query::params(vec![QueryParam::new("hash", hash), QueryParam::new("rid", "0")]);
        let response = self.get("sync/torrentPeers", query).await?;

        response
            .json::<TorrentPeers>()
            .await
            .map_err(|source| Error::InvalidResponse { url, source })
    }

    /// It replaces the banned IP list of the client. Every line is one
    /// address.
    ///
    /// # Errors
    ///
    /// Will return an error if the request fails.
    pub async fn set_banned_ips(&self, banned_ips: &str) -> Result<(), Error> {
        let preferences = serde_json::to_string(&BannedIpsPreferences { banned_ips })
            .map_err(|source| Error::EncodePreferences { source })?;

        self.post_form("app/setPreferences", &[("json", preferences.as_str())])
            .await
            .map(|_| ())
    }

    /// It bans `address:port` peers and disconnects them.
    ///
    /// # Errors
    ///
    /// Will return an error if the request fails.
    pub async fn ban_peers(&self, peers: &[String]) -> Result<(), Error> {
        if peers.is_empty() {
            return Ok(());
        }

        let peers = peers.join("|");

        self.post_form("transfer/banPeers", &[("peers", peers.as_str())])
            .await
            .map(|_| ())
    }

    async fn get(&self, path: &str, params: Query) -> Result<Response, Error> {
        let url = self.url(path)?;

        let response = self
            .http_client
            .get(url.clone())
            .header(reqwest::header::REFERER, self.connection_info.origin.as_str())
            .query(&ReqwestQuery::from(params))
            .send()
            .await
            .map_err(|source| Error::Request { url: url.clone(), source })?;

        check_status(url, response)
    }

    async fn post_form<T: Serialize + ?Sized>(&self, path: &str, form: &T) -> Result<Response, Error> {
        let url = self.url(path)?;

        let response = self
            .http_client
            .post(url.clone())
            .header(reqwest::header::REFERER, self.connection_info.origin.as_str())
            .form(form)
            .send()
            .await
            .map_err(|source| Error::Request { url: url.clone(), source })?;

        check_status(url, response)
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        self.connection_info
            .origin
            .join(&format!("{}{path}", self.base_path))
            .map_err(|source| Error::InvalidUrl {
                path: path.to_string(),
                source,
            })
    }
}

fn check_status(url: Url, response: Response) -> Result<Response, Error> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::FORBIDDEN => Err(Error::Forbidden { url }),
        status => Err(Error::UnexpectedStatus { url, status }),
    }
}
