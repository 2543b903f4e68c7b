use super::RequestParameters;
use crate::{Error, ErrorContext, Result};
use url::Url;

/// Turns a request descriptor into the URL of one physical request.
pub trait UrlBuilder: Send + Sync {
    fn build_url(&self, parameters: &dyn RequestParameters) -> Result<Url>;
}

/// Where and as whom requests are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    server: Url,
    username: String,
    passhash: String,
}

impl ConnectionDetails {
    /// `server` may omit the scheme, in which case HTTPS is assumed.
    pub fn new(
        server: impl AsRef<str>,
        username: impl Into<String>,
        passhash: impl Into<String>,
    ) -> Result<Self> {
        let server = server.as_ref().trim();
        if server.is_empty() {
            return Err(Error::invalid_argument(
                "server must not be empty",
                ErrorContext::new().with_source("connection_details"),
            ));
        }
        let username = username.into();
        if username.is_empty() {
            return Err(Error::invalid_argument(
                "username must not be empty",
                ErrorContext::new().with_source("connection_details"),
            ));
        }

        let with_scheme = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("https://{}", server)
        };
        let server = Url::parse(&with_scheme).map_err(|e| {
            Error::invalid_argument(
                format!("server '{}' is not a valid address: {}", with_scheme, e),
                ErrorContext::new().with_source("connection_details"),
            )
        })?;

        Ok(Self {
            server,
            username,
            passhash: passhash.into(),
        })
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Default URL builder: `<server>/<function>?<params>&username=..&passhash=..`.
#[derive(Debug, Clone)]
pub struct PrtgUrlBuilder {
    connection: ConnectionDetails,
}

impl PrtgUrlBuilder {
    pub fn new(connection: ConnectionDetails) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ConnectionDetails {
        &self.connection
    }
}

impl UrlBuilder for PrtgUrlBuilder {
    fn build_url(&self, parameters: &dyn RequestParameters) -> Result<Url> {
        let function = parameters.function().trim_start_matches('/');
        let mut url = self.connection.server.join(function).map_err(|e| {
            Error::invalid_argument(
                format!("function '{}' does not form a valid URL: {}", function, e),
                ErrorContext::new()
                    .with_url(self.connection.server.as_str())
                    .with_source("url_builder"),
            )
        })?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in parameters.query() {
                pairs.append_pair(&key, &value);
            }
            pairs.append_pair("username", &self.connection.username);
            pairs.append_pair("passhash", &self.connection.passhash);
        }

        Ok(url)
    }
}
