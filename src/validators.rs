use anyhow::{Error, bail};
use cliclack::Validate;
use url::Url;

pub struct ServerUrlValidator;

impl Validate<String> for ServerUrlValidator {
    type Err = Error;

    fn validate(&self, input: &String) -> Result<(), Self::Err> {
        validate_server_url(input).map(|_| ())
    }
}

/// The server must be reachable over http(s) and able to carry the `/api` path.
pub fn validate_server_url(input: &str) -> anyhow::Result<Url> {
    let url = Url::parse(input.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        bail!("Server URL must use http or https, got `{}`", url.scheme());
    }

    if url.host().is_none() {
        bail!("Server URL must name a host");
    }

    if url.query().is_some() || url.fragment().is_some() {
        bail!("Server URL cannot carry a query or fragment");
    }

    Ok(url)
}
