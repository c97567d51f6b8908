use reqwest::{Client, Response};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use super::{Result, SyncClient, SyncError};
use crate::types::record::{Field, RepositoryRecord};

#[derive(Serialize, Debug)]
struct UpdateBody<'a> {
    value: &'a str,
    old: &'a str,
}

/// [`SyncClient`] speaking the mirror server's JSON API.
#[derive(Debug, Clone)]
pub struct HttpSyncClient {
    client: Client,
    base: Url,
}

#[derive(Debug, thiserror::Error)]
#[error("{0} cannot be used as a server base URL")]
pub struct InvalidBaseUrl(pub Url);

impl HttpSyncClient {
    pub fn new(base: Url) -> std::result::Result<Self, InvalidBaseUrl> {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(client: Client, base: Url) -> std::result::Result<Self, InvalidBaseUrl> {
        if base.cannot_be_a_base() {
            return Err(InvalidBaseUrl(base));
        }

        Ok(Self { client, base })
    }

    /// Joins `segments` onto the base URL, keeping any path prefix it has.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();

        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }

        url
    }

    fn repo_endpoint(&self, index: usize, field: Option<Field>) -> Url {
        let index = index.to_string();

        match field {
            Some(field) => self.endpoint(&["repo", &index, field.as_str()]),
            None => self.endpoint(&["repo", &index]),
        }
    }
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::Status {
            status,
            url: response.url().clone(),
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().clone();
    let body = response.bytes().await?;

    serde_json::from_slice(&body).map_err(|err| SyncError::Decode {
        url,
        reason: err.to_string(),
    })
}

/// The server may answer an update with any JSON value, only falsy ones refuse it.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(accepted) => *accepted,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[async_trait::async_trait]
impl SyncClient for HttpSyncClient {
    async fn fetch_list(&self) -> Result<Vec<RepositoryRecord>> {
        let url = self.endpoint(&["repos"]);

        trace!("GET {url}");
        let response = check(self.client.get(url).send().await?)?;
        let records: Vec<RepositoryRecord> = decode(response).await?;

        debug!("fetched {} repositories", records.len());

        Ok(records)
    }

    async fn update_field(
        &self,
        index: usize,
        field: Field,
        value: &str,
        old: &str,
    ) -> Result<bool> {
        let url = self.repo_endpoint(index, Some(field));

        trace!("POST {url}");
        let response = self
            .client
            .post(url)
            .json(&UpdateBody { value, old })
            .send()
            .await?;

        let answer: Value = decode(check(response)?).await?;
        trace!("update answered with {answer}");

        Ok(is_truthy(&answer))
    }

    async fn delete_record(&self, index: usize) -> Result<()> {
        let url = self.repo_endpoint(index, None);

        trace!("DELETE {url}");
        check(self.client.delete(url).send().await?)?;

        Ok(())
    }

    async fn create_record(&self) -> Result<()> {
        let url = self.endpoint(&["repo"]);

        trace!("POST {url}");
        check(self.client.post(url).send().await?)?;

        Ok(())
    }
}
