use std::time::Duration;

use reqwest::{Client, Url};
use tracing::debug;

use super::{HistoryService, PageQuery};
use crate::error::FetchError;
use crate::line::LogLine;

/// History service reached over HTTP.
pub struct HttpHistory {
    client: Client,
    base: Url,
}

impl HttpHistory {
    pub fn new(server: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base = Url::parse(server).map_err(|e| FetchError::Url(format!("{server}: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }
}

/// Build `GET /logs/{source}[/search]?instances=..&search=..&cursor..`.
pub fn history_url(base: &Url, query: &PageQuery) -> Result<Url, FetchError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| FetchError::Url(format!("{base} cannot be used as a base url")))?;
        segments.pop_if_empty().push("logs").push(&query.source_id);
        if query.search.is_some() {
            segments.push("search");
        }
    }

    {
        let mut pairs = url.query_pairs_mut();
        for instance in &query.instances {
            pairs.append_pair("instances", instance);
        }
        if let Some(search) = &query.search {
            pairs.append_pair("search", search);
        }
        if let Some(cursor) = &query.cursor {
            pairs
                .append_pair("cursorTime", &cursor.time.to_string())
                .append_pair("cursorSequenceNumber", &cursor.sequence_number.to_string())
                .append_pair("direction", cursor.direction.as_str());
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

#[async_trait::async_trait]
impl HistoryService for HttpHistory {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<LogLine>, FetchError> {
        let url = history_url(&self.base, query)?;
        debug!(%url, "fetching history page");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.json::<Vec<LogLine>>().await?)
    }
}
