//! CalDAV implementation of the transport traits.

use calsync_core::{TaskId, TimeWindow, VersionTag};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::{TransportError, TransportResult};
use crate::raw_event::RawEvent;
use crate::transport::{
    BoxFuture, CalendarTransport, CreateOptions, GracePeriodApi, ParticipationResponse,
    SearchQuery, WriteOutcome,
};

use super::client::{CalDavClient, DavResponse, Precondition};
use super::config::CalDavConfig;
use super::xml::{calendar_query_body, parse_report_response, summary_search_body};

/// Body of a `202 Accepted` answer to a deferred write.
#[derive(Debug, Deserialize)]
struct TaskResponse {
    id: String,
}

/// Calendar transport talking CalDAV over HTTP.
///
/// Deferred writes are requested with `?graceperiod=true`; the server then
/// answers `202 Accepted` with the pending task id as JSON.
pub struct CalDavTransport {
    client: CalDavClient,
}

impl CalDavTransport {
    pub fn new(config: CalDavConfig) -> TransportResult<Self> {
        Ok(Self {
            client: CalDavClient::new(config)?,
        })
    }

    fn config(&self) -> &CalDavConfig {
        self.client.config()
    }

    fn url(&self, path: &str, deferred: bool) -> TransportResult<Url> {
        let mut url = self.config().resolve(path).map_err(|e| {
            TransportError::configuration(format!("invalid resource path {}: {}", path, e))
        })?;
        if deferred {
            url.query_pairs_mut().append_pair("graceperiod", "true");
        }
        Ok(url)
    }
}

/// Interprets the answer to a write.
fn write_outcome(
    path: &str,
    payload: Option<String>,
    response: DavResponse,
) -> TransportResult<WriteOutcome> {
    if response.status == 202 {
        let task: TaskResponse = serde_json::from_str(&response.body).map_err(|e| {
            TransportError::invalid_response(format!("invalid grace period task: {}", e))
                .with_source(e)
        })?;
        return Ok(WriteOutcome::Deferred(TaskId::new(task.id)));
    }

    Ok(WriteOutcome::Immediate(payload.map(|data| {
        let mut raw = RawEvent::new(path, data);
        raw.etag = response.etag;
        raw
    })))
}

impl CalendarTransport for CalDavTransport {
    fn name(&self) -> &str {
        "caldav"
    }

    fn list_events<'a>(
        &'a self,
        calendar_path: &'a str,
        window: &'a TimeWindow,
        timezone: Option<&'a str>,
    ) -> BoxFuture<'a, TransportResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let url = self.url(calendar_path, false)?;
            let body = calendar_query_body(window.start, window.end)?;
            debug!(url = %url, timezone = ?timezone, "Listing events via REPORT");

            let response = self.client.report(url, body).await?;
            let events = parse_report_response(&response.body)?;
            debug!(count = events.len(), "Listed events");
            Ok(events)
        })
    }

    fn search_events<'a>(
        &'a self,
        calendar_id: &'a str,
        query: &'a SearchQuery,
    ) -> BoxFuture<'a, TransportResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let path = self.config().calendar_path(calendar_id);
            let url = self.url(&path, false)?;
            let body = summary_search_body(&query.query)?;

            let response = self.client.report(url, body).await?;
            Ok(parse_report_response(&response.body)?
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .collect())
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, TransportResult<RawEvent>> {
        Box::pin(async move {
            let response = self.client.get(self.url(path, false)?).await?;
            let mut raw = RawEvent::new(path, response.body);
            raw.etag = response.etag;
            Ok(raw)
        })
    }

    fn create<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        options: CreateOptions,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>> {
        Box::pin(async move {
            let url = self.url(path, options.grace_period)?;
            let response = self
                .client
                .put(url, payload.clone(), Precondition::Absent, false)
                .await?;
            let outcome = write_outcome(path, Some(payload), response)?;
            info!(path = %path, deferred = outcome.task_id().is_some(), "Event created");
            Ok(outcome)
        })
    }

    fn modify<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>> {
        Box::pin(async move {
            let url = self.url(path, self.config().deferred_writes)?;
            let response = self
                .client
                .put(url, payload.clone(), Precondition::from_etag(etag), false)
                .await?;
            write_outcome(path, Some(payload), response)
        })
    }

    fn remove<'a>(
        &'a self,
        path: &'a str,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>> {
        Box::pin(async move {
            let url = self.url(path, self.config().deferred_writes)?;
            let response = self
                .client
                .delete(url, Precondition::from_etag(etag))
                .await?;
            write_outcome(path, None, response)
        })
    }

    fn change_participation<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<ParticipationResponse>> {
        Box::pin(async move {
            let url = self.url(path, false)?;
            let response = self
                .client
                .put(url, payload, Precondition::from_etag(etag), true)
                .await?;

            Ok(match response.status {
                200 if !response.body.trim().is_empty() => {
                    ParticipationResponse::ok(response.body, response.etag)
                }
                _ => ParticipationResponse::no_content(),
            })
        })
    }
}

impl GracePeriodApi for CalDavTransport {
    fn cancel_task<'a>(&'a self, task_id: &'a TaskId) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            let url = self.config().task_url(task_id.as_str()).map_err(|e| {
                TransportError::configuration(format!("invalid task url: {}", e))
            })?;
            self.client.delete(url, Precondition::None).await?;
            debug!(task_id = %task_id, "Grace period task cancelled");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, etag: Option<&str>, body: &str) -> DavResponse {
        DavResponse {
            status,
            etag: etag.map(VersionTag::new),
            body: body.to_string(),
        }
    }

    fn transport() -> CalDavTransport {
        CalDavTransport::new(CalDavConfig::new("https://dav.example.com/dav/").unwrap()).unwrap()
    }

    #[test]
    fn accepted_write_is_deferred() {
        let outcome = write_outcome("/a.ics", None, response(202, None, r#"{"id":"T1"}"#)).unwrap();
        assert_eq!(outcome, WriteOutcome::Deferred(TaskId::new("T1")));
    }

    #[test]
    fn accepted_write_without_task_is_invalid() {
        let err = write_outcome("/a.ics", None, response(202, None, "queued")).unwrap_err();
        assert_eq!(err.code(), crate::TransportErrorCode::InvalidResponse);
    }

    #[test]
    fn immediate_write_carries_new_etag() {
        let outcome = write_outcome(
            "/a.ics",
            Some("BEGIN:VCALENDAR".to_string()),
            response(201, Some("\"v2\""), ""),
        )
        .unwrap();

        let WriteOutcome::Immediate(Some(raw)) = outcome else {
            panic!("expected an immediate write with a resource");
        };
        assert_eq!(raw.path, "/a.ics");
        assert_eq!(raw.etag, Some(VersionTag::new("v2")));

        let outcome = write_outcome("/a.ics", None, response(204, None, "")).unwrap();
        assert_eq!(outcome, WriteOutcome::Immediate(None));
    }

    #[test]
    fn deferred_urls_carry_graceperiod_flag() {
        let transport = transport();
        assert_eq!(
            transport.url("/calendars/home1/default/abc.ics", true).unwrap().as_str(),
            "https://dav.example.com/dav/calendars/home1/default/abc.ics?graceperiod=true"
        );
        assert!(transport.url("/calendars/home1/default/abc.ics", false).unwrap().query().is_none());
    }

    #[test]
    fn transport_name() {
        assert_eq!(transport().name(), "caldav");
    }
}
