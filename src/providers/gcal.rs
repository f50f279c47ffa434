//! Google Calendar API v3 client.
//!
//! Inserts go out as one `multipart/mixed` batch request; the multipart
//! response carries a status line per item.

use serde::{Deserialize, Serialize};
use tracing::debug;
use tracker_core::{
    BatchItemStatus, CalendarEvent, CalendarRemote, NewEvent, TrackerError, TrackerResult,
};
use url::Url;

use super::{http_error, status_error};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
const BATCH_URL: &str = "https://www.googleapis.com/batch/calendar/v3";
const BATCH_BOUNDARY: &str = "tracker2gcal_batch";
const PAGE_SIZE: &str = "250";

pub struct GoogleCalendar {
    http: reqwest::Client,
    calendar_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Serialize)]
struct EventDate<'a> {
    date: &'a str,
}

#[derive(Debug, Serialize)]
struct InsertEvent<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventDate<'a>,
    end: EventDate<'a>,
}

impl<'a> From<&'a NewEvent> for InsertEvent<'a> {
    fn from(event: &'a NewEvent) -> Self {
        InsertEvent {
            summary: &event.title,
            description: &event.body,
            start: EventDate {
                date: &event.start_day,
            },
            end: EventDate {
                date: &event.end_day,
            },
        }
    }
}

impl GoogleCalendar {
    pub fn new(calendar_id: &str, access_token: &str) -> Self {
        GoogleCalendar {
            http: reqwest::Client::new(),
            calendar_id: calendar_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// `.../calendars/{id}/events[/{event_id}]`, with each segment escaped
    fn events_url(&self, event_id: Option<&str>) -> TrackerResult<Url> {
        let mut url = Url::parse(API_BASE).map_err(|e| TrackerError::Http(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| TrackerError::Http(format!("{} cannot be a base", API_BASE)))?;
            segments.pop_if_empty();
            segments.extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }
}

impl CalendarRemote for GoogleCalendar {
    async fn list_events(&self) -> TrackerResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.events_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self
                .http
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(http_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error("event list", status));
            }

            let page: EventList = response.json().await.map_err(http_error)?;
            debug!("fetched {} events", page.items.len());

            events.extend(
                page.items
                    .into_iter()
                    .filter(|e| e.status != "cancelled" && !e.id.is_empty())
                    .map(|e| CalendarEvent {
                        handle: e.id,
                        title: e.summary,
                    }),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(events)
    }

    async fn delete_event(&self, event: &CalendarEvent) -> TrackerResult<()> {
        let url = self.events_url(Some(&event.handle))?;

        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        // Already gone counts as deleted
        if status.is_success() || status == reqwest::StatusCode::GONE {
            Ok(())
        } else {
            Err(status_error(&event.handle, status))
        }
    }

    async fn insert_batch(&self, events: &[NewEvent]) -> TrackerResult<Vec<BatchItemStatus>> {
        let path = self.events_url(None)?.path().to_string();
        let body = build_batch_body(&path, events)?;

        let response = self
            .http
            .post(BATCH_URL)
            .bearer_auth(&self.access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/mixed; boundary={}", BATCH_BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("batch insert", status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.map_err(http_error)?;

        parse_batch_response(&content_type, &body)
    }
}

fn batch_item_id(index: usize) -> String {
    format!("insert-request-{}", index)
}

/// One `application/http` part per insert, each naming the events collection.
fn build_batch_body(path: &str, events: &[NewEvent]) -> TrackerResult<String> {
    let mut body = String::new();

    for (index, event) in events.iter().enumerate() {
        let json = serde_json::to_string(&InsertEvent::from(event))
            .map_err(|e| TrackerError::Type(e.to_string()))?;

        body.push_str(&format!("--{}\r\n", BATCH_BOUNDARY));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <{}>\r\n\r\n", batch_item_id(index)));
        body.push_str(&format!("POST {}\r\n", path));
        body.push_str("Content-Type: application/json\r\n\r\n");
        body.push_str(&json);
        body.push_str("\r\n");
    }

    body.push_str(&format!("--{}--\r\n", BATCH_BOUNDARY));
    Ok(body)
}

/// Read the per-item status lines out of a multipart batch response.
fn parse_batch_response(content_type: &str, body: &str) -> TrackerResult<Vec<BatchItemStatus>> {
    let boundary = content_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("boundary="))
        .map(|b| b.trim_matches('"'))
        .next()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            TrackerError::Parse(format!("batch response has no boundary: '{}'", content_type))
        })?;

    let delimiter = format!("--{}", boundary);
    let mut statuses = Vec::new();

    for part in body.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }

        let mut id = None;
        let mut status_line = None;

        for line in part.lines().map(str::trim) {
            if let Some((name, value)) = line.split_once(':') {
                if id.is_none() && name.eq_ignore_ascii_case("content-id") {
                    let value = value.trim().trim_start_matches('<').trim_end_matches('>');
                    id = Some(value.strip_prefix("response-").unwrap_or(value).to_string());
                    continue;
                }
            }
            if line.starts_with("HTTP/") {
                status_line = Some(line);
                break;
            }
        }

        let Some(status_line) = status_line else {
            return Err(TrackerError::Parse(
                "batch response part has no status line".to_string(),
            ));
        };

        let mut fields = status_line.splitn(3, ' ');
        let _version = fields.next();
        let code: u16 = fields
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| TrackerError::Parse(format!("bad status line '{}'", status_line)))?;
        let reason = fields.next().unwrap_or_default().to_string();

        statuses.push(BatchItemStatus {
            id: id.unwrap_or_else(|| batch_item_id(statuses.len())),
            code,
            reason,
        });
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALENDAR_ID: &str = "google.com_t60bvmdcq9e2ai7el5lk00ns9s@group.calendar.google.com";

    fn new_event(title: &str, day: &str, next: &str) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            start_day: day.to_string(),
            end_day: next.to_string(),
            body: "http://tracker/story/show/1".to_string(),
        }
    }

    #[test]
    fn test_events_url() {
        let calendar = GoogleCalendar::new(CALENDAR_ID, "token");

        assert_eq!(
            calendar.events_url(None).unwrap().as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/\
             google.com_t60bvmdcq9e2ai7el5lk00ns9s@group.calendar.google.com/events"
        );
        assert!(
            calendar
                .events_url(Some("abc/123"))
                .unwrap()
                .as_str()
                .ends_with("/events/abc%2F123")
        );
    }

    #[test]
    fn test_build_batch_body() {
        let events = vec![
            new_event("Beta [release, hard]", "2010-11-19", "2010-11-20"),
            new_event("GA [release, floating]", "2010-12-31", "2011-01-01"),
        ];

        let body = build_batch_body("/calendar/v3/calendars/x/events", &events).unwrap();

        assert_eq!(body.matches("--tracker2gcal_batch\r\n").count(), 2);
        assert!(body.ends_with("--tracker2gcal_batch--\r\n"));
        assert!(body.contains("Content-ID: <insert-request-1>"));
        assert!(body.contains("POST /calendar/v3/calendars/x/events\r\n"));
        assert!(body.contains(
            r#""start":{"date":"2010-12-31"},"end":{"date":"2011-01-01"}"#
        ));
    }

    #[test]
    fn test_parse_batch_response() {
        let body = "--batch_abc\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-insert-request-0>\r\n\
            \r\n\
            HTTP/1.1 200 OK\r\n\
            Content-Type: application/json; charset=UTF-8\r\n\
            \r\n\
            {\"id\": \"evt1\"}\r\n\
            --batch_abc\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-insert-request-1>\r\n\
            \r\n\
            HTTP/1.1 403 Forbidden\r\n\
            Content-Type: application/json; charset=UTF-8\r\n\
            \r\n\
            {\"error\": {\"code\": 403}}\r\n\
            --batch_abc--\r\n";

        let statuses = parse_batch_response("multipart/mixed; boundary=batch_abc", body).unwrap();

        assert_eq!(
            statuses,
            vec![
                BatchItemStatus {
                    id: "insert-request-0".to_string(),
                    code: 200,
                    reason: "OK".to_string(),
                },
                BatchItemStatus {
                    id: "insert-request-1".to_string(),
                    code: 403,
                    reason: "Forbidden".to_string(),
                },
            ]
        );
        assert!(statuses[0].is_success());
        assert!(!statuses[1].is_success());
    }

    #[test]
    fn test_parse_batch_response_without_boundary() {
        assert!(matches!(
            parse_batch_response("application/json", "{}"),
            Err(TrackerError::Parse(_))
        ));
    }
}
