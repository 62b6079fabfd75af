//! XML utilities for CalDAV REPORT requests.

use std::io::Cursor;

use calsync_core::VersionTag;
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{TransportError, TransportResult};
use crate::raw_event::RawEvent;

/// DAV namespace
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> TransportResult<()> {
    writer
        .write_event(event)
        .map_err(|e| TransportError::internal(format!("failed to write XML: {e}")))
}

fn start(writer: &mut XmlWriter, name: &str) -> TransportResult<()> {
    emit(writer, Event::Start(BytesStart::new(name)))
}

fn end(writer: &mut XmlWriter, name: &str) -> TransportResult<()> {
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn finish(writer: XmlWriter) -> TransportResult<String> {
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| TransportError::internal(format!("XML body is not UTF-8: {e}")))
}

/// Opens `<c:calendar-query>` with the etag + calendar-data prop and the
/// VCALENDAR/VEVENT comp-filters; `filter` writes inside the VEVENT filter.
fn calendar_query<F>(filter: F) -> TransportResult<String>
where
    F: FnOnce(&mut XmlWriter) -> TransportResult<()>,
{
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut query = BytesStart::new("c:calendar-query");
    query.push_attribute(("xmlns:d", DAV_NS));
    query.push_attribute(("xmlns:c", CALDAV_NS));
    emit(&mut writer, Event::Start(query))?;

    start(&mut writer, "d:prop")?;
    emit(&mut writer, Event::Empty(BytesStart::new("d:getetag")))?;
    emit(&mut writer, Event::Empty(BytesStart::new("c:calendar-data")))?;
    end(&mut writer, "d:prop")?;

    start(&mut writer, "c:filter")?;
    let mut vcal_filter = BytesStart::new("c:comp-filter");
    vcal_filter.push_attribute(("name", "VCALENDAR"));
    emit(&mut writer, Event::Start(vcal_filter))?;
    let mut vevent_filter = BytesStart::new("c:comp-filter");
    vevent_filter.push_attribute(("name", "VEVENT"));
    emit(&mut writer, Event::Start(vevent_filter))?;

    filter(&mut writer)?;

    end(&mut writer, "c:comp-filter")?;
    end(&mut writer, "c:comp-filter")?;
    end(&mut writer, "c:filter")?;
    end(&mut writer, "c:calendar-query")?;

    finish(writer)
}

/// REPORT body listing events inside a time range.
pub fn calendar_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> TransportResult<String> {
    calendar_query(|writer| {
        let mut time_range = BytesStart::new("c:time-range");
        time_range.push_attribute(("start", format_icalendar_datetime(start).as_str()));
        time_range.push_attribute(("end", format_icalendar_datetime(end).as_str()));
        emit(writer, Event::Empty(time_range))
    })
}

/// REPORT body matching events whose SUMMARY contains `text` (case-insensitive).
pub fn summary_search_body(text: &str) -> TransportResult<String> {
    calendar_query(|writer| {
        let mut prop_filter = BytesStart::new("c:prop-filter");
        prop_filter.push_attribute(("name", "SUMMARY"));
        emit(writer, Event::Start(prop_filter))?;

        let mut text_match = BytesStart::new("c:text-match");
        text_match.push_attribute(("collation", "i;unicode-casemap"));
        emit(writer, Event::Start(text_match))?;
        emit(writer, Event::Text(BytesText::new(text)))?;
        end(writer, "c:text-match")?;

        end(writer, "c:prop-filter")
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Href,
    Etag,
    Data,
}

/// Parses a REPORT multistatus into raw events.
///
/// Responses without calendar data are skipped.
pub fn parse_report_response(xml: &str) -> TransportResult<Vec<RawEvent>> {
    let mut results = Vec::new();

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut href: Option<String> = None;
    let mut etag: Option<String> = None;
    let mut data: Option<String> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TransportError::invalid_response(format!("malformed multistatus: {e}")))?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                field = match local_name(&name) {
                    "response" => {
                        href = None;
                        etag = None;
                        data = None;
                        None
                    }
                    "href" => Some(Field::Href),
                    "getetag" => Some(Field::Etag),
                    "calendar-data" => Some(Field::Data),
                    _ => None,
                };
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" {
                    if let (Some(path), Some(payload)) = (href.take(), data.take()) {
                        let mut raw = RawEvent::new(path, payload);
                        raw.etag = etag.take().map(VersionTag::new);
                        results.push(raw);
                    }
                }
                field = None;
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| TransportError::invalid_response(format!("bad XML text: {e}")))?
                    .to_string();
                store(field, text, &mut href, &mut etag, &mut data);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).to_string();
                store(field, text, &mut href, &mut etag, &mut data);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(results)
}

fn store(
    field: Option<Field>,
    text: String,
    href: &mut Option<String>,
    etag: &mut Option<String>,
    data: &mut Option<String>,
) {
    match field {
        Some(Field::Href) => *href = Some(text),
        Some(Field::Etag) => *etag = Some(text),
        Some(Field::Data) => *data = Some(text),
        None => {}
    }
}

/// Extracts the local name from a potentially namespaced element name.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Formats a datetime for iCalendar time-range filters (UTC format).
fn format_icalendar_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
