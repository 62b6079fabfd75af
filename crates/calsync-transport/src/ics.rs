//! iCalendar codec.
//!
//! Pure conversions between resource payloads and [`CalendarEvent`] values.
//! A stored resource holds one VCALENDAR: a single event, or a recurring
//! master followed by its overridden instances (same UID, with
//! `RECURRENCE-ID`).

use calsync_core::{Attendee, CalendarEvent, EventTime, PartStat, Recurrence};
use chrono::Utc;
use icalendar::{
    Calendar, CalendarDateTime, Component, DatePerhapsTime, EventLike, Property, ValueType,
    parser::{self, read_calendar, unfold},
};

use crate::error::{TransportError, TransportResult};
use crate::raw_event::RawEvent;

/// Properties mapped onto [`CalendarEvent`] fields; everything else is kept in
/// `extra_properties`.
const MODELLED_PROPERTIES: &[&str] = &[
    "UID",
    "SUMMARY",
    "DTSTART",
    "DTEND",
    "DTSTAMP",
    "LOCATION",
    "DESCRIPTION",
    "SEQUENCE",
    "ORGANIZER",
    "ATTENDEE",
    "RRULE",
    "EXDATE",
    "RECURRENCE-ID",
];

/// Decodes every VEVENT of a resource.
///
/// Each event gets the resource's path and version tag.
pub fn parse_ics_content(raw: &RawEvent) -> TransportResult<Vec<CalendarEvent>> {
    let unfolded = unfold(&raw.data);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| TransportError::codec(format!("invalid calendar at {}: {}", raw.path, e)))?;

    let events = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .map(|vevent| {
            let mut event = parse_vevent(vevent).map_err(|reason| {
                TransportError::codec(format!("invalid event at {}: {}", raw.path, reason))
            })?;
            event.path = Some(raw.path.clone());
            event.etag = raw.etag.clone();
            Ok(event)
        })
        .collect::<TransportResult<Vec<_>>>()?;

    Ok(events)
}

/// Decodes a resource into one event.
///
/// For a recurring series, the overridden instances are attached to the
/// master's `exceptions`.
pub fn parse_master(raw: &RawEvent) -> TransportResult<CalendarEvent> {
    let events = parse_ics_content(raw)?;
    let (mut masters, instances): (Vec<_>, Vec<_>) =
        events.into_iter().partition(|e| e.recurrence_id.is_none());

    match masters.len() {
        0 => instances
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::codec(format!("no event found at {}", raw.path))),
        _ => {
            let mut master = masters.swap_remove(0);
            if master.recurrence.is_some() {
                master.exceptions = instances;
            }
            Ok(master)
        }
    }
}

fn parse_vevent(vevent: &parser::Component<'_>) -> Result<CalendarEvent, String> {
    let uid = vevent
        .find_prop("UID")
        .ok_or("missing UID")?
        .val
        .to_string();
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let start = vevent
        .find_prop("DTSTART")
        .and_then(to_event_time)
        .ok_or("missing or invalid DTSTART")?;
    let end = vevent
        .find_prop("DTEND")
        .and_then(to_event_time)
        .unwrap_or(start);

    let mut event = CalendarEvent::new(uid, title, start, end);
    event.location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    event.description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    event.sequence = vevent
        .find_prop("SEQUENCE")
        .and_then(|p| p.val.as_ref().parse().ok())
        .unwrap_or(0);
    event.organizer = vevent.find_prop("ORGANIZER").map(parse_attendee);
    event.attendees = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(parse_attendee)
        .collect();

    event.recurrence = vevent.find_prop("RRULE").map(|p| Recurrence {
        rrule: p.val.to_string(),
        exdates: vevent
            .properties
            .iter()
            .filter(|p| p.name == "EXDATE")
            .flat_map(|p| {
                p.val
                    .as_ref()
                    .split(',')
                    .filter_map(EventTime::parse_ics_value)
                    .collect::<Vec<_>>()
            })
            .collect(),
    });
    event.recurrence_id = vevent.find_prop("RECURRENCE-ID").and_then(to_event_time);
    event.is_exception = event.recurrence_id.is_some();

    event.extra_properties = vevent
        .properties
        .iter()
        .filter(|p| !MODELLED_PROPERTIES.contains(&p.name.as_ref()))
        .map(|p| (p.name.to_string(), p.val.to_string()))
        .collect();

    Ok(event)
}

/// Zoned and floating values are read as UTC.
fn to_event_time(prop: &parser::Property<'_>) -> Option<EventTime> {
    match DatePerhapsTime::try_from(prop).ok()? {
        DatePerhapsTime::Date(d) => Some(EventTime::from_date(d)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some(EventTime::from_utc(dt)),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            Some(EventTime::from_utc(naive.and_utc()))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, .. }) => {
            Some(EventTime::from_utc(date_time.and_utc()))
        }
    }
}

fn parse_attendee(prop: &parser::Property<'_>) -> Attendee {
    let param = |key: &str| {
        prop.params
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
    };

    let mut attendee = Attendee::new(prop.val.to_string());
    attendee.name = param("CN");
    attendee.partstat = param("PARTSTAT")
        .and_then(|v| PartStat::from_ics_str(&v))
        .unwrap_or_default();
    attendee
}

/// Encodes an event (with its exceptions) as a VCALENDAR document.
pub fn generate_ics(event: &CalendarEvent) -> String {
    let mut calendar = Calendar::new();
    calendar.push(build_vevent(event));
    for exception in &event.exceptions {
        calendar.push(build_vevent(exception));
    }
    calendar.done().to_string()
}

fn build_vevent(event: &CalendarEvent) -> icalendar::Event {
    let mut vevent = icalendar::Event::new();
    vevent.uid(&event.uid);
    vevent.summary(&event.title);
    vevent.add_property("DTSTAMP", Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
    vevent.add_property("SEQUENCE", event.sequence.to_string());
    vevent.append_property(time_property("DTSTART", &event.start));
    vevent.append_property(time_property("DTEND", &event.end));

    if let Some(ref location) = event.location {
        vevent.location(location);
    }
    if let Some(ref description) = event.description {
        vevent.description(description);
    }

    if let Some(ref recurrence) = event.recurrence {
        vevent.add_property("RRULE", &recurrence.rrule);
        for exdate in &recurrence.exdates {
            vevent.append_multi_property(time_property("EXDATE", exdate));
        }
    }
    if let Some(ref rid) = event.recurrence_id {
        vevent.append_property(time_property("RECURRENCE-ID", rid));
    }

    if let Some(ref organizer) = event.organizer {
        let mut prop = Property::new("ORGANIZER", format!("mailto:{}", organizer.email));
        if let Some(ref name) = organizer.name {
            prop.add_parameter("CN", name);
        }
        vevent.append_property(prop);
    }
    for attendee in &event.attendees {
        let mut prop = Property::new("ATTENDEE", format!("mailto:{}", attendee.email));
        if let Some(ref name) = attendee.name {
            prop.add_parameter("CN", name);
        }
        prop.add_parameter("PARTSTAT", attendee.partstat.as_ics_str());
        vevent.append_multi_property(prop);
    }

    for (key, value) in &event.extra_properties {
        vevent.add_property(key, value);
    }

    vevent.done()
}

fn time_property(name: &str, time: &EventTime) -> Property {
    let mut prop = Property::new(name, time.to_ics_value());
    if time.is_all_day() {
        prop.append_parameter(ValueType::Date);
    }
    prop
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::VersionTag;
    use chrono::{NaiveDate, TimeZone};

    fn at(day: u32, h: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(2025, 2, day, h, 0, 0).unwrap())
    }

    const STANDUP: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//test//EN\r\n\
BEGIN:VEVENT\r\n\
UID:abc\r\n\
SUMMARY:Standup\r\n\
DTSTART:20250203T090000Z\r\n\
DTEND:20250203T091500Z\r\n\
SEQUENCE:2\r\n\
LOCATION:Room 1\r\n\
RRULE:FREQ=DAILY;COUNT=5\r\n\
EXDATE:20250205T090000Z\r\n\
ORGANIZER;CN=Alice:mailto:alice@example.com\r\n\
ATTENDEE;CN=Bob;PARTSTAT=ACCEPTED:mailto:bob@example.com\r\n\
ATTENDEE;PARTSTAT=NEEDS-ACTION:mailto:carol@example.com\r\n\
X-CUSTOM-FLAG:kept\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:abc\r\n\
SUMMARY:Standup (moved)\r\n\
RECURRENCE-ID:20250204T090000Z\r\n\
DTSTART:20250204T100000Z\r\n\
DTEND:20250204T101500Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn raw() -> RawEvent {
        RawEvent::new("/calendars/home1/default/abc.ics", STANDUP).with_etag(VersionTag::new("\"v1\""))
    }

    #[test]
    fn parse_all_vevents() {
        let events = parse_ics_content(&raw()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.path.as_deref() == Some("/calendars/home1/default/abc.ics")));
        assert!(events.iter().all(|e| e.etag == Some(VersionTag::new("v1"))));
        assert!(events[1].is_exception);
        assert_eq!(events[1].recurrence_id, Some(at(4, 9)));
    }

    #[test]
    fn parse_master_attaches_exceptions() {
        let master = parse_master(&raw()).unwrap();

        assert_eq!(master.uid, "abc");
        assert_eq!(master.title, "Standup");
        assert_eq!(master.sequence, 2);
        assert_eq!(master.location.as_deref(), Some("Room 1"));
        assert_eq!(master.start, at(3, 9));

        let recurrence = master.recurrence.as_ref().unwrap();
        assert_eq!(recurrence.rrule, "FREQ=DAILY;COUNT=5");
        assert_eq!(recurrence.exdates, vec![at(5, 9)]);

        assert_eq!(master.exceptions.len(), 1);
        assert_eq!(master.exceptions[0].title, "Standup (moved)");

        let organizer = master.organizer.as_ref().unwrap();
        assert_eq!(organizer.email, "alice@example.com");
        assert_eq!(organizer.name.as_deref(), Some("Alice"));

        assert_eq!(master.attendees.len(), 2);
        assert_eq!(master.attendees[0].partstat, PartStat::Accepted);
        assert_eq!(master.attendees[1].partstat, PartStat::NeedsAction);

        assert_eq!(
            master.extra_properties,
            vec![("X-CUSTOM-FLAG".to_string(), "kept".to_string())]
        );
    }

    #[test]
    fn generated_payload_decodes_back() {
        let original = parse_master(&raw()).unwrap();
        let payload = generate_ics(&original);

        assert!(payload.contains("RRULE:FREQ=DAILY;COUNT=5"));
        assert!(payload.contains("RECURRENCE-ID:20250204T090000Z"));
        assert!(payload.contains("PARTSTAT=ACCEPTED"));

        let decoded = parse_master(&RawEvent::new("/x.ics", payload)).unwrap();
        assert_eq!(decoded.title, original.title);
        assert_eq!(decoded.sequence, original.sequence);
        assert_eq!(decoded.attendees, original.attendees);
        assert_eq!(decoded.recurrence, original.recurrence);
        assert_eq!(decoded.exceptions.len(), 1);
        assert_eq!(decoded.extra_properties, original.extra_properties);
    }

    #[test]
    fn all_day_values() {
        let day = |d| EventTime::from_date(NaiveDate::from_ymd_opt(2025, 2, d).unwrap());
        let event = CalendarEvent::new("off", "Day off", day(3), day(4));

        let payload = generate_ics(&event);
        assert!(payload.contains("DTSTART;VALUE=DATE:20250203"));

        let decoded = parse_master(&RawEvent::new("/off.ics", payload)).unwrap();
        assert_eq!(decoded.start, day(3));
        assert_eq!(decoded.end, day(4));
    }

    #[test]
    fn invalid_payload_is_codec_error() {
        let err = parse_master(&RawEvent::new("/bad.ics", "not a calendar")).unwrap_err();
        assert_eq!(err.code(), crate::TransportErrorCode::CodecError);

        let empty = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";
        assert!(parse_master(&RawEvent::new("/empty.ics", empty)).is_err());
    }
}
