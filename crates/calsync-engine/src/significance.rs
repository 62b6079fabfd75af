//! Significant change detection.

use calsync_core::CalendarEvent;

/// Decides whether an edit needs attendees to confirm again.
///
/// A significant change resets every attendee to `NEEDS-ACTION` and bumps
/// the event sequence.
pub trait ChangeComparator: Send + Sync {
    fn is_significant(&self, new: &CalendarEvent, old: &CalendarEvent) -> bool;
}

/// Compares time, location and recurrence, including overridden instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparator;

impl ChangeComparator for DefaultComparator {
    fn is_significant(&self, new: &CalendarEvent, old: &CalendarEvent) -> bool {
        slot_changed(new, old)
            || new.recurrence != old.recurrence
            || overrides_moved(new, old)
            || overrides_moved(old, new)
    }
}

fn slot_changed(new: &CalendarEvent, old: &CalendarEvent) -> bool {
    new.start != old.start || new.end != old.end || new.location != old.location
}

/// Compares each override of `from` with the same occurrence of `other`.
fn overrides_moved(from: &CalendarEvent, other: &CalendarEvent) -> bool {
    from.exceptions.iter().any(|exception| {
        let Some(rid) = exception.recurrence_id else {
            return true;
        };
        other
            .occurrence(rid)
            .map_or(true, |counterpart| slot_changed(exception, &counterpart))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::{EventTime, Recurrence};
    use chrono::{TimeZone, Utc};

    fn at(day: u32, h: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(2025, 2, day, h, 0, 0).unwrap())
    }

    fn event() -> CalendarEvent {
        CalendarEvent::new("abc", "Standup", at(5, 10), at(5, 11))
    }

    #[test]
    fn title_and_description_are_not_significant() {
        let old = event();
        let mut new = old.clone();
        new.title = "Daily standup".to_string();
        new.description = Some("notes".to_string());
        assert!(!DefaultComparator.is_significant(&new, &old));
    }

    #[test]
    fn time_and_location_are_significant() {
        let old = event();

        let mut moved = old.clone();
        moved.start = at(5, 9);
        assert!(DefaultComparator.is_significant(&moved, &old));

        let relocated = old.clone().with_location("Room 2");
        assert!(DefaultComparator.is_significant(&relocated, &old));
    }

    #[test]
    fn recurrence_changes_are_significant() {
        let old = event().with_recurrence(Recurrence::new("FREQ=DAILY;COUNT=5"));
        let mut new = old.clone();
        new.recurrence = Some(Recurrence::new("FREQ=DAILY;COUNT=3"));
        assert!(DefaultComparator.is_significant(&new, &old));

        let excluded = old
            .clone()
            .with_recurrence(Recurrence::new("FREQ=DAILY;COUNT=5").with_exdate(at(6, 10)));
        assert!(DefaultComparator.is_significant(&excluded, &old));
    }

    #[test]
    fn moved_occurrence_is_significant() {
        let old = event().with_recurrence(Recurrence::new("FREQ=DAILY;COUNT=5"));
        let mut instance = old.occurrence(at(6, 10)).unwrap();
        instance.title = "Renamed".to_string();
        let renamed = old.with_occurrence_applied(&instance).unwrap();

        // an override keeping the generated slot is not significant
        assert!(!DefaultComparator.is_significant(&renamed, &old));
        assert!(!DefaultComparator.is_significant(&old, &renamed));

        let mut moved_instance = instance.clone();
        moved_instance.start = at(6, 14);
        moved_instance.end = at(6, 15);
        let moved = renamed.with_occurrence_applied(&moved_instance).unwrap();
        assert!(DefaultComparator.is_significant(&moved, &renamed));

        let mut retitled = instance;
        retitled.title = "Renamed again".to_string();
        let retitled = renamed.with_occurrence_applied(&retitled).unwrap();
        assert!(!DefaultComparator.is_significant(&retitled, &renamed));
    }
}
