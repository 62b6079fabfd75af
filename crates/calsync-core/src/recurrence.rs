//! Recurring event model.
//!
//! A master carries a [`Recurrence`] (RRULE plus EXDATEs) and the overridden
//! occurrences in `exceptions`. Instances are generated on demand from the
//! master; all mutating helpers here operate on a master value the caller owns,
//! usually a clone taken before a speculative edit.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::CalendarEvent;
use crate::time::EventTime;

/// Errors raised by recurrence operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecurrenceError {
    /// The RRULE (or its DTSTART/EXDATE context) could not be parsed.
    #[error("invalid recurrence rule for event '{uid}': {message}")]
    InvalidRule { uid: String, message: String },

    /// The operation needs a recurring master.
    #[error("event '{0}' is not a recurring master")]
    NotRecurring(String),

    /// The operation needs an instance carrying a recurrence id.
    #[error("event '{0}' is not an instance of a recurring event")]
    NotAnInstance(String),
}

/// Recurrence definition of a master event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// RRULE value without the `RRULE:` prefix, e.g. `FREQ=WEEKLY;COUNT=4`.
    pub rrule: String,
    /// Excluded occurrence starts.
    pub exdates: Vec<EventTime>,
}

impl Recurrence {
    pub fn new(rrule: impl Into<String>) -> Self {
        Self {
            rrule: rrule.into(),
            exdates: Vec::new(),
        }
    }

    /// Builder method to exclude an occurrence.
    pub fn with_exdate(mut self, exdate: EventTime) -> Self {
        self.exdates.push(exdate);
        self
    }

    /// Returns true if the occurrence starting at `start` is excluded.
    pub fn is_excluded(&self, start: &EventTime) -> bool {
        self.exdates.contains(start)
    }
}

/// rrule wants datetimes, so all-day values become midnight UTC.
fn rrule_value(time: &EventTime) -> String {
    time.to_utc_datetime().format("%Y%m%dT%H%M%SZ").to_string()
}

fn rrule_set(master: &CalendarEvent, recurrence: &Recurrence) -> Result<RRuleSet, RecurrenceError> {
    let mut lines = vec![
        format!("DTSTART:{}", rrule_value(&master.start)),
        format!("RRULE:{}", recurrence.rrule),
    ];
    lines.extend(
        recurrence
            .exdates
            .iter()
            .map(|exdate| format!("EXDATE:{}", rrule_value(exdate))),
    );

    lines
        .join("\n")
        .parse::<RRuleSet>()
        .map_err(|e| RecurrenceError::InvalidRule {
            uid: master.uid.clone(),
            message: e.to_string(),
        })
}

impl CalendarEvent {
    /// Lists occurrence starts of this event, at most `limit` of them.
    ///
    /// Both bounds are inclusive and optional. EXDATEs are excluded. A
    /// non-recurring event (or an instance) yields its own start when it
    /// falls inside the range. The result is recomputed on every call.
    pub fn expand(
        &self,
        range_start: Option<DateTime<Utc>>,
        range_end: Option<DateTime<Utc>>,
        limit: u16,
    ) -> Result<Vec<EventTime>, RecurrenceError> {
        let Some(ref recurrence) = self.recurrence else {
            let start = self.start.to_utc_datetime();
            let inside = range_start.is_none_or(|s| start >= s) && range_end.is_none_or(|e| start <= e);
            return Ok(if inside && limit > 0 {
                vec![self.start]
            } else {
                Vec::new()
            });
        };

        let tz: rrule::Tz = Utc.into();
        let mut set = rrule_set(self, recurrence)?;
        // after/before are exclusive
        if let Some(start) = range_start {
            set = set.after((start - Duration::seconds(1)).with_timezone(&tz));
        }
        if let Some(end) = range_end {
            set = set.before((end + Duration::seconds(1)).with_timezone(&tz));
        }

        Ok(set
            .all(limit)
            .dates
            .iter()
            .map(|dt| self.start.with_instant(dt.with_timezone(&Utc)))
            .collect())
    }

    /// Returns the instance of this master for the given slot.
    ///
    /// A stored exception wins; otherwise the instance is generated from the
    /// master, keeping the master's duration.
    pub fn occurrence(&self, recurrence_id: EventTime) -> Result<CalendarEvent, RecurrenceError> {
        if self.recurrence.is_none() {
            return Err(RecurrenceError::NotRecurring(self.uid.clone()));
        }
        if let Some(exception) = self.exception_for(&recurrence_id) {
            return Ok(exception.clone());
        }

        let duration = self.end.to_utc_datetime() - self.start.to_utc_datetime();
        let mut instance = self.clone();
        instance.recurrence = None;
        instance.exceptions.clear();
        instance.recurrence_id = Some(recurrence_id);
        instance.is_exception = false;
        instance.grace_period_task_id = None;
        instance.start = recurrence_id;
        instance.end = recurrence_id.shifted_by(duration);
        Ok(instance)
    }

    /// Returns the stored exception for a slot.
    pub fn exception_for(&self, recurrence_id: &EventTime) -> Option<&CalendarEvent> {
        self.exceptions
            .iter()
            .find(|e| e.recurrence_id.as_ref() == Some(recurrence_id))
    }

    /// Excludes the instance's slot from this master.
    ///
    /// The slot is added to EXDATE once and any exception for it is dropped.
    pub fn delete_instance(&mut self, instance: &CalendarEvent) -> Result<(), RecurrenceError> {
        let rid = instance_slot(instance)?;
        let uid = self.uid.clone();
        let recurrence = self
            .recurrence
            .as_mut()
            .ok_or(RecurrenceError::NotRecurring(uid))?;

        if !recurrence.is_excluded(&rid) {
            recurrence.exdates.push(rid);
        }
        self.exceptions.retain(|e| e.recurrence_id != Some(rid));
        Ok(())
    }

    /// Applies (or reverts) one occurrence's override on this master.
    ///
    /// With `is_old` set, `instance` is a previous state being restored: when
    /// it was not an exception itself, the slot goes back to the generated
    /// occurrence and any exception for it is removed.
    pub fn modify_occurrence(
        &mut self,
        instance: &CalendarEvent,
        is_old: bool,
    ) -> Result<(), RecurrenceError> {
        let rid = instance_slot(instance)?;
        if self.recurrence.is_none() {
            return Err(RecurrenceError::NotRecurring(self.uid.clone()));
        }

        if is_old && !instance.is_exception {
            self.exceptions.retain(|e| e.recurrence_id != Some(rid));
            return Ok(());
        }

        let mut exception = instance.clone();
        exception.is_exception = true;
        exception.recurrence = None;
        exception.exceptions.clear();
        exception.grace_period_task_id = None;
        exception.path = self.path.clone();
        exception.etag = None;

        match self
            .exceptions
            .iter_mut()
            .find(|e| e.recurrence_id == Some(rid))
        {
            Some(existing) => *existing = exception,
            None => self.exceptions.push(exception),
        }
        Ok(())
    }

    /// Returns a copy of this master with the instance's override applied.
    pub fn with_occurrence_applied(
        &self,
        instance: &CalendarEvent,
    ) -> Result<CalendarEvent, RecurrenceError> {
        let mut master = self.clone();
        master.modify_occurrence(instance, false)?;
        Ok(master)
    }
}

fn instance_slot(instance: &CalendarEvent) -> Result<EventTime, RecurrenceError> {
    instance
        .recurrence_id
        .ok_or_else(|| RecurrenceError::NotAnInstance(instance.uid.clone()))
}
