//! Check-in window evaluation for weekly and one-off schedules.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::storage::models::Schedule;

/// How far ahead a closed schedule is searched for its next occurrence.
const LOOKAHEAD_DAYS: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Day of week counted from Sunday = 0.
    Weekly(u32),
    Once(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub recurrence: Recurrence,
    pub time_of_day: NaiveTime,
    pub start_offset_minutes: i32,
    /// `None` keeps check-in open until the end of the occurrence day.
    pub end_offset_minutes: Option<i32>,
    pub effective_start: Option<NaiveDate>,
    pub effective_end: Option<NaiveDate>,
}

impl From<&Schedule> for ScheduleSpec {
    fn from(s: &Schedule) -> Self {
        let recurrence = match (s.weekly_day_of_week, s.specific_date) {
            (Some(day), _) => Recurrence::Weekly(day.clamp(0, 6) as u32),
            (None, Some(date)) => Recurrence::Once(date),
            // Rejected by the table CHECK; treat as never occurring
            (None, None) => Recurrence::Once(NaiveDate::MIN),
        };
        ScheduleSpec {
            recurrence,
            time_of_day: s.weekly_time_of_day,
            start_offset_minutes: s.check_in_start_offset_minutes,
            end_offset_minutes: s.check_in_end_offset_minutes,
            effective_start: s.effective_start_date,
            effective_end: s.effective_end_date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    pub is_open: bool,
    /// The open occurrence's date, or the next upcoming one when closed.
    pub occurrence_date: Option<NaiveDate>,
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
}

impl WindowStatus {
    fn closed(next: Option<(NaiveDate, DateTime<Utc>, DateTime<Utc>)>) -> Self {
        WindowStatus {
            is_open: false,
            occurrence_date: next.map(|n| n.0),
            opens_at: next.map(|n| n.1),
            closes_at: next.map(|n| n.2),
        }
    }
}

impl ScheduleSpec {
    fn occurs_on(&self, date: NaiveDate) -> bool {
        let scheduled = match self.recurrence {
            Recurrence::Weekly(day) => date.weekday().num_days_from_sunday() == day,
            Recurrence::Once(d) => d == date,
        };
        scheduled
            && self.effective_start.is_none_or(|s| date >= s)
            && self.effective_end.is_none_or(|e| date <= e)
    }

    /// Check-in window `[open, close]` of the occurrence on `date`.
    pub fn window_on(&self, date: NaiveDate, tz: Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = localize(date.and_time(self.time_of_day), tz)?;
        let open = start - Duration::minutes(self.start_offset_minutes.into());
        let close = match self.end_offset_minutes {
            Some(m) => start + Duration::minutes(m.into()),
            None => {
                let next_day = date.checked_add_days(Days::new(1))?;
                localize(next_day.and_time(NaiveTime::MIN), tz)? - Duration::seconds(1)
            }
        };
        Some((open, close))
    }

    /// Evaluates the window at `now`. Yesterday and tomorrow are candidates
    /// too so windows crossing local midnight resolve to the right date.
    pub fn evaluate(&self, now: DateTime<Utc>, tz: Tz) -> WindowStatus {
        let today = now.with_timezone(&tz).date_naive();
        let candidates = [
            today.checked_sub_days(Days::new(1)),
            Some(today),
            today.checked_add_days(Days::new(1)),
        ];
        for date in candidates.into_iter().flatten() {
            if !self.occurs_on(date) {
                continue;
            }
            if let Some((open, close)) = self.window_on(date, tz)
                && open <= now
                && now <= close
            {
                return WindowStatus {
                    is_open: true,
                    occurrence_date: Some(date),
                    opens_at: Some(open),
                    closes_at: Some(close),
                };
            }
        }
        WindowStatus::closed(self.next_window(today, now, tz))
    }

    fn next_window(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Option<(NaiveDate, DateTime<Utc>, DateTime<Utc>)> {
        (0..=LOOKAHEAD_DAYS)
            .filter_map(|n| today.checked_add_days(Days::new(n)))
            .filter(|d| self.occurs_on(*d))
            .filter_map(|d| self.window_on(d, tz).map(|(o, c)| (d, o, c)))
            .find(|(_, open, _)| *open > now)
    }
}

/// Resolves a local wall-clock time, stepping over DST gaps.
fn localize(local: chrono::NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// The Sunday closing the service week that `date` belongs to.
pub fn sunday_date(date: NaiveDate) -> NaiveDate {
    let ahead = (7 - date.weekday().number_from_monday()) % 7;
    date.checked_add_days(Days::new(ahead.into())).unwrap_or(date)
}
