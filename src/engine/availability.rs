use chrono::{Datelike, NaiveDate};

use crate::model::*;

// ── Schedule evaluation ──────────────────────────────────────────

/// Opening hours of `room` on `date`: the spans of every window serving that
/// weekday, sorted and merged into disjoint intervals.
pub fn open_spans(room: &Room, date: NaiveDate) -> Vec<Span> {
    let day = date.weekday();
    let mut spans: Vec<Span> = room
        .schedule
        .iter()
        .filter(|w| w.serves(day))
        .filter_map(Window::span)
        .collect();
    spans.sort_by_key(|s| s.start);
    merge_overlapping(&spans)
}

/// Whether `span` on `date` falls inside the room's weekly schedule.
///
/// Under `SchedulePolicy::Day` only weekday membership counts. Under
/// `SchedulePolicy::Window` the range must also sit inside one of the merged
/// open spans, so two abutting windows (09–12, 12–17) admit 11:00–13:00.
/// An empty schedule is never available.
pub fn room_available(room: &Room, date: NaiveDate, span: &Span, policy: SchedulePolicy) -> bool {
    match policy {
        SchedulePolicy::Day => {
            let label = weekday_label(date);
            room.schedule.iter().any(|w| w.is_day_served(label))
        }
        SchedulePolicy::Window => open_spans(room, date)
            .iter()
            .any(|open| open.contains_span(span)),
    }
}

/// Bookable gaps on `date`: opening hours minus the room's active bookings.
pub fn free_spans(rs: &RoomState, date: NaiveDate) -> Vec<Span> {
    let open = open_spans(&rs.room, date);
    if open.is_empty() {
        return open;
    }
    // `on_date` yields bookings ordered by start
    let taken: Vec<Span> = rs
        .on_date(date)
        .filter(|b| b.is_active())
        .map(|b| b.span)
        .collect();
    if taken.is_empty() {
        return open;
    }
    subtract_intervals(&open, &merge_overlapping(&taken))
}

// ── Interval arithmetic ──────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted by start and disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use ulid::Ulid;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn sp(a: &str, b: &str) -> Span {
        Span::new(t(a), t(b))
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    // 2026-10-19 is a Monday.
    const MONDAY: &str = "2026-10-19";
    const TUESDAY: &str = "2026-10-20";

    fn window(days: &[Weekday], start: &str, end: &str) -> Window {
        Window {
            days: DaySet::from_days(days.iter().copied()),
            start: t(start),
            end: t(end),
        }
    }

    fn room_with(schedule: Vec<Window>) -> Room {
        let mut room = Room::new("E-101");
        room.schedule = schedule;
        room
    }

    fn booked(rs: &mut RoomState, d: &str, a: &str, b: &str, active: bool) {
        rs.insert_booking(Booking {
            id: Ulid::new(),
            building_id: rs.key.building_id,
            room: rs.key.room.clone(),
            date: date(d),
            span: sp(a, b),
            user_id: None,
            holder: UserSnapshot {
                name: "Ada".into(),
                email: "ada@campus.edu".into(),
                status: UserStatus::Student,
            },
            lifecycle: if active {
                Lifecycle::Active
            } else {
                Lifecycle::Canceled {
                    reason: "moved".into(),
                }
            },
        });
    }

    // ── interval arithmetic ──────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![sp("08:00", "09:00"), sp("10:00", "11:00")];
        let result = subtract_intervals(&base, &[sp("09:00", "10:00")]);
        assert_eq!(result, base);
    }

    #[test]
    fn subtract_full_overlap() {
        let result = subtract_intervals(&[sp("09:00", "10:00")], &[sp("08:00", "11:00")]);
        assert!(result.is_empty());
    }

    #[test]
    fn subtract_partial_edges() {
        assert_eq!(
            subtract_intervals(&[sp("09:00", "12:00")], &[sp("08:00", "10:00")]),
            vec![sp("10:00", "12:00")]
        );
        assert_eq!(
            subtract_intervals(&[sp("09:00", "12:00")], &[sp("11:00", "13:00")]),
            vec![sp("09:00", "11:00")]
        );
    }

    #[test]
    fn subtract_multiple_punches() {
        let result = subtract_intervals(
            &[sp("08:00", "18:00")],
            &[sp("09:00", "10:00"), sp("12:00", "13:00"), sp("16:00", "17:00")],
        );
        assert_eq!(
            result,
            vec![
                sp("08:00", "09:00"),
                sp("10:00", "12:00"),
                sp("13:00", "16:00"),
                sp("17:00", "18:00"),
            ]
        );
    }

    #[test]
    fn merge_overlapping_and_adjacent() {
        let merged = merge_overlapping(&[
            sp("09:00", "11:00"),
            sp("10:00", "12:00"),
            sp("12:00", "13:00"),
            sp("15:00", "16:00"),
        ]);
        assert_eq!(merged, vec![sp("09:00", "13:00"), sp("15:00", "16:00")]);
    }

    // ── room_available ───────────────────────────────────

    #[test]
    fn empty_schedule_is_never_available() {
        let room = room_with(vec![]);
        for policy in [SchedulePolicy::Day, SchedulePolicy::Window] {
            assert!(!room_available(&room, date(MONDAY), &sp("09:00", "10:00"), policy));
        }
    }

    #[test]
    fn window_with_no_days_never_matches() {
        let room = room_with(vec![window(&[], "00:00", "23:59")]);
        for policy in [SchedulePolicy::Day, SchedulePolicy::Window] {
            assert!(!room_available(&room, date(MONDAY), &sp("09:00", "10:00"), policy));
        }
    }

    #[test]
    fn day_policy_ignores_time_of_day() {
        let room = room_with(vec![window(&[Weekday::Mon], "09:00", "12:00")]);
        let evening = sp("20:00", "21:00");
        assert!(room_available(&room, date(MONDAY), &evening, SchedulePolicy::Day));
        assert!(!room_available(&room, date(TUESDAY), &evening, SchedulePolicy::Day));
    }

    #[test]
    fn window_policy_requires_containment() {
        let room = room_with(vec![window(&[Weekday::Mon], "09:00", "12:00")]);
        let p = SchedulePolicy::Window;
        assert!(room_available(&room, date(MONDAY), &sp("09:00", "12:00"), p));
        assert!(room_available(&room, date(MONDAY), &sp("10:00", "11:00"), p));
        assert!(!room_available(&room, date(MONDAY), &sp("11:30", "12:30"), p));
        assert!(!room_available(&room, date(MONDAY), &sp("08:00", "09:30"), p));
        assert!(!room_available(&room, date(TUESDAY), &sp("10:00", "11:00"), p));
    }

    #[test]
    fn window_policy_spans_abutting_windows() {
        let room = room_with(vec![
            window(&[Weekday::Mon], "12:00", "17:00"),
            window(&[Weekday::Mon, Weekday::Tue], "09:00", "12:00"),
        ]);
        let p = SchedulePolicy::Window;
        assert!(room_available(&room, date(MONDAY), &sp("11:00", "13:00"), p));
        assert!(!room_available(&room, date(TUESDAY), &sp("11:00", "13:00"), p));
    }

    #[test]
    fn open_spans_only_for_served_day() {
        let room = room_with(vec![
            window(&[Weekday::Mon], "14:00", "16:00"),
            window(&[Weekday::Mon], "09:00", "11:00"),
            window(&[Weekday::Tue], "08:00", "20:00"),
        ]);
        assert_eq!(
            open_spans(&room, date(MONDAY)),
            vec![sp("09:00", "11:00"), sp("14:00", "16:00")]
        );
        assert!(open_spans(&room, date("2026-10-21")).is_empty());
    }

    // ── free_spans ───────────────────────────────────────

    #[test]
    fn free_spans_subtract_active_bookings_only() {
        let room = room_with(vec![window(&[Weekday::Mon], "09:00", "17:00")]);
        let mut rs = RoomState::new(Ulid::new(), room);
        booked(&mut rs, MONDAY, "10:00", "11:00", true);
        booked(&mut rs, MONDAY, "13:00", "14:00", false);
        booked(&mut rs, TUESDAY, "09:00", "17:00", true);
        assert_eq!(
            free_spans(&rs, date(MONDAY)),
            vec![sp("09:00", "10:00"), sp("11:00", "17:00")]
        );
    }

    #[test]
    fn free_spans_fully_booked_is_empty() {
        let room = room_with(vec![window(&[Weekday::Mon], "09:00", "11:00")]);
        let mut rs = RoomState::new(Ulid::new(), room);
        booked(&mut rs, MONDAY, "09:00", "10:00", true);
        booked(&mut rs, MONDAY, "10:00", "11:00", true);
        assert!(free_spans(&rs, date(MONDAY)).is_empty());
    }
}
