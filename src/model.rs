use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

// ── Time of day ──────────────────────────────────────────────────

/// Wall-clock time at minute granularity. Parsed from and rendered as
/// exactly five characters, `"HH:MM"`, so ordering matches the string form.
/// The range is `00:00..=23:59`; there is no `24:00`, so nothing can run
/// through the last minute before midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self(hour * 60 + minute))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(u32::from(self.0) * 60, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError(pub String);

impl fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time {:?}: expected HH:MM", self.0)
    }
}

impl std::error::Error for TimeParseError {}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        let well_formed = b.len() == 5
            && b[2] == b':'
            && [0, 1, 3, 4].iter().all(|&i| b[i].is_ascii_digit());
        if !well_formed {
            return Err(TimeParseError(s.to_string()));
        }
        let digit = |i: usize| u16::from(b[i] - b'0');
        let hour = digit(0) * 10 + digit(1);
        let minute = digit(3) * 10 + digit(4);
        Self::from_hm(hour, minute).ok_or_else(|| TimeParseError(s.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Half-open interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Span {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ── Weekdays and schedules ───────────────────────────────────────

const WEEK: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

pub fn day_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Sun",
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
    }
}

/// Three-letter weekday label of `date` ("Mon", "Tue", ...), locale independent.
pub fn weekday_label(date: NaiveDate) -> &'static str {
    day_label(date.weekday())
}

/// Parse a three-letter weekday label, case-insensitively.
pub fn parse_day_label(label: &str) -> Option<Weekday> {
    WEEK.iter()
        .copied()
        .find(|d| day_label(*d).eq_ignore_ascii_case(label))
}

/// Set of weekdays, one bit per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DaySet(u8);

impl DaySet {
    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut set = Self::default();
        for day in days {
            set.insert(day);
        }
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_sunday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Days in Sun..Sat order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.iter().copied().filter(|d| self.contains(*d))
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.iter().map(day_label).collect()
    }
}

impl Serialize for DaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let labels = self.labels();
        let mut seq = serializer.serialize_seq(Some(labels.len()))?;
        for label in labels {
            seq.serialize_element(label)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for DaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let labels = Vec::<String>::deserialize(deserializer)?;
        let mut set = DaySet::default();
        for label in &labels {
            let day = parse_day_label(label)
                .ok_or_else(|| de::Error::custom(format!("unknown weekday label: {label}")))?;
            set.insert(day);
        }
        Ok(set)
    }
}

/// A recurring weekly availability rule: bookable on `days` between `start` and `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub days: DaySet,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Window {
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    pub fn span(&self) -> Option<Span> {
        Span::try_new(self.start, self.end)
    }

    pub fn serves(&self, day: Weekday) -> bool {
        self.days.contains(day)
    }

    /// True if `label` names one of the weekdays this window serves.
    /// Unknown labels are never served.
    pub fn is_day_served(&self, label: &str) -> bool {
        parse_day_label(label).is_some_and(|d| self.serves(d))
    }
}

/// How strictly a room's schedule gates a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulePolicy {
    /// Weekday membership only; the time of day is not checked.
    Day,
    /// Weekday membership and containment of the requested range in the window.
    #[default]
    Window,
}

impl FromStr for SchedulePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(SchedulePolicy::Day),
            "window" => Ok(SchedulePolicy::Window),
            other => Err(format!("unknown schedule policy: {other} (expected day or window)")),
        }
    }
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Amenity {
    Projector,
    Whiteboard,
    Tv,
}

impl Amenity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Amenity::Projector => "projector",
            Amenity::Whiteboard => "whiteboard",
            Amenity::Tv => "tv",
        }
    }
}

impl FromStr for Amenity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "projector" => Ok(Amenity::Projector),
            "whiteboard" => Ok(Amenity::Whiteboard),
            "tv" => Ok(Amenity::Tv),
            other => Err(format!("unknown amenity: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: Ulid,
    pub name: String,
    pub description: Option<String>,
    pub floors: u32,
    pub basement: bool,
    pub image: Option<String>,
    /// Suspends new bookings in every room of the building.
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub description: Option<String>,
    pub seats: u32,
    pub amenities: BTreeSet<Amenity>,
    pub image: Option<String>,
    pub paused: bool,
    pub schedule: Vec<Window>,
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            seats: 0,
            amenities: BTreeSet::new(),
            image: None,
            paused: false,
            schedule: Vec::new(),
        }
    }
}

/// Rooms are addressed by building and name; bookings carry the name, not an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomKey {
    pub building_id: Ulid,
    pub room: String,
}

impl RoomKey {
    pub fn new(building_id: Ulid, room: impl Into<String>) -> Self {
        Self {
            building_id,
            room: room.into(),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.building_id, self.room)
    }
}

#[derive(Debug, Clone)]
pub struct BuildingState {
    pub info: Building,
    /// Room names in creation order.
    pub rooms: Vec<String>,
}

impl BuildingState {
    pub fn new(info: Building) -> Self {
        Self {
            info,
            rooms: Vec::new(),
        }
    }
}

// ── Directory ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserStatus {
    Faculty,
    Student,
    Staff,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Faculty => "Faculty",
            UserStatus::Student => "Student",
            UserStatus::Staff => "Staff",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "faculty" => Ok(UserStatus::Faculty),
            "student" => Ok(UserStatus::Student),
            "staff" => Ok(UserStatus::Staff),
            other => Err(format!("unknown user status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    /// Natural key; never changes after registration.
    pub email: String,
    pub phone: String,
    pub status: UserStatus,
    pub role: Role,
    pub suspended: bool,
    pub suspension_reason: String,
    /// Login secret, stored as given. Never returned by queries.
    pub password: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            name: self.name.clone(),
            email: self.email.clone(),
            status: self.status,
        }
    }
}

/// Copy of the holder's identity taken at booking time. Not kept in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub name: String,
    pub email: String,
    pub status: UserStatus,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    /// Keeps its interval for display; ignored by conflict checks.
    Canceled { reason: String },
}

impl Lifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub building_id: Ulid,
    pub room: String,
    pub date: NaiveDate,
    pub span: Span,
    /// Weak reference: cleared when the user is deleted.
    pub user_id: Option<Ulid>,
    pub holder: UserSnapshot,
    pub lifecycle: Lifecycle,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        match &self.lifecycle {
            Lifecycle::Active => None,
            Lifecycle::Canceled { reason } => Some(reason),
        }
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.span.end.to_naive_time())
    }

    /// Same slot, same holder: the "you already booked this" case.
    pub fn is_same_slot_for(&self, date: NaiveDate, span: &Span, email: &str) -> bool {
        self.date == date && self.span == *span && self.holder.email == email
    }
}

/// Request to book a slot. `id` is chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub id: Ulid,
    pub building_id: Ulid,
    pub room: String,
    pub date: NaiveDate,
    pub span: Span,
    pub user_email: String,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub key: RoomKey,
    pub room: Room,
    /// All bookings for this room (active and canceled), sorted by `(date, span.start)`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(building_id: Ulid, room: Room) -> Self {
        Self {
            key: RoomKey::new(building_id, room.name.clone()),
            room,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by `(date, span.start)`.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = (booking.date, booking.span.start);
        let pos = self
            .bookings
            .partition_point(|b| (b.date, b.span.start) <= key);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings on `date`, found by binary search over the sorted ledger.
    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Booking> {
        let lo = self.bookings.partition_point(|b| b.date < date);
        let hi = self.bookings.partition_point(|b| b.date <= date);
        self.bookings[lo..hi].iter()
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        user: User,
    },
    UserUpdated {
        id: Ulid,
        name: String,
        phone: String,
        password: String,
    },
    UserSuspended {
        id: Ulid,
        suspended: bool,
        reason: String,
    },
    UserRoleChanged {
        id: Ulid,
        role: Role,
    },
    UserDeleted {
        id: Ulid,
    },
    BuildingCreated {
        building: Building,
    },
    BuildingUpdated {
        building: Building,
    },
    BuildingDeleted {
        id: Ulid,
    },
    RoomCreated {
        building_id: Ulid,
        room: Room,
    },
    RoomUpdated {
        building_id: Ulid,
        room: Room,
    },
    RoomDeleted {
        building_id: Ulid,
        name: String,
    },
    BookingConfirmed {
        booking: Booking,
    },
    BookingCancelled {
        id: Ulid,
        building_id: Ulid,
        room: String,
        reason: String,
    },
    BookingDeleted {
        id: Ulid,
        building_id: Ulid,
        room: String,
    },
}

// ── Query filters ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Upcoming,
    Past,
    #[default]
    All,
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upcoming" => Ok(Period::Upcoming),
            "past" => Ok(Period::Past),
            "all" => Ok(Period::All),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub user_email: Option<String>,
    pub building_id: Option<Ulid>,
    pub room: Option<String>,
    pub canceled: Option<bool>,
    pub user_status: Option<UserStatus>,
    pub period: Period,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking, now: NaiveDateTime) -> bool {
        if let Some(email) = &self.user_email
            && !booking.holder.email.eq_ignore_ascii_case(email) {
                return false;
            }
        if self.building_id.is_some_and(|id| id != booking.building_id) {
            return false;
        }
        if self.room.as_ref().is_some_and(|r| *r != booking.room) {
            return false;
        }
        if self.canceled.is_some_and(|c| c == booking.is_active()) {
            return false;
        }
        if self.user_status.is_some_and(|s| s != booking.holder.status) {
            return false;
        }
        match self.period {
            Period::Upcoming => booking.ends_at() > now,
            Period::Past => booking.ends_at() <= now,
            Period::All => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn booking_on(d: &str, start: &str, end: &str) -> Booking {
        Booking {
            id: Ulid::new(),
            building_id: Ulid::new(),
            room: "101".into(),
            date: date(d),
            span: Span::new(t(start), t(end)),
            user_id: None,
            holder: UserSnapshot {
                name: "Ada".into(),
                email: "ada@campus.edu".into(),
                status: UserStatus::Faculty,
            },
            lifecycle: Lifecycle::Active,
        }
    }

    #[test]
    fn time_parse_accepts_only_hh_mm() {
        assert_eq!(t("09:05").minutes(), 545);
        assert_eq!(t("00:00").minutes(), 0);
        assert_eq!(t("23:59").minutes(), 1439);
        for bad in ["9:05", "09:5", "24:00", "12:60", "0905", "09:05:00", "ab:cd", " 9:05", ""] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn time_display_is_zero_padded() {
        assert_eq!(t("07:03").to_string(), "07:03");
        assert_eq!(TimeOfDay::from_hm(0, 0).unwrap().to_string(), "00:00");
    }

    #[test]
    fn time_order_matches_string_order() {
        let mut times = ["17:00", "09:30", "09:05", "00:00", "23:59", "10:00"];
        let mut parsed: Vec<TimeOfDay> = times.iter().map(|s| t(s)).collect();
        times.sort();
        parsed.sort();
        let rendered: Vec<String> = parsed.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, times);
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(t("09:00"), t("10:00"));
        let b = Span::new(t("09:30"), t("10:30"));
        let c = Span::new(t("10:00"), t("11:00"));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // touching, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_try_new_rejects_empty_and_inverted() {
        assert!(Span::try_new(t("10:00"), t("10:00")).is_none());
        assert!(Span::try_new(t("11:00"), t("10:00")).is_none());
        assert!(Span::try_new(t("10:00"), t("10:01")).is_some());
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(t("09:00"), t("17:00"));
        assert!(outer.contains_span(&Span::new(t("09:00"), t("17:00"))));
        assert!(outer.contains_span(&Span::new(t("10:00"), t("11:00"))));
        assert!(!outer.contains_span(&Span::new(t("16:30"), t("17:30"))));
    }

    #[test]
    fn weekday_label_is_three_letters() {
        assert_eq!(weekday_label(date("2026-10-19")), "Mon");
        assert_eq!(weekday_label(date("2026-10-20")), "Tue");
        assert_eq!(weekday_label(date("2026-10-25")), "Sun");
    }

    #[test]
    fn window_day_membership() {
        let w = Window {
            days: DaySet::from_days([Weekday::Mon, Weekday::Wed, Weekday::Fri]),
            start: t("09:00"),
            end: t("17:00"),
        };
        assert!(w.is_day_served("Mon"));
        assert!(w.is_day_served("wed"));
        assert!(!w.is_day_served("Tue"));
        assert!(!w.is_day_served("Monday"));
        assert!(!w.is_day_served(""));

        let empty = Window {
            days: DaySet::default(),
            start: t("09:00"),
            end: t("17:00"),
        };
        assert!(WEEK.iter().all(|d| !empty.is_day_served(day_label(*d))));
    }

    #[test]
    fn schedule_json_shape() {
        let json = r#"[{"days":["Mon","Fri"],"start":"09:00","end":"17:00"}]"#;
        let schedule: Vec<Window> = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].days.labels(), vec!["Mon", "Fri"]);
        assert_eq!(serde_json::to_string(&schedule).unwrap(), json);

        let bad = r#"[{"days":["Funday"],"start":"09:00","end":"17:00"}]"#;
        assert!(serde_json::from_str::<Vec<Window>>(bad).is_err());
        let bad_time = r#"[{"days":["Mon"],"start":"9:00","end":"17:00"}]"#;
        assert!(serde_json::from_str::<Vec<Window>>(bad_time).is_err());
    }

    #[test]
    fn room_ledger_stays_sorted() {
        let mut rs = RoomState::new(Ulid::new(), Room::new("101"));
        rs.insert_booking(booking_on("2026-10-20", "09:00", "10:00"));
        rs.insert_booking(booking_on("2026-10-19", "14:00", "15:00"));
        rs.insert_booking(booking_on("2026-10-19", "08:00", "09:00"));
        let order: Vec<(NaiveDate, String)> = rs
            .bookings
            .iter()
            .map(|b| (b.date, b.span.start.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (date("2026-10-19"), "08:00".to_string()),
                (date("2026-10-19"), "14:00".to_string()),
                (date("2026-10-20"), "09:00".to_string()),
            ]
        );
    }

    #[test]
    fn on_date_selects_single_day() {
        let mut rs = RoomState::new(Ulid::new(), Room::new("101"));
        rs.insert_booking(booking_on("2026-10-18", "09:00", "10:00"));
        rs.insert_booking(booking_on("2026-10-19", "09:00", "10:00"));
        rs.insert_booking(booking_on("2026-10-19", "11:00", "12:00"));
        rs.insert_booking(booking_on("2026-10-20", "09:00", "10:00"));
        assert_eq!(rs.on_date(date("2026-10-19")).count(), 2);
        assert_eq!(rs.on_date(date("2026-10-21")).count(), 0);
    }

    #[test]
    fn remove_booking_by_id() {
        let mut rs = RoomState::new(Ulid::new(), Room::new("101"));
        let b = booking_on("2026-10-19", "09:00", "10:00");
        let id = b.id;
        rs.insert_booking(b);
        assert!(rs.remove_booking(Ulid::new()).is_none());
        assert_eq!(rs.remove_booking(id).map(|b| b.id), Some(id));
        assert!(rs.bookings.is_empty());
    }

    #[test]
    fn filter_by_period_uses_end_instant() {
        let b = booking_on("2026-10-19", "09:00", "10:00");
        let during = date("2026-10-19").and_hms_opt(9, 30, 0).unwrap();
        let after = date("2026-10-19").and_hms_opt(10, 0, 0).unwrap();
        let upcoming = BookingFilter {
            period: Period::Upcoming,
            ..Default::default()
        };
        let past = BookingFilter {
            period: Period::Past,
            ..Default::default()
        };
        assert!(upcoming.matches(&b, during));
        assert!(!upcoming.matches(&b, after));
        assert!(past.matches(&b, after));
    }

    #[test]
    fn filter_by_lifecycle_and_status() {
        let mut b = booking_on("2026-10-19", "09:00", "10:00");
        let now = date("2026-01-01").and_hms_opt(0, 0, 0).unwrap();
        let canceled_only = BookingFilter {
            canceled: Some(true),
            ..Default::default()
        };
        assert!(!canceled_only.matches(&b, now));
        b.lifecycle = Lifecycle::Canceled {
            reason: "moved".into(),
        };
        assert!(canceled_only.matches(&b, now));

        let students = BookingFilter {
            user_status: Some(UserStatus::Student),
            ..Default::default()
        };
        assert!(!students.matches(&b, now));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingConfirmed {
            booking: booking_on("2026-10-19", "09:00", "10:00"),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
