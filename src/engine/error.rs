use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{RoomKey, Span};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    RoomNotFound(RoomKey),
    AlreadyExists(String),
    UserNotFound(String),
    UserSuspended(String),
    BuildingPaused(Ulid),
    RoomPaused(RoomKey),
    OutsideSchedule {
        room: RoomKey,
        date: NaiveDate,
        span: Span,
    },
    Conflict(Ulid),
    Duplicate(Ulid),
    Invalid(String),
    Forbidden(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// The caller-facing kind of this failure.
    pub fn rejection(&self) -> Rejection {
        match self {
            EngineError::NotFound(_) | EngineError::RoomNotFound(_) => Rejection::NotFound,
            EngineError::UserNotFound(_) => Rejection::UserNotFound,
            EngineError::UserSuspended(_) => Rejection::UserSuspended,
            EngineError::BuildingPaused(_)
            | EngineError::RoomPaused(_)
            | EngineError::OutsideSchedule { .. } => Rejection::RoomUnavailable,
            EngineError::Conflict(_) => Rejection::Conflict,
            EngineError::Duplicate(_) => Rejection::Duplicate,
            EngineError::AlreadyExists(_)
            | EngineError::Invalid(_)
            | EngineError::LimitExceeded(_) => Rejection::Invalid,
            EngineError::Forbidden(_) => Rejection::Forbidden,
            EngineError::WalError(_) => Rejection::SystemError,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::RoomNotFound(key) => write!(f, "room not found: {key}"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::UserNotFound(email) => write!(f, "user not found: {email}"),
            EngineError::UserSuspended(email) => write!(f, "account suspended: {email}"),
            EngineError::BuildingPaused(id) => write!(f, "building {id} is paused"),
            EngineError::RoomPaused(key) => write!(f, "room {key} is paused"),
            EngineError::OutsideSchedule { room, date, span } => {
                write!(f, "room {room} is not open on {date} for {span}")
            }
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::Duplicate(id) => write!(f, "slot already booked by you: {id}"),
            EngineError::Invalid(msg) => write!(f, "invalid request: {msg}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Why an operation did not go through. Everything but `SystemError` is
/// something the caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UserNotFound,
    UserSuspended,
    RoomUnavailable,
    Conflict,
    Duplicate,
    NotFound,
    Invalid,
    Forbidden,
    SystemError,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::UserNotFound => "user_not_found",
            Rejection::UserSuspended => "user_suspended",
            Rejection::RoomUnavailable => "room_unavailable",
            Rejection::Conflict => "conflict",
            Rejection::Duplicate => "duplicate",
            Rejection::NotFound => "not_found",
            Rejection::Invalid => "invalid",
            Rejection::Forbidden => "forbidden",
            Rejection::SystemError => "system_error",
        }
    }
}

/// Result of a core booking operation as seen from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T = ()> {
    Confirmed(T),
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Outcome::Confirmed(_) => None,
            Outcome::Rejected(r) => Some(*r),
        }
    }
}
