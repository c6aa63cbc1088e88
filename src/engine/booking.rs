use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ulid::Ulid;

use crate::limits::MAX_BOOKINGS_PER_ROOM;
use crate::model::*;
use crate::notify::Notice;
use crate::observability::BOOKING_ATTEMPTS_TOTAL;

use super::availability::room_available;
use super::conflict::check_no_conflict;
use super::{into_outcome, validate, Engine, EngineError, Outcome};

/// Claims a booking id for the duration of a transaction so two concurrent
/// requests cannot both use it. Released unless the booking commits.
struct IdClaim<'a> {
    index: &'a DashMap<Ulid, RoomKey>,
    id: Ulid,
    committed: bool,
}

impl<'a> IdClaim<'a> {
    fn take(index: &'a DashMap<Ulid, RoomKey>, id: Ulid, key: &RoomKey) -> Result<Self, EngineError> {
        match index.entry(id) {
            Entry::Occupied(_) => Err(EngineError::Invalid(format!("booking id {id} already in use"))),
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
                Ok(Self {
                    index,
                    id,
                    committed: false,
                })
            }
        }
    }
}

impl Drop for IdClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.index.remove(&self.id);
        }
    }
}

impl Engine {
    /// Reserve a slot. The only path that creates bookings.
    pub async fn attempt_booking(&self, req: BookingRequest) -> Outcome<Ulid> {
        let result = self.try_attempt_booking(&req).await;
        let outcome = into_outcome(result, || {
            format!(
                "booking {} of {}/{} on {} {} for {}",
                req.id, req.building_id, req.room, req.date, req.span, req.user_email
            )
        });
        let label = outcome.rejection().map_or("confirmed", |r| r.as_str());
        metrics::counter!(BOOKING_ATTEMPTS_TOTAL, "outcome" => label).increment(1);
        outcome
    }

    pub(super) async fn try_attempt_booking(&self, req: &BookingRequest) -> Result<Ulid, EngineError> {
        let _gate = self.gate.read().await;

        let key = RoomKey::new(req.building_id, req.room.clone());
        let mut claim = IdClaim::take(&self.booking_to_room, req.id, &key)?;

        let email = validate::email(&req.user_email)?;
        let user = self
            .user_id_by_email(&email)
            .and_then(|id| self.users.get(&id).map(|u| u.value().clone()))
            .ok_or_else(|| EngineError::UserNotFound(email.clone()))?;
        if user.suspended {
            return Err(EngineError::UserSuspended(email));
        }

        let bs = self
            .building(&req.building_id)
            .ok_or(EngineError::NotFound(req.building_id))?;
        let building = bs.read().await;
        // an emptied room list means the building was deleted while we waited
        if !building.rooms.contains(&req.room) {
            return Err(EngineError::RoomNotFound(key));
        }
        if building.info.paused {
            return Err(EngineError::BuildingPaused(req.building_id));
        }

        let rs = self
            .room(&key)
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;
        let mut room = rs.write().await;
        if room.room.paused {
            return Err(EngineError::RoomPaused(key));
        }
        if !room_available(&room.room, req.date, &req.span, self.settings.policy) {
            return Err(EngineError::OutsideSchedule {
                room: key,
                date: req.date,
                span: req.span,
            });
        }
        if room.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        check_no_conflict(&room, req.date, &req.span, &email)?;

        let booking = Booking {
            id: req.id,
            building_id: req.building_id,
            room: req.room.clone(),
            date: req.date,
            span: req.span,
            user_id: Some(user.id),
            holder: user.snapshot(),
            lifecycle: Lifecycle::Active,
        };
        let event = Event::BookingConfirmed { booking };
        self.persist_and_apply(&mut room, &event).await?;
        claim.committed = true;

        self.dispatch(Notice::BookingConfirmed {
            booking_id: req.id,
            email: user.email,
            name: user.name,
            building: building.info.name.clone(),
            room: req.room.clone(),
            date: req.date,
            span: req.span,
        });
        Ok(req.id)
    }

    /// Soft-cancel a booking. Repeating the call only replaces the reason;
    /// the holder is notified once.
    pub async fn cancel_booking(&self, id: Ulid, reason: &str) -> Outcome {
        let result = self.try_cancel_booking(id, reason).await;
        into_outcome(result, || format!("cancel booking {id}"))
    }

    pub(super) async fn try_cancel_booking(&self, id: Ulid, reason: &str) -> Result<(), EngineError> {
        validate::reason(reason)?;
        let _gate = self.gate.read().await;
        let (building, mut room) = self.resolve_booking_write(id).await?;

        let was_active = room.booking(id).is_some_and(Booking::is_active);
        let event = Event::BookingCancelled {
            id,
            building_id: room.key.building_id,
            room: room.key.room.clone(),
            reason: reason.to_string(),
        };
        self.persist_and_apply(&mut room, &event).await?;

        if was_active && let Some(b) = room.booking(id) {
            self.dispatch(Notice::BookingCancelled {
                booking_id: id,
                email: b.holder.email.clone(),
                name: b.holder.name.clone(),
                building: building.info.name.clone(),
                room: b.room.clone(),
                date: b.date,
                span: b.span,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    /// Remove a booking for good.
    pub async fn delete_booking(&self, id: Ulid) -> Outcome {
        let result = self.try_delete_booking(id).await;
        into_outcome(result, || format!("delete booking {id}"))
    }

    pub(super) async fn try_delete_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.gate.read().await;
        let (_building, mut room) = self.resolve_booking_write(id).await?;
        let event = Event::BookingDeleted {
            id,
            building_id: room.key.building_id,
            room: room.key.room.clone(),
        };
        self.persist_and_apply(&mut room, &event).await
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let key = self.booking_to_room.get(&id).map(|e| e.value().clone())?;
        let rs = self.room(&key)?;
        let guard = rs.read().await;
        guard.booking(id).cloned()
    }
}
