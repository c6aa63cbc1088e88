use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::model::*;

use super::availability::{free_spans, room_available};
use super::conflict::has_conflict;
use super::{Engine, EngineError};

impl Engine {
    /// Names of the rooms in `building_id` that could take `span` on `date`,
    /// in the building's room order. A paused building has none.
    pub async fn query_available_rooms(
        &self,
        building_id: Ulid,
        date: NaiveDate,
        span: Span,
    ) -> Result<Vec<String>, EngineError> {
        let bs = self
            .building(&building_id)
            .ok_or(EngineError::NotFound(building_id))?;
        let building = bs.read().await;
        if building.info.paused {
            return Ok(Vec::new());
        }

        let mut available = Vec::new();
        for name in &building.rooms {
            let Some(rs) = self.room(&RoomKey::new(building_id, name.clone())) else {
                continue;
            };
            let guard = rs.read().await;
            if !guard.room.paused
                && room_available(&guard.room, date, &span, self.settings.policy)
                && !has_conflict(&guard, date, &span, true)
            {
                available.push(name.clone());
            }
        }
        Ok(available)
    }

    /// Free gaps in a room's opening hours on `date`.
    pub async fn open_slots(&self, key: &RoomKey, date: NaiveDate) -> Result<Vec<Span>, EngineError> {
        let bs = self
            .building(&key.building_id)
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;
        let building = bs.read().await;
        let rs = self
            .room(key)
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;
        let guard = rs.read().await;
        if building.info.paused || guard.room.paused {
            return Ok(Vec::new());
        }
        Ok(free_spans(&guard, date))
    }

    /// Bookings matching `filter`, ordered by date, start, building, room, id.
    /// `now` decides the upcoming/past split.
    pub async fn list_bookings(&self, filter: &BookingFilter, now: NaiveDateTime) -> Vec<Booking> {
        let handles: Vec<_> = match (&filter.building_id, &filter.room) {
            (Some(building_id), Some(room)) => self
                .room(&RoomKey::new(*building_id, room.clone()))
                .into_iter()
                .collect(),
            _ => self.room_arcs(),
        };

        let mut out = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            if filter.building_id.is_some_and(|id| id != guard.key.building_id) {
                continue;
            }
            out.extend(guard.bookings.iter().filter(|b| filter.matches(b, now)).cloned());
        }
        out.sort_by(|a, b| {
            (a.date, a.span.start, a.building_id, &a.room, a.id)
                .cmp(&(b.date, b.span.start, b.building_id, &b.room, b.id))
        });
        out
    }
}
