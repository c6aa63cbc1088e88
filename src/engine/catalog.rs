use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{apply_to_building, validate, Engine, EngineError};

/// Building fields to change. `None` keeps the current value; the nested
/// options can clear a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildingPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub floors: Option<u32>,
    pub basement: Option<bool>,
    pub image: Option<Option<String>>,
    pub paused: Option<bool>,
}

impl BuildingPatch {
    fn apply(self, b: &mut Building) {
        if let Some(v) = self.name {
            b.name = v;
        }
        if let Some(v) = self.description {
            b.description = v;
        }
        if let Some(v) = self.floors {
            b.floors = v;
        }
        if let Some(v) = self.basement {
            b.basement = v;
        }
        if let Some(v) = self.image {
            b.image = v;
        }
        if let Some(v) = self.paused {
            b.paused = v;
        }
    }
}

/// Room fields to change. The name is the room's key and cannot change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub description: Option<Option<String>>,
    pub seats: Option<u32>,
    pub amenities: Option<BTreeSet<Amenity>>,
    pub image: Option<Option<String>>,
    pub paused: Option<bool>,
    pub schedule: Option<Vec<Window>>,
}

impl RoomPatch {
    fn apply(self, r: &mut Room) {
        if let Some(v) = self.description {
            r.description = v;
        }
        if let Some(v) = self.seats {
            r.seats = v;
        }
        if let Some(v) = self.amenities {
            r.amenities = v;
        }
        if let Some(v) = self.image {
            r.image = v;
        }
        if let Some(v) = self.paused {
            r.paused = v;
        }
        if let Some(v) = self.schedule {
            r.schedule = v;
        }
    }
}

fn validate_building(b: &Building) -> Result<(), EngineError> {
    validate::name("building name", &b.name)?;
    validate::text(b.description.as_deref())?;
    validate::text(b.image.as_deref())
}

fn validate_room(r: &Room) -> Result<(), EngineError> {
    validate::name("room name", &r.name)?;
    validate::text(r.description.as_deref())?;
    validate::text(r.image.as_deref())?;
    validate::schedule(&r.schedule)
}

impl Engine {
    // ── Buildings ────────────────────────────────────────

    pub async fn create_building(&self, building: Building) -> Result<(), EngineError> {
        validate_building(&building)?;
        let _gate = self.gate.read().await;
        let _catalog = self.catalog_lock.lock().await;
        if self.buildings.len() >= MAX_BUILDINGS {
            return Err(EngineError::LimitExceeded("too many buildings"));
        }
        if self.buildings.contains_key(&building.id) {
            return Err(EngineError::AlreadyExists(building.id.to_string()));
        }

        let event = Event::BuildingCreated {
            building: building.clone(),
        };
        self.wal_append(&event).await?;
        self.buildings
            .insert(building.id, Arc::new(RwLock::new(BuildingState::new(building))));
        Ok(())
    }

    pub async fn update_building(&self, id: Ulid, patch: BuildingPatch) -> Result<Building, EngineError> {
        let _gate = self.gate.read().await;
        let bs = self.building(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = bs.write().await;

        let mut building = guard.info.clone();
        patch.apply(&mut building);
        validate_building(&building)?;

        let event = Event::BuildingUpdated {
            building: building.clone(),
        };
        self.wal_append(&event).await?;
        apply_to_building(&mut guard, &event);
        Ok(building)
    }

    /// Remove a building, its rooms and every booking in them.
    pub async fn delete_building(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.gate.read().await;
        let _catalog = self.catalog_lock.lock().await;
        let bs = self.building(&id).ok_or(EngineError::NotFound(id))?;
        let mut building = bs.write().await;

        let mut rooms = Vec::with_capacity(building.rooms.len());
        for name in &building.rooms {
            if let Some(rs) = self.room(&RoomKey::new(id, name.clone())) {
                rooms.push(rs.write_owned().await);
            }
        }

        self.wal_append(&Event::BuildingDeleted { id }).await?;
        for room in &mut rooms {
            self.detach_room(room);
        }
        building.rooms.clear();
        self.buildings.remove(&id);
        Ok(())
    }

    pub async fn get_building(&self, id: Ulid) -> Option<Building> {
        let bs = self.building(&id)?;
        let guard = bs.read().await;
        Some(guard.info.clone())
    }

    /// Buildings ordered by name. Paused ones only when asked for.
    pub async fn list_buildings(&self, include_paused: bool) -> Vec<Building> {
        let handles: Vec<_> = self.buildings.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(handles.len());
        for bs in handles {
            let guard = bs.read().await;
            if include_paused || !guard.info.paused {
                out.push(guard.info.clone());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    // ── Rooms ────────────────────────────────────────────

    pub async fn create_room(&self, building_id: Ulid, room: Room) -> Result<(), EngineError> {
        validate_room(&room)?;
        let _gate = self.gate.read().await;
        let bs = self
            .building(&building_id)
            .ok_or(EngineError::NotFound(building_id))?;
        let mut building = bs.write().await;
        if building.rooms.len() >= MAX_ROOMS_PER_BUILDING {
            return Err(EngineError::LimitExceeded("too many rooms in building"));
        }
        if building.rooms.contains(&room.name) {
            return Err(EngineError::AlreadyExists(
                RoomKey::new(building_id, room.name).to_string(),
            ));
        }

        let event = Event::RoomCreated {
            building_id,
            room: room.clone(),
        };
        self.wal_append(&event).await?;
        apply_to_building(&mut building, &event);
        let rs = RoomState::new(building_id, room);
        self.rooms.insert(rs.key.clone(), Arc::new(RwLock::new(rs)));
        Ok(())
    }

    pub async fn update_room(&self, key: &RoomKey, patch: RoomPatch) -> Result<Room, EngineError> {
        let _gate = self.gate.read().await;
        let bs = self
            .building(&key.building_id)
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;
        let building = bs.read().await;
        if !building.rooms.contains(&key.room) {
            return Err(EngineError::RoomNotFound(key.clone()));
        }
        let rs = self
            .room(key)
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;
        let mut guard = rs.write().await;

        let mut room = guard.room.clone();
        patch.apply(&mut room);
        validate_room(&room)?;

        let event = Event::RoomUpdated {
            building_id: key.building_id,
            room: room.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(room)
    }

    /// Remove a room and hard-delete its bookings.
    pub async fn delete_room(&self, key: &RoomKey) -> Result<(), EngineError> {
        let _gate = self.gate.read().await;
        let bs = self
            .building(&key.building_id)
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;
        let mut building = bs.write().await;
        if !building.rooms.contains(&key.room) {
            return Err(EngineError::RoomNotFound(key.clone()));
        }
        let rs = self
            .room(key)
            .ok_or_else(|| EngineError::RoomNotFound(key.clone()))?;
        let mut guard = rs.write().await;

        let event = Event::RoomDeleted {
            building_id: key.building_id,
            name: key.room.clone(),
        };
        self.wal_append(&event).await?;
        apply_to_building(&mut building, &event);
        self.detach_room(&mut guard);
        Ok(())
    }

    pub async fn get_room(&self, key: &RoomKey) -> Option<Room> {
        let rs = self.room(key)?;
        let guard = rs.read().await;
        Some(guard.room.clone())
    }

    /// Rooms of a building in creation order.
    pub async fn list_rooms(&self, building_id: Ulid) -> Result<Vec<Room>, EngineError> {
        let bs = self
            .building(&building_id)
            .ok_or(EngineError::NotFound(building_id))?;
        let building = bs.read().await;
        let mut rooms = Vec::with_capacity(building.rooms.len());
        for name in &building.rooms {
            if let Some(rs) = self.room(&RoomKey::new(building_id, name.clone())) {
                rooms.push(rs.read().await.room.clone());
            }
        }
        Ok(rooms)
    }
}
