use tokio::sync::oneshot;

use crate::model::*;

use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Rewrite the WAL as the minimal event set that rebuilds the current state.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        // exclusive: no mutation is between its WAL append and its apply
        let _gate = self.gate.write().await;

        let mut events: Vec<Event> = self
            .list_users()
            .into_iter()
            .map(|user| Event::UserRegistered { user })
            .collect();

        let buildings: Vec<_> = self.buildings.iter().map(|e| e.value().clone()).collect();
        for bs in buildings {
            let building = bs.read().await;
            events.push(Event::BuildingCreated {
                building: building.info.clone(),
            });
            let mut bookings = Vec::new();
            for name in &building.rooms {
                let Some(rs) = self.room(&RoomKey::new(building.info.id, name.clone())) else {
                    continue;
                };
                let room = rs.read().await;
                events.push(Event::RoomCreated {
                    building_id: building.info.id,
                    room: room.room.clone(),
                });
                bookings.extend(room.bookings.iter().cloned());
            }
            events.extend(bookings.into_iter().map(|booking| Event::BookingConfirmed { booking }));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        Ok(count)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
