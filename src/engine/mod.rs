mod availability;
mod booking;
mod catalog;
mod compaction;
mod conflict;
mod directory;
mod error;
mod queries;
mod validate;

pub use availability::{free_spans, merge_overlapping, open_spans, room_available, subtract_intervals};
pub use catalog::{BuildingPatch, RoomPatch};
pub use conflict::has_conflict;
pub use directory::UserPatch;
pub use error::{EngineError, Outcome, Rejection};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, warn};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{NotificationSink, Notice};
use crate::observability::{NOTIFY_FAILURES_TOTAL, WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

pub type SharedBuildingState = Arc<RwLock<BuildingState>>;
pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Runtime knobs the engine needs from configuration.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub policy: SchedulePolicy,
    /// Account that is always registered with the admin role.
    pub admin_email: Option<String>,
    /// Initial password for the admin account when it has to be created.
    pub admin_password: Option<String>,
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that arrive while a batch is being collected share
/// one fsync; a non-append command first flushes the batch in front of it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // flush regardless so a failed batch leaves nothing buffered behind
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Engine ───────────────────────────────────────────────

/// In-memory booking state fronting the WAL.
///
/// Lock order is always building, then room. Every mutating method holds
/// `gate` for reading for its whole duration; compaction takes it for writing
/// to see a state no mutation is halfway through. Mutating methods must not
/// call each other while holding it.
pub struct Engine {
    pub(super) buildings: DashMap<Ulid, SharedBuildingState>,
    pub(super) rooms: DashMap<RoomKey, SharedRoomState>,
    pub(super) users: DashMap<Ulid, User>,
    /// Lowercased email → user id.
    pub(super) emails: DashMap<String, Ulid>,
    pub(super) booking_to_room: DashMap<Ulid, RoomKey>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) sink: Arc<dyn NotificationSink>,
    pub(super) settings: Settings,
    pub(super) gate: RwLock<()>,
    /// Serializes directory writes so the email index stays unique.
    pub(super) directory_lock: Mutex<()>,
    /// Serializes building creation and removal.
    pub(super) catalog_lock: Mutex<()>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the writer task. Must be called
    /// inside a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        sink: Arc<dyn NotificationSink>,
        settings: Settings,
    ) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            buildings: DashMap::new(),
            rooms: DashMap::new(),
            users: DashMap::new(),
            emails: DashMap::new(),
            booking_to_room: DashMap::new(),
            wal_tx,
            sink,
            settings,
            gate: RwLock::new(()),
            directory_lock: Mutex::new(()),
            catalog_lock: Mutex::new(()),
        };
        for event in &events {
            engine.replay_event(event);
        }
        debug!(
            "replayed {} events: {} users, {} buildings, {} rooms, {} bookings",
            events.len(),
            engine.users.len(),
            engine.buildings.len(),
            engine.rooms.len(),
            engine.booking_to_room.len()
        );
        Ok(engine)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply a logged event during startup. Nothing else holds the locks yet,
    /// so every `try_write` succeeds.
    fn replay_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { .. }
            | Event::UserUpdated { .. }
            | Event::UserSuspended { .. }
            | Event::UserRoleChanged { .. } => self.apply_directory(event),
            Event::UserDeleted { id } => {
                self.apply_directory(event);
                for rs in self.room_arcs() {
                    if let Ok(mut rs) = rs.try_write() {
                        clear_user_refs(&mut rs, *id);
                    }
                }
            }
            Event::BuildingCreated { building } => {
                self.buildings.insert(
                    building.id,
                    Arc::new(RwLock::new(BuildingState::new(building.clone()))),
                );
            }
            Event::BuildingUpdated { building } => {
                if let Some(bs) = self.building(&building.id)
                    && let Ok(mut bs) = bs.try_write()
                {
                    apply_to_building(&mut bs, event);
                }
            }
            Event::BuildingDeleted { id } => {
                let Some(bs) = self.building(id) else { return };
                if let Ok(mut bs) = bs.try_write() {
                    for name in std::mem::take(&mut bs.rooms) {
                        if let Some(rs) = self.room(&RoomKey::new(*id, name))
                            && let Ok(mut rs) = rs.try_write()
                        {
                            self.detach_room(&mut rs);
                        }
                    }
                }
                self.buildings.remove(id);
            }
            Event::RoomCreated { building_id, room } => {
                let Some(bs) = self.building(building_id) else { return };
                if let Ok(mut bs) = bs.try_write() {
                    apply_to_building(&mut bs, event);
                    let rs = RoomState::new(*building_id, room.clone());
                    self.rooms.insert(rs.key.clone(), Arc::new(RwLock::new(rs)));
                }
            }
            Event::RoomDeleted { building_id, name } => {
                if let Some(bs) = self.building(building_id)
                    && let Ok(mut bs) = bs.try_write()
                {
                    apply_to_building(&mut bs, event);
                }
                if let Some(rs) = self.room(&RoomKey::new(*building_id, name.clone()))
                    && let Ok(mut rs) = rs.try_write()
                {
                    self.detach_room(&mut rs);
                }
            }
            Event::RoomUpdated { building_id, room: Room { name, .. } }
            | Event::BookingCancelled { building_id, room: name, .. }
            | Event::BookingDeleted { building_id, room: name, .. } => {
                self.replay_into_room(&RoomKey::new(*building_id, name.clone()), event);
            }
            Event::BookingConfirmed { booking } => {
                self.replay_into_room(&RoomKey::new(booking.building_id, booking.room.clone()), event);
            }
        }
    }

    fn replay_into_room(&self, key: &RoomKey, event: &Event) {
        if let Some(rs) = self.room(key)
            && let Ok(mut rs) = rs.try_write()
        {
            self.apply_to_room(&mut rs, event);
        }
    }

    // ── State access ─────────────────────────────────────

    pub(super) fn building(&self, id: &Ulid) -> Option<SharedBuildingState> {
        self.buildings.get(id).map(|e| e.value().clone())
    }

    pub(super) fn room(&self, key: &RoomKey) -> Option<SharedRoomState> {
        self.rooms.get(key).map(|e| e.value().clone())
    }

    /// Snapshot of every room handle. Never hold a map ref across an await.
    pub(super) fn room_arcs(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub(super) fn user_id_by_email(&self, email: &str) -> Option<Ulid> {
        self.emails.get(&email.to_ascii_lowercase()).map(|e| *e.value())
    }

    // ── Apply ────────────────────────────────────────────

    /// Apply a booking or room-level event. Caller holds the room write lock.
    pub(super) fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::BookingConfirmed { booking } => {
                let mut booking = booking.clone();
                // the holder may have been deleted between check and commit
                if booking.user_id.is_some_and(|id| !self.users.contains_key(&id)) {
                    booking.user_id = None;
                }
                self.booking_to_room.insert(booking.id, rs.key.clone());
                rs.insert_booking(booking);
            }
            Event::BookingCancelled { id, reason, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.lifecycle = Lifecycle::Canceled {
                        reason: reason.clone(),
                    };
                }
            }
            Event::BookingDeleted { id, .. } => {
                rs.remove_booking(*id);
                self.booking_to_room.remove(id);
            }
            Event::RoomUpdated { room, .. } => {
                rs.room = room.clone();
            }
            _ => {}
        }
    }

    /// Drop a room and its bookings from the index. Caller holds its write
    /// lock; a transaction still holding an old handle finds it empty.
    pub(super) fn detach_room(&self, rs: &mut RoomState) {
        for b in rs.bookings.drain(..) {
            self.booking_to_room.remove(&b.id);
        }
        self.rooms.remove(&rs.key);
    }

    /// Directory events. Clearing booking references on deletion is done by
    /// the caller, room by room.
    pub(super) fn apply_directory(&self, event: &Event) {
        match event {
            Event::UserRegistered { user } => {
                self.emails.insert(user.email.clone(), user.id);
                self.users.insert(user.id, user.clone());
            }
            Event::UserUpdated {
                id,
                name,
                phone,
                password,
            } => {
                if let Some(mut u) = self.users.get_mut(id) {
                    u.name = name.clone();
                    u.phone = phone.clone();
                    u.password = password.clone();
                }
            }
            Event::UserSuspended { id, suspended, reason } => {
                if let Some(mut u) = self.users.get_mut(id) {
                    u.suspended = *suspended;
                    u.suspension_reason = reason.clone();
                }
            }
            Event::UserRoleChanged { id, role } => {
                if let Some(mut u) = self.users.get_mut(id) {
                    u.role = *role;
                }
            }
            Event::UserDeleted { id } => {
                if let Some((_, u)) = self.users.remove(id) {
                    self.emails.remove(&u.email);
                }
            }
            _ => {}
        }
    }

    // ── Persistence ──────────────────────────────────────

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to a locked room.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_room(rs, event);
        Ok(())
    }

    /// Look up the room holding `booking_id` and take its write lock, with the
    /// owning building's read lock taken first.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: Ulid,
    ) -> Result<
        (
            tokio::sync::OwnedRwLockReadGuard<BuildingState>,
            tokio::sync::OwnedRwLockWriteGuard<RoomState>,
        ),
        EngineError,
    > {
        let key = self
            .booking_to_room
            .get(&booking_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(booking_id))?;
        let bs = self
            .building(&key.building_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let rs = self.room(&key).ok_or(EngineError::NotFound(booking_id))?;
        let building = bs.read_owned().await;
        let room = rs.write_owned().await;
        if room.booking(booking_id).is_none() {
            // deleted while we waited
            return Err(EngineError::NotFound(booking_id));
        }
        Ok((building, room))
    }

    // ── Notifications ────────────────────────────────────

    /// Fire-and-forget delivery. Failures are logged and counted only.
    pub(super) fn dispatch(&self, notice: Notice) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let recipient = notice.recipient().to_string();
            if let Err(e) = sink.deliver(notice).await {
                warn!("notice to {recipient} not delivered: {e}");
                metrics::counter!(NOTIFY_FAILURES_TOTAL).increment(1);
            }
        });
    }
}

pub(super) fn apply_to_building(bs: &mut BuildingState, event: &Event) {
    match event {
        Event::BuildingUpdated { building } => bs.info = building.clone(),
        Event::RoomCreated { room, .. } => bs.rooms.push(room.name.clone()),
        Event::RoomDeleted { name, .. } => bs.rooms.retain(|r| r != name),
        _ => {}
    }
}

pub(super) fn clear_user_refs(rs: &mut RoomState, user_id: Ulid) {
    for b in rs.bookings.iter_mut().filter(|b| b.user_id == Some(user_id)) {
        b.user_id = None;
    }
}

/// Convert an internal result to what callers of the core operations see.
/// System faults are logged with `context`; caller-facing rejections are not
/// errors and only reach debug.
pub(crate) fn into_outcome<T>(
    result: Result<T, EngineError>,
    context: impl FnOnce() -> String,
) -> Outcome<T> {
    match result {
        Ok(v) => Outcome::Confirmed(v),
        Err(e) => {
            let rejection = e.rejection();
            if rejection == Rejection::SystemError {
                error!("{}: {e}", context());
            } else {
                debug!("{}: rejected: {e}", context());
            }
            Outcome::Rejected(rejection)
        }
    }
}
