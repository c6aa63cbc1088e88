use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;
use tracing::error;

use crate::auth::{RoombookAuthSource, SIGNUP_LOGIN};
use crate::engine::{Engine, EngineError, Outcome, Rejection};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command};

enum Session {
    Signup,
    Member(User),
}

pub struct RoombookHandler {
    engine: Arc<Engine>,
    query_parser: Arc<RoombookQueryParser>,
}

impl RoombookHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(RoombookQueryParser),
        }
    }

    /// Who is behind the session. Re-read per statement so a suspension or
    /// deletion takes effect on open connections.
    fn session<C: ClientInfo>(&self, client: &C) -> PgWireResult<Session> {
        let email = client
            .metadata()
            .get("user")
            .ok_or_else(|| user_error("28000", "no session user".into()))?;
        if email == SIGNUP_LOGIN {
            return Ok(Session::Signup);
        }
        let user = self
            .engine
            .user_by_email(email)
            .ok_or_else(|| rejected(Rejection::UserNotFound))?;
        if user.suspended {
            return Err(rejected(Rejection::UserSuspended));
        }
        Ok(Session::Member(user))
    }

    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Response> {
        let session = self.session(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);

        let started = Instant::now();
        let result = match &session {
            Session::Signup => self.execute_signup(cmd).await,
            Session::Member(actor) => self.execute_command(actor, cmd).await,
        };
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    /// The signup session registers member accounts and nothing else.
    async fn execute_signup(&self, cmd: Command) -> PgWireResult<Response> {
        let Command::InsertUser {
            id,
            name,
            email,
            phone,
            status,
            password,
        } = cmd
        else {
            return Err(engine_err(EngineError::Forbidden(
                "the signup session can only register accounts",
            )));
        };
        let reserved = self
            .engine
            .settings()
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email.trim()));
        if reserved {
            return Err(engine_err(EngineError::Forbidden(
                "this email is reserved for the administrator",
            )));
        }
        self.engine
            .register_user(id, &name, &email, &phone, status, &password)
            .await
            .map_err(engine_err)?;
        Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
    }

    async fn execute_command(&self, actor: &User, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            // ── users ──
            Command::InsertUser {
                id,
                name,
                email,
                phone,
                status,
                password,
            } => {
                require_admin(actor)?;
                engine
                    .register_user(id, &name, &email, &phone, status, &password)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateUser {
                id,
                profile,
                suspension,
                role,
            } => {
                if suspension.is_some() || role.is_some() {
                    require_admin(actor)?;
                } else {
                    require_admin_or_self(actor, id)?;
                }
                if profile != Default::default() {
                    engine.update_user(id, profile).await.map_err(engine_err)?;
                }
                if let Some((suspended, reason)) = suspension {
                    engine
                        .set_suspended(id, suspended, &reason)
                        .await
                        .map_err(engine_err)?;
                }
                if let Some(role) = role {
                    engine.set_role(id, role).await.map_err(engine_err)?;
                }
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteUser { id } => {
                require_admin_or_self(actor, id)?;
                engine.delete_user(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectUsers { email } => {
                let mut users = if actor.is_admin() {
                    engine.list_users()
                } else {
                    vec![actor.clone()]
                };
                if let Some(email) = email {
                    users.retain(|u| u.email.eq_ignore_ascii_case(&email));
                }
                encode_rows(users_schema(), users, |enc, u| {
                    enc.encode_field(&u.id.to_string())?;
                    enc.encode_field(&u.name)?;
                    enc.encode_field(&u.email)?;
                    enc.encode_field(&u.phone)?;
                    enc.encode_field(&u.status.as_str().to_string())?;
                    enc.encode_field(&u.role.as_str().to_string())?;
                    enc.encode_field(&u.suspended)?;
                    enc.encode_field(&u.suspension_reason)
                })
            }

            // ── buildings ──
            Command::InsertBuilding { building } => {
                require_admin(actor)?;
                engine.create_building(building).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateBuilding { id, patch } => {
                require_admin(actor)?;
                engine.update_building(id, patch).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteBuilding { id } => {
                require_admin(actor)?;
                engine.delete_building(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectBuildings => {
                let buildings = engine.list_buildings(actor.is_admin()).await;
                encode_rows(buildings_schema(), buildings, |enc, b| {
                    enc.encode_field(&b.id.to_string())?;
                    enc.encode_field(&b.name)?;
                    enc.encode_field(&b.description)?;
                    enc.encode_field(&i64::from(b.floors))?;
                    enc.encode_field(&b.basement)?;
                    enc.encode_field(&b.image)?;
                    enc.encode_field(&b.paused)
                })
            }

            // ── rooms ──
            Command::InsertRoom { building_id, room } => {
                require_admin(actor)?;
                engine.create_room(building_id, room).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateRoom { key, patch } => {
                require_admin(actor)?;
                engine.update_room(&key, patch).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteRoom { key } => {
                require_admin(actor)?;
                engine.delete_room(&key).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectRooms { building_id } => {
                let mut rooms = engine.list_rooms(building_id).await.map_err(engine_err)?;
                if !actor.is_admin() {
                    rooms.retain(|r| !r.paused);
                }
                encode_rows(rooms_schema(), rooms, |enc, r| {
                    let amenities: Vec<&str> = r.amenities.iter().map(Amenity::as_str).collect();
                    let schedule = serde_json::to_string(&r.schedule)
                        .map_err(|e| PgWireError::ApiError(Box::new(e)))?;
                    enc.encode_field(&building_id.to_string())?;
                    enc.encode_field(&r.name)?;
                    enc.encode_field(&r.description)?;
                    enc.encode_field(&i64::from(r.seats))?;
                    enc.encode_field(&amenities.join(","))?;
                    enc.encode_field(&r.image)?;
                    enc.encode_field(&r.paused)?;
                    enc.encode_field(&schedule)
                })
            }

            // ── bookings ──
            Command::InsertBooking {
                id,
                building_id,
                room,
                date,
                span,
                user_email,
            } => {
                let user_email = match user_email {
                    Some(email) if !email.eq_ignore_ascii_case(&actor.email) => {
                        require_admin(actor)?;
                        email
                    }
                    _ => actor.email.clone(),
                };
                let req = BookingRequest {
                    id,
                    building_id,
                    room,
                    date,
                    span,
                    user_email,
                };
                outcome_response(engine.attempt_booking(req).await, "INSERT")
            }
            Command::CancelBooking { id, reason } => {
                let booking = engine
                    .get_booking(id)
                    .await
                    .ok_or_else(|| rejected(Rejection::NotFound))?;
                if !actor.is_admin() && !booking.holder.email.eq_ignore_ascii_case(&actor.email) {
                    return Err(engine_err(EngineError::Forbidden(
                        "only the holder or an admin can cancel a booking",
                    )));
                }
                outcome_response(engine.cancel_booking(id, &reason).await, "UPDATE")
            }
            Command::DeleteBooking { id } => {
                require_admin(actor)?;
                outcome_response(engine.delete_booking(id).await, "DELETE")
            }
            Command::SelectBookings { mut filter } => {
                if !actor.is_admin() {
                    match &filter.user_email {
                        Some(email) if !email.eq_ignore_ascii_case(&actor.email) => {
                            return Err(engine_err(EngineError::Forbidden(
                                "members can only list their own bookings",
                            )));
                        }
                        _ => filter.user_email = Some(actor.email.clone()),
                    }
                }
                let now = chrono::Local::now().naive_local();
                let bookings = engine.list_bookings(&filter, now).await;
                encode_rows(bookings_schema(), bookings, |enc, b| {
                    enc.encode_field(&b.id.to_string())?;
                    enc.encode_field(&b.building_id.to_string())?;
                    enc.encode_field(&b.room)?;
                    enc.encode_field(&b.date.to_string())?;
                    enc.encode_field(&b.span.start.to_string())?;
                    enc.encode_field(&b.span.end.to_string())?;
                    enc.encode_field(&b.user_id.map(|id| id.to_string()))?;
                    enc.encode_field(&b.holder.name)?;
                    enc.encode_field(&b.holder.email)?;
                    enc.encode_field(&b.holder.status.as_str().to_string())?;
                    enc.encode_field(&!b.is_active())?;
                    enc.encode_field(&b.cancel_reason().map(str::to_string))
                })
            }

            // ── read-only views ──
            Command::SelectAvailableRooms {
                building_id,
                date,
                span,
            } => {
                let rooms = engine
                    .query_available_rooms(building_id, date, span)
                    .await
                    .map_err(engine_err)?;
                encode_rows(available_rooms_schema(), rooms, |enc, name| enc.encode_field(&name))
            }
            Command::SelectOpenSlots { key, date } => {
                let slots = engine.open_slots(&key, date).await.map_err(engine_err)?;
                encode_rows(open_slots_schema(), slots, |enc, span| {
                    enc.encode_field(&span.start.to_string())?;
                    enc.encode_field(&span.end.to_string())
                })
            }
        }
    }
}

fn require_admin(actor: &User) -> PgWireResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(engine_err(EngineError::Forbidden("admin role required")))
    }
}

fn require_admin_or_self(actor: &User, target: ulid::Ulid) -> PgWireResult<()> {
    if actor.is_admin() || actor.id == target {
        Ok(())
    } else {
        Err(engine_err(EngineError::Forbidden(
            "only the account owner or an admin can do this",
        )))
    }
}

fn outcome_response<T>(outcome: Outcome<T>, tag: &str) -> PgWireResult<Response> {
    match outcome {
        Outcome::Confirmed(_) => Ok(Response::Execution(Tag::new(tag).with_rows(1))),
        Outcome::Rejected(r) => Err(rejected(r)),
    }
}

fn encode_rows<T>(
    schema: Vec<FieldInfo>,
    items: Vec<T>,
    mut encode: impl FnMut(&mut DataRowEncoder, T) -> PgWireResult<()>,
) -> PgWireResult<Response> {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = items
        .into_iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

// ── Result schemas ───────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn users_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("email", Type::VARCHAR),
        field("phone", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("role", Type::VARCHAR),
        field("suspended", Type::BOOL),
        field("suspension_reason", Type::VARCHAR),
    ]
}

fn buildings_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("description", Type::VARCHAR),
        field("floors", Type::INT8),
        field("basement", Type::BOOL),
        field("image", Type::VARCHAR),
        field("paused", Type::BOOL),
    ]
}

fn rooms_schema() -> Vec<FieldInfo> {
    vec![
        field("building_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("description", Type::VARCHAR),
        field("seats", Type::INT8),
        field("amenities", Type::VARCHAR),
        field("image", Type::VARCHAR),
        field("paused", Type::BOOL),
        field("schedule", Type::VARCHAR),
    ]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("building_id", Type::VARCHAR),
        field("room", Type::VARCHAR),
        field("date", Type::VARCHAR),
        field("start", Type::VARCHAR),
        field("end", Type::VARCHAR),
        field("user_id", Type::VARCHAR),
        field("user_name", Type::VARCHAR),
        field("user_email", Type::VARCHAR),
        field("user_status", Type::VARCHAR),
        field("canceled", Type::BOOL),
        field("cancel_reason", Type::VARCHAR),
    ]
}

fn available_rooms_schema() -> Vec<FieldInfo> {
    vec![field("room", Type::VARCHAR)]
}

fn open_slots_schema() -> Vec<FieldInfo> {
    vec![field("start", Type::VARCHAR), field("end", Type::VARCHAR)]
}

/// Row shape of a statement, looked up from the table after `FROM`.
/// Statements that return no rows have an empty schema.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.trim_start().to_lowercase();
    if !lower.starts_with("select") {
        return vec![];
    }
    let table = lower
        .split_once(" from ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(|t| t.trim_matches(|c| c == '"' || c == ';'));
    match table {
        Some("users") => users_schema(),
        Some("buildings") => buildings_schema(),
        Some("rooms") => rooms_schema(),
        Some("bookings") => bookings_schema(),
        Some("available_rooms") => available_rooms_schema(),
        Some("open_slots") => open_slots_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for RoombookHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let response = self.run(&*client, query).await?;
        Ok(vec![response])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RoombookQueryParser;

#[async_trait]
impl QueryParser for RoombookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for RoombookHandler {
    type Statement = String;
    type QueryParser = RoombookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(&*client, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let mut max = 0;
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        rest = &rest[pos + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if let Ok(n) = rest[..digits].parse::<usize>() {
            max = max.max(n);
        }
        rest = &rest[digits..];
    }
    max
}

/// Inline bound parameters as quoted literals in one pass. Placeholders inside
/// quoted literals or identifiers are left alone, and inlined values are never
/// scanned again.
fn substitute_params(portal: &Portal<String>) -> String {
    inline_params(&portal.statement.statement, &portal.parameters)
}

fn inline_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, '$') => {
                let digits = sql[i + 1..].bytes().take_while(u8::is_ascii_digit).count();
                let param = sql[i + 1..i + 1 + digits]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| params.get(idx));
                if let Some(param) = param {
                    match param {
                        Some(bytes) => {
                            let text = String::from_utf8_lossy(bytes.as_ref());
                            out.push('\'');
                            out.push_str(&text.replace('\'', "''"));
                            out.push('\'');
                        }
                        None => out.push_str("NULL"),
                    }
                    for _ in 0..digits {
                        chars.next();
                    }
                    continue;
                }
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct RoombookFactory {
    handler: Arc<RoombookHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<RoombookAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl RoombookFactory {
    pub fn new(engine: Arc<Engine>, signup_password: String) -> Self {
        let auth_source = RoombookAuthSource::new(engine.clone(), signup_password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(RoombookHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RoombookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    signup_password: String,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let factory = Arc::new(RoombookFactory::new(engine, signup_password));
    pgwire::tokio::process_socket(socket, None, factory).await?;
    Ok(())
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(rejection: Rejection) -> &'static str {
    match rejection {
        Rejection::Conflict => "23P01",
        Rejection::Duplicate => "23505",
        Rejection::NotFound | Rejection::UserNotFound => "P0002",
        Rejection::RoomUnavailable => "55000",
        Rejection::UserSuspended | Rejection::Forbidden => "42501",
        Rejection::Invalid => "22023",
        Rejection::SystemError => "XX000",
    }
}

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn rejected(rejection: Rejection) -> PgWireError {
    let message = match rejection {
        Rejection::UserNotFound => "user not found",
        Rejection::UserSuspended => "account suspended",
        Rejection::RoomUnavailable => "room unavailable at that time",
        Rejection::Conflict => "time slot already booked",
        Rejection::Duplicate => "you already booked this slot",
        Rejection::NotFound => "not found",
        Rejection::Invalid => "invalid request",
        Rejection::Forbidden => "forbidden",
        Rejection::SystemError => "internal error",
    };
    user_error(sqlstate(rejection), message.into())
}

fn engine_err(e: EngineError) -> PgWireError {
    let rejection = e.rejection();
    if rejection == Rejection::SystemError {
        error!("statement failed: {e}");
        return rejected(rejection);
    }
    let code = match &e {
        EngineError::AlreadyExists(_) => "23505",
        _ => sqlstate(rejection),
    };
    user_error(code, e.to_string())
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
