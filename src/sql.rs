use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{BuildingPatch, RoomPatch, UserPatch};
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUser {
        id: Ulid,
        name: String,
        email: String,
        phone: String,
        status: UserStatus,
        password: String,
    },
    UpdateUser {
        id: Ulid,
        profile: UserPatch,
        /// `(suspended, reason)`
        suspension: Option<(bool, String)>,
        role: Option<Role>,
    },
    DeleteUser {
        id: Ulid,
    },
    SelectUsers {
        email: Option<String>,
    },
    InsertBuilding {
        building: Building,
    },
    UpdateBuilding {
        id: Ulid,
        patch: BuildingPatch,
    },
    DeleteBuilding {
        id: Ulid,
    },
    SelectBuildings,
    InsertRoom {
        building_id: Ulid,
        room: Room,
    },
    UpdateRoom {
        key: RoomKey,
        patch: RoomPatch,
    },
    DeleteRoom {
        key: RoomKey,
    },
    SelectRooms {
        building_id: Ulid,
    },
    InsertBooking {
        id: Ulid,
        building_id: Ulid,
        room: String,
        date: NaiveDate,
        span: Span,
        /// Book on someone else's behalf; defaults to the session user.
        user_email: Option<String>,
    },
    CancelBooking {
        id: Ulid,
        reason: String,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectBookings {
        filter: BookingFilter,
    },
    SelectAvailableRooms {
        building_id: Ulid,
        date: NaiveDate,
        span: Span,
    },
    SelectOpenSlots {
        key: RoomKey,
        date: NaiveDate,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Column name → value expression, from an INSERT row, SET list or WHERE clause.
type Fields<'a> = HashMap<String, &'a Expr>;

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let f = insert_fields(insert)?;

    match table.as_str() {
        "users" => Ok(Command::InsertUser {
            id: ulid_field(&f, "id")?,
            name: string_field(&f, "name")?,
            email: string_field(&f, "email")?,
            phone: opt_string_field(&f, "phone")?.unwrap_or_default(),
            status: parse_enum(&string_field(&f, "status")?)?,
            password: string_field(&f, "password")?,
        }),
        "buildings" => Ok(Command::InsertBuilding {
            building: Building {
                id: ulid_field(&f, "id")?,
                name: string_field(&f, "name")?,
                description: opt_string_field(&f, "description")?,
                floors: opt_u32_field(&f, "floors")?.unwrap_or(1),
                basement: opt_bool_field(&f, "basement")?.unwrap_or(false),
                image: opt_string_field(&f, "image")?,
                paused: opt_bool_field(&f, "paused")?.unwrap_or(false),
            },
        }),
        "rooms" => {
            let mut room = Room::new(string_field(&f, "name")?);
            room.description = opt_string_field(&f, "description")?;
            room.seats = opt_u32_field(&f, "seats")?.unwrap_or(0);
            room.amenities = opt_amenities_field(&f, "amenities")?.unwrap_or_default();
            room.image = opt_string_field(&f, "image")?;
            room.paused = opt_bool_field(&f, "paused")?.unwrap_or(false);
            room.schedule = opt_schedule_field(&f, "schedule")?.unwrap_or_default();
            Ok(Command::InsertRoom {
                building_id: ulid_field(&f, "building_id")?,
                room,
            })
        }
        "bookings" => Ok(Command::InsertBooking {
            id: ulid_field(&f, "id")?,
            building_id: ulid_field(&f, "building_id")?,
            room: string_field(&f, "room")?,
            date: date_field(&f, "date")?,
            span: span_fields(&f)?,
            user_email: opt_string_field(&f, "user_email")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let mut set = Fields::new();
    for a in assignments {
        let AssignmentTarget::ColumnName(name) = &a.target else {
            return Err(SqlError::Unsupported("tuple assignment".into()));
        };
        let col = object_name_last(name).ok_or_else(|| SqlError::Parse("empty column".into()))?;
        set.insert(col, &a.value);
    }
    let filter = where_fields(selection)?;

    match table.as_str() {
        "users" => {
            let suspension = match (opt_bool_field(&set, "suspended")?, opt_string_field(&set, "suspension_reason")?) {
                (Some(flag), reason) => Some((flag, reason.unwrap_or_default())),
                (None, Some(_)) => {
                    return Err(SqlError::Parse("suspension_reason requires suspended".into()));
                }
                (None, None) => None,
            };
            let role = match opt_string_field(&set, "role")? {
                Some(r) => Some(parse_enum(&r)?),
                None => None,
            };
            Ok(Command::UpdateUser {
                id: ulid_field(&filter, "id")?,
                profile: UserPatch {
                    name: opt_string_field(&set, "name")?,
                    phone: opt_string_field(&set, "phone")?,
                    password: opt_string_field(&set, "password")?,
                },
                suspension,
                role,
            })
        }
        "buildings" => Ok(Command::UpdateBuilding {
            id: ulid_field(&filter, "id")?,
            patch: BuildingPatch {
                name: opt_string_field(&set, "name")?,
                description: nullable_string_field(&set, "description")?,
                floors: opt_u32_field(&set, "floors")?,
                basement: opt_bool_field(&set, "basement")?,
                image: nullable_string_field(&set, "image")?,
                paused: opt_bool_field(&set, "paused")?,
            },
        }),
        "rooms" => {
            if set.contains_key("name") {
                return Err(SqlError::Unsupported("renaming a room".into()));
            }
            Ok(Command::UpdateRoom {
                key: room_key_fields(&filter)?,
                patch: RoomPatch {
                    description: nullable_string_field(&set, "description")?,
                    seats: opt_u32_field(&set, "seats")?,
                    amenities: opt_amenities_field(&set, "amenities")?,
                    image: nullable_string_field(&set, "image")?,
                    paused: opt_bool_field(&set, "paused")?,
                    schedule: opt_schedule_field(&set, "schedule")?,
                },
            })
        }
        "bookings" => Ok(Command::CancelBooking {
            id: ulid_field(&filter, "id")?,
            reason: string_field(&set, "cancel_reason")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filter = where_fields(&delete.selection)?;

    match table.as_str() {
        "users" => Ok(Command::DeleteUser {
            id: ulid_field(&filter, "id")?,
        }),
        "buildings" => Ok(Command::DeleteBuilding {
            id: ulid_field(&filter, "id")?,
        }),
        "rooms" => Ok(Command::DeleteRoom {
            key: room_key_fields(&filter)?,
        }),
        "bookings" => Ok(Command::DeleteBooking {
            id: ulid_field(&filter, "id")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(SqlError::Unsupported("non-SELECT query".into()));
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;
    let f = where_fields(&select.selection)?;

    match table.as_str() {
        "users" => Ok(Command::SelectUsers {
            email: opt_string_field(&f, "email")?,
        }),
        "buildings" => Ok(Command::SelectBuildings),
        "rooms" => Ok(Command::SelectRooms {
            building_id: ulid_field(&f, "building_id")?,
        }),
        "bookings" => {
            let user_status = match opt_string_field(&f, "user_status")? {
                Some(s) => Some(parse_enum(&s)?),
                None => None,
            };
            let period = match opt_string_field(&f, "period")? {
                Some(p) => parse_enum(&p)?,
                None => Period::All,
            };
            Ok(Command::SelectBookings {
                filter: BookingFilter {
                    user_email: opt_string_field(&f, "user_email")?,
                    building_id: opt_ulid_field(&f, "building_id")?,
                    room: opt_string_field(&f, "room")?,
                    canceled: opt_bool_field(&f, "canceled")?,
                    user_status,
                    period,
                },
            })
        }
        "available_rooms" => Ok(Command::SelectAvailableRooms {
            building_id: ulid_field(&f, "building_id")?,
            date: date_field(&f, "date")?,
            span: span_fields(&f)?,
        }),
        "open_slots" => Ok(Command::SelectOpenSlots {
            key: room_key_fields(&f)?,
            date: date_field(&f, "date")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Statement helpers ─────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// Pair the column list with the single VALUES row.
fn insert_fields(insert: &ast::Insert) -> Result<Fields<'_>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    let SetExpr::Values(values) = body.body.as_ref() else {
        return Err(SqlError::Parse("expected VALUES".into()));
    };
    let row = match values.rows.as_slice() {
        [row] => row,
        [] => return Err(SqlError::Parse("empty VALUES".into())),
        _ => return Err(SqlError::Unsupported("multi-row INSERT".into())),
    };
    if insert.columns.is_empty() {
        return Err(SqlError::Parse("INSERT needs an explicit column list".into()));
    }
    if insert.columns.len() != row.len() {
        return Err(SqlError::WrongArity(insert.columns.len(), row.len()));
    }
    Ok(insert
        .columns
        .iter()
        .map(|c| c.value.to_lowercase())
        .zip(row.iter())
        .collect())
}

/// Collect `col = value [AND ...]`. Anything else is refused rather than ignored.
fn where_fields(selection: &Option<Expr>) -> Result<Fields<'_>, SqlError> {
    let mut fields = Fields::new();
    if let Some(expr) = selection {
        collect_eq_filters(expr, &mut fields)?;
    }
    Ok(fields)
}

fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Fields<'a>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.insert(col, right.as_ref());
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

// ── Field accessors ───────────────────────────────────────────

fn required<'a>(f: &Fields<'a>, col: &'static str) -> Result<&'a Expr, SqlError> {
    f.get(col).copied().ok_or(SqlError::MissingColumn(col))
}

fn ulid_field(f: &Fields<'_>, col: &'static str) -> Result<Ulid, SqlError> {
    parse_ulid_expr(required(f, col)?)
}

fn opt_ulid_field(f: &Fields<'_>, col: &'static str) -> Result<Option<Ulid>, SqlError> {
    f.get(col).map(|e| parse_ulid_expr(e)).transpose()
}

fn string_field(f: &Fields<'_>, col: &'static str) -> Result<String, SqlError> {
    parse_string_or_null(required(f, col)?)?.ok_or(SqlError::NullColumn(col))
}

/// Absent and NULL both read as `None`.
fn opt_string_field(f: &Fields<'_>, col: &'static str) -> Result<Option<String>, SqlError> {
    match f.get(col) {
        Some(e) => parse_string_or_null(e),
        None => Ok(None),
    }
}

/// Absent is `None`; NULL is `Some(None)` (clear the field).
fn nullable_string_field(f: &Fields<'_>, col: &'static str) -> Result<Option<Option<String>>, SqlError> {
    f.get(col).map(|e| parse_string_or_null(e)).transpose()
}

fn opt_u32_field(f: &Fields<'_>, col: &'static str) -> Result<Option<u32>, SqlError> {
    f.get(col).map(|e| parse_u32(e)).transpose()
}

fn opt_bool_field(f: &Fields<'_>, col: &'static str) -> Result<Option<bool>, SqlError> {
    f.get(col).map(|e| parse_bool(e)).transpose()
}

fn date_field(f: &Fields<'_>, col: &'static str) -> Result<NaiveDate, SqlError> {
    let s = string_field(f, col)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

fn time_field(f: &Fields<'_>, col: &'static str) -> Result<TimeOfDay, SqlError> {
    string_field(f, col)?
        .parse()
        .map_err(|e: TimeParseError| SqlError::Parse(e.to_string()))
}

fn span_fields(f: &Fields<'_>) -> Result<Span, SqlError> {
    let start = time_field(f, "start")?;
    let end = time_field(f, "end")?;
    Span::try_new(start, end)
        .ok_or_else(|| SqlError::Parse(format!("start {start} must be before end {end}")))
}

fn room_key_fields(f: &Fields<'_>) -> Result<RoomKey, SqlError> {
    let building_id = ulid_field(f, "building_id")?;
    // rooms are filtered by `name`, other tables call the column `room`
    let name = match f.get("name") {
        Some(_) => string_field(f, "name")?,
        None => string_field(f, "room")?,
    };
    Ok(RoomKey::new(building_id, name))
}

/// Comma-separated list, e.g. `'projector,whiteboard'`. Empty string is no amenities.
fn opt_amenities_field(f: &Fields<'_>, col: &'static str) -> Result<Option<BTreeSet<Amenity>>, SqlError> {
    let Some(raw) = opt_string_field(f, col)? else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_enum)
        .collect::<Result<BTreeSet<_>, _>>()
        .map(Some)
}

/// JSON array of windows: `[{"days":["Mon"],"start":"09:00","end":"17:00"}]`.
fn opt_schedule_field(f: &Fields<'_>, col: &'static str) -> Result<Option<Vec<Window>>, SqlError> {
    let Some(raw) = opt_string_field(f, col)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| SqlError::Parse(format!("bad schedule: {e}")))
}

// ── Value parsing ─────────────────────────────────────────────

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T, SqlError> {
    s.parse().map_err(SqlError::Parse)
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) | Some(Value::DollarQuotedString(ast::DollarQuotedString { value: s, .. })) => {
            Ok(Some(s.clone()))
        }
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(usize, usize),
    MissingColumn(&'static str),
    NullColumn(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(columns, values) => {
                write!(f, "{columns} columns but {values} values")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::NullColumn(col) => write!(f, "column {col} must not be NULL"),
        }
    }
}

impl std::error::Error for SqlError {}
