use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use roombook::engine::{Engine, Settings};
use roombook::model::SchedulePolicy;
use roombook::notify::NotifyHub;
use roombook::wire;

const SIGNUP_PASSWORD: &str = "roombook";
const ADMIN: &str = "admin@campus.edu";
const ADMIN_PASSWORD: &str = "admin-pw";
const ADA_PASSWORD: &str = "ada-pw";
const BO_PASSWORD: &str = "bo-pw";
const MONDAY: &str = "2026-10-19";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("roombook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let settings = Settings {
        policy: SchedulePolicy::Window,
        admin_email: Some(ADMIN.into()),
        admin_password: Some(ADMIN_PASSWORD.into()),
    };
    let engine = Arc::new(
        Engine::new(dir.join("roombook.wal"), Arc::new(NotifyHub::new()), settings).unwrap(),
    );
    engine.ensure_admin().await.unwrap();

    let served = engine.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = served.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, SIGNUP_PASSWORD.to_string()).await;
            });
        }
    });

    (addr, engine)
}

fn config(addr: SocketAddr, user: &str, password: &str) -> Config {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("roombook")
        .user(user)
        .password(password);
    config
}

async fn connect(addr: SocketAddr, user: &str, password: &str) -> Client {
    let (client, connection) = config(addr, user, password).connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

/// SQLSTATE of a failed statement.
async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client.batch_execute(sql).await.unwrap_err();
    err.code().map(|c| c.code().to_string()).unwrap_or_default()
}

/// Admin session with two members and one building whose room E-101 is
/// open Mon-Fri 09:00-17:00.
async fn campus(addr: SocketAddr) -> (Client, Ulid) {
    let admin = connect(addr, ADMIN, ADMIN_PASSWORD).await;
    admin
        .batch_execute(&format!(
            "INSERT INTO users (id, name, email, phone, status, password) VALUES ('{}', 'Ada', 'ada@campus.edu', '555-0100', 'Faculty', '{ADA_PASSWORD}')",
            Ulid::new()
        ))
        .await
        .unwrap();
    admin
        .batch_execute(&format!(
            "INSERT INTO users (id, name, email, status, password) VALUES ('{}', 'Bo', 'bo@campus.edu', 'Student', '{BO_PASSWORD}')",
            Ulid::new()
        ))
        .await
        .unwrap();

    let bid = Ulid::new();
    admin
        .batch_execute(&format!(
            "INSERT INTO buildings (id, name, floors) VALUES ('{bid}', 'Engineering', 4)"
        ))
        .await
        .unwrap();
    admin
        .batch_execute(&format!(
            r#"INSERT INTO rooms (building_id, name, seats, amenities, schedule) VALUES ('{bid}', 'E-101', 30, 'projector', '[{{"days":["Mon","Tue","Wed","Thu","Fri"],"start":"09:00","end":"17:00"}}]')"#
        ))
        .await
        .unwrap();
    (admin, bid)
}

fn book_sql(id: Ulid, bid: Ulid, start: &str, end: &str) -> String {
    format!(
        r#"INSERT INTO bookings (id, building_id, room, date, start, "end") VALUES ('{id}', '{bid}', 'E-101', '{MONDAY}', '{start}', '{end}')"#
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn login_requires_known_active_user() {
    let (addr, engine) = start_test_server().await;

    assert!(config(addr, "ghost@campus.edu", SIGNUP_PASSWORD).connect(NoTls).await.is_err());
    assert!(config(addr, ADMIN, "wrong").connect(NoTls).await.is_err());

    let (admin, _bid) = campus(addr).await;
    // one member's password does not open another member's account
    assert!(config(addr, "bo@campus.edu", ADA_PASSWORD).connect(NoTls).await.is_err());
    assert!(config(addr, "bo@campus.edu", SIGNUP_PASSWORD).connect(NoTls).await.is_err());
    let bo = engine.user_by_email("bo@campus.edu").unwrap();
    admin
        .batch_execute(&format!(
            "UPDATE users SET suspended = true, suspension_reason = 'no-shows' WHERE id = '{}'",
            bo.id
        ))
        .await
        .unwrap();
    assert!(config(addr, "bo@campus.edu", BO_PASSWORD).connect(NoTls).await.is_err());
}

#[tokio::test]
async fn book_conflict_cancel_retry() {
    let (addr, _engine) = start_test_server().await;
    let (_admin, bid) = campus(addr).await;
    let ada = connect(addr, "ada@campus.edu", ADA_PASSWORD).await;
    let bo = connect(addr, "bo@campus.edu", BO_PASSWORD).await;

    let first = Ulid::new();
    ada.batch_execute(&book_sql(first, bid, "10:00", "11:00")).await.unwrap();

    assert_eq!(sqlstate(&bo, &book_sql(Ulid::new(), bid, "10:30", "11:30")).await, "23P01");
    assert_eq!(sqlstate(&ada, &book_sql(Ulid::new(), bid, "10:00", "11:00")).await, "23505");
    assert_eq!(sqlstate(&ada, &book_sql(Ulid::new(), bid, "16:30", "17:30")).await, "55000");

    // only the holder (or an admin) may cancel
    let cancel = format!("UPDATE bookings SET cancel_reason = 'plans changed' WHERE id = '{first}'");
    assert_eq!(sqlstate(&bo, &cancel).await, "42501");
    ada.batch_execute(&cancel).await.unwrap();

    let listed = rows(&ada, "SELECT * FROM bookings").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].get("canceled"), Some("t"));
    assert_eq!(listed[0].get("cancel_reason"), Some("plans changed"));

    bo.batch_execute(&book_sql(Ulid::new(), bid, "10:30", "11:30")).await.unwrap();

    // members only see their own bookings
    assert_eq!(rows(&bo, "SELECT * FROM bookings").await.len(), 1);
    assert_eq!(
        sqlstate(&bo, "SELECT * FROM bookings WHERE user_email = 'ada@campus.edu'").await,
        "42501"
    );
}

#[tokio::test]
async fn catalog_changes_need_admin() {
    let (addr, _engine) = start_test_server().await;
    let (admin, bid) = campus(addr).await;
    let ada = connect(addr, "ada@campus.edu", ADA_PASSWORD).await;

    assert_eq!(
        sqlstate(&ada, &format!("INSERT INTO buildings (id, name) VALUES ('{}', 'Annex')", Ulid::new())).await,
        "42501"
    );
    assert_eq!(
        sqlstate(&ada, &format!("DELETE FROM rooms WHERE building_id = '{bid}' AND name = 'E-101'")).await,
        "42501"
    );

    admin
        .batch_execute(&format!(
            "UPDATE rooms SET paused = true WHERE building_id = '{bid}' AND name = 'E-101'"
        ))
        .await
        .unwrap();
    assert!(rows(&ada, &format!("SELECT * FROM rooms WHERE building_id = '{bid}'")).await.is_empty());
    assert_eq!(rows(&admin, &format!("SELECT * FROM rooms WHERE building_id = '{bid}'")).await.len(), 1);
    assert_eq!(sqlstate(&ada, &book_sql(Ulid::new(), bid, "10:00", "11:00")).await, "55000");
}

#[tokio::test]
async fn available_rooms_and_open_slots() {
    let (addr, _engine) = start_test_server().await;
    let (admin, bid) = campus(addr).await;
    admin
        .batch_execute(&format!(
            r#"INSERT INTO rooms (building_id, name, schedule) VALUES ('{bid}', 'E-102', '[{{"days":["Mon"],"start":"08:00","end":"12:00"}}]')"#
        ))
        .await
        .unwrap();
    let ada = connect(addr, "ada@campus.edu", ADA_PASSWORD).await;
    ada.batch_execute(&book_sql(Ulid::new(), bid, "10:00", "11:00")).await.unwrap();

    let available = rows(
        &ada,
        &format!(
            r#"SELECT * FROM available_rooms WHERE building_id = '{bid}' AND date = '{MONDAY}' AND start = '10:30' AND "end" = '11:30'"#
        ),
    )
    .await;
    let names: Vec<&str> = available.iter().filter_map(|r| r.get("room")).collect();
    assert_eq!(names, vec!["E-102"]);

    let slots = rows(
        &ada,
        &format!("SELECT * FROM open_slots WHERE building_id = '{bid}' AND room = 'E-101' AND date = '{MONDAY}'"),
    )
    .await;
    let slots: Vec<(&str, &str)> = slots
        .iter()
        .map(|r| (r.get("start").unwrap(), r.get("end").unwrap()))
        .collect();
    assert_eq!(slots, vec![("09:00", "10:00"), ("11:00", "17:00")]);
}

#[tokio::test]
async fn extended_protocol_with_parameters() {
    let (addr, _engine) = start_test_server().await;
    let (_admin, bid) = campus(addr).await;
    let ada = connect(addr, "ada@campus.edu", ADA_PASSWORD).await;

    let id = Ulid::new();
    ada.batch_execute(&book_sql(id, bid, "13:00", "14:00")).await.unwrap();

    let found = ada
        .query("SELECT * FROM bookings WHERE building_id = $1", &[&bid.to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let booking_id: String = found[0].get("id");
    let canceled: bool = found[0].get("canceled");
    assert_eq!(booking_id, id.to_string());
    assert!(!canceled);
}

#[tokio::test]
async fn signup_session_registers_members_only() {
    let (addr, engine) = start_test_server().await;
    let signup = connect(addr, "signup", SIGNUP_PASSWORD).await;
    assert!(config(addr, "signup", "guess").connect(NoTls).await.is_err());

    signup
        .batch_execute(&format!(
            "INSERT INTO users (id, name, email, status, password) VALUES ('{}', 'Cy', 'cy@campus.edu', 'Student', 'cy-pw')",
            Ulid::new()
        ))
        .await
        .unwrap();
    assert_eq!(sqlstate(&signup, "SELECT * FROM users").await, "42501");
    assert_eq!(
        sqlstate(
            &signup,
            &format!(
                "INSERT INTO users (id, name, email, status, password) VALUES ('{}', 'Mallory', 'ADMIN@campus.edu', 'Staff', 'x')",
                Ulid::new()
            )
        )
        .await,
        "42501"
    );
    assert_eq!(
        sqlstate(
            &signup,
            &format!(
                "INSERT INTO users (id, name, email, status, password) VALUES ('{}', 'Cy', 'cy@campus.edu', 'Student', 'x')",
                Ulid::new()
            )
        )
        .await,
        "23505"
    );

    let cy = connect(addr, "cy@campus.edu", "cy-pw").await;
    let me = rows(&cy, "SELECT * FROM users").await;
    assert_eq!(me.len(), 1);
    assert_eq!(me[0].get("role"), Some("member"));
    assert!(me[0].columns().iter().all(|c| c.name() != "password"));

    // owners can change their own password
    let id = engine.user_by_email("cy@campus.edu").unwrap().id;
    cy.batch_execute(&format!("UPDATE users SET password = 'cy-pw2' WHERE id = '{id}'"))
        .await
        .unwrap();
    assert!(config(addr, "cy@campus.edu", "cy-pw").connect(NoTls).await.is_err());
    connect(addr, "cy@campus.edu", "cy-pw2").await;
}

#[tokio::test]
async fn bound_values_are_not_rescanned_for_placeholders() {
    let (addr, _engine) = start_test_server().await;
    let (_admin, bid) = campus(addr).await;
    let ada = connect(addr, "ada@campus.edu", ADA_PASSWORD).await;

    let id = Ulid::new();
    ada.batch_execute(&book_sql(id, bid, "13:00", "14:00")).await.unwrap();
    ada.execute(
        "UPDATE bookings SET cancel_reason = $2 WHERE id = $1",
        &[&id.to_string(), &"fee is $1"],
    )
    .await
    .unwrap();

    let listed = rows(&ada, "SELECT * FROM bookings").await;
    assert_eq!(listed[0].get("cancel_reason"), Some("fee is $1"));
}

#[tokio::test]
async fn bad_sql_is_a_syntax_error() {
    let (addr, _engine) = start_test_server().await;
    let admin = connect(addr, ADMIN, ADMIN_PASSWORD).await;

    assert_eq!(sqlstate(&admin, "SELEC * FROM bookings").await, "42601");
    assert_eq!(sqlstate(&admin, "SELECT * FROM holds").await, "42601");
}
