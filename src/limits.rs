//! Hard caps on input sizes and state growth.

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_PASSWORD_LEN: usize = 128;

pub const MAX_USERS: usize = 1_000_000;
pub const MAX_BUILDINGS: usize = 10_000;
pub const MAX_ROOMS_PER_BUILDING: usize = 1_000;
pub const MAX_WINDOWS_PER_ROOM: usize = 64;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;
