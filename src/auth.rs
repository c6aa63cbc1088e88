use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use tracing::info;

use crate::engine::Engine;
use crate::observability::AUTH_FAILURES_TOTAL;

/// Login name of the shared registration session.
pub const SIGNUP_LOGIN: &str = "signup";

/// Per-user cleartext passwords. The `signup` login uses the server password
/// instead and may only register new accounts.
pub struct RoombookAuthSource {
    engine: Arc<Engine>,
    signup_password: String,
}

impl std::fmt::Debug for RoombookAuthSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoombookAuthSource").finish_non_exhaustive()
    }
}

impl RoombookAuthSource {
    pub fn new(engine: Arc<Engine>, signup_password: String) -> Self {
        Self {
            engine,
            signup_password,
        }
    }

    fn refuse(reason: &str) -> PgWireError {
        metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
        PgWireError::UserError(Box::new(ErrorInfo::new(
            "FATAL".into(),
            "28000".into(),
            reason.to_string(),
        )))
    }
}

#[async_trait]
impl AuthSource for RoombookAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let Some(email) = login.user() else {
            return Err(Self::refuse("no user name given"));
        };
        if email == SIGNUP_LOGIN {
            return Ok(Password::new(None, self.signup_password.as_bytes().to_vec()));
        }
        let Some(user) = self.engine.user_by_email(email) else {
            info!("login refused for unknown user {email}");
            return Err(Self::refuse("unknown user"));
        };
        if user.suspended {
            info!("login refused for suspended user {email}");
            return Err(Self::refuse("account suspended"));
        }
        Ok(Password::new(None, user.password.into_bytes()))
    }
}
