use std::sync::Arc;

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::task::spawn_blocking;
use udo_core::{is_valid_email, normalize_email};

use crate::{
    util::{random_digits, random_string},
    CollabContext, DatabaseError, DatabaseResult, NewSession, NewUser, NewVerificationCode,
    SessionData,
};

pub type DeliveryError = Box<dyn std::error::Error + Send + Sync>;

/// Delivers verification codes to users. Email delivery lives outside this crate.
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), DeliveryError>;
}

/// A sender that writes codes to the log, for development setups
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), DeliveryError> {
        info!("Verification code for {}: {}", email, code);
        Ok(())
    }
}

pub struct Auth {
    context: CollabContext,
    argon: Argon2<'static>,
    sender: Arc<dyn CodeSender>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Invalid email address")]
    InvalidEmail,
    /// The code is wrong, or no code was requested
    #[error("Invalid verification code")]
    InvalidCode,
    #[error("Verification code has expired")]
    CodeExpired,
    #[error("Verification code could not be delivered: {0}")]
    Delivery(String),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    pub fn new(context: &CollabContext, sender: Arc<dyn CodeSender>) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
            sender,
        }
    }

    /// Sends a fresh verification code to the email, replacing any earlier one
    pub async fn request_code(&self, email: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }

        let config = &self.context.config;
        let email = normalize_email(email);
        let code = random_digits(config.verification_code_length);
        let code_hash = self.hash(code.clone()).await?;

        self.context
            .database
            .upsert_verification_code(NewVerificationCode {
                email: email.clone(),
                code_hash,
                expires_at: now + Duration::minutes(config.verification_code_ttl_in_minutes),
            })
            .await
            .map_err(AuthError::Db)?;

        self.sender.send_code(&email, &code).await.map_err(|e| {
            warn!("Could not deliver verification code to {}: {}", email, e);
            AuthError::Delivery(e.to_string())
        })
    }

    /// Verifies an emailed code, returning a new session.
    /// The first successful verification for an email creates its account.
    pub async fn verify_code(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionData, AuthError> {
        self.clear_expired(now).await;

        let database = &self.context.database;
        let email = normalize_email(email);

        let stored = database
            .verification_code_by_email(&email)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCode,
                err => AuthError::Db(err),
            })?;

        if stored.expires_at <= now {
            database
                .delete_verification_code(&email)
                .await
                .map_err(AuthError::Db)?;

            return Err(AuthError::CodeExpired);
        }

        // Counted before checking, so concurrent guesses cannot exceed the limit
        let attempts = database
            .record_verification_attempt(&email)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCode,
                err => AuthError::Db(err),
            })?;

        if attempts > self.context.config.max_verification_attempts {
            warn!("Too many verification attempts for {}", email);

            database
                .delete_verification_code(&email)
                .await
                .map_err(AuthError::Db)?;

            return Err(AuthError::InvalidCode);
        }

        self.verify(code.to_string(), stored.code_hash).await?;

        database
            .delete_verification_code(&email)
            .await
            .map_err(AuthError::Db)?;

        let user = match database.user_by_email(&email).await.optional() {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!("Creating account for {}", email);

                database
                    .create_user(NewUser {
                        email,
                        display_name: None,
                        username: None,
                        now,
                    })
                    .await
                    .map_err(AuthError::Db)?
            }
            Err(err) => return Err(AuthError::Db(err)),
        };

        let expires_at = now + Duration::days(self.context.config.session_duration_in_days);

        database
            .create_session(NewSession {
                token: random_string(32),
                user_id: user.id,
                expires_at,
            })
            .await
            .map_err(AuthError::Db)
    }

    /// Returns the session for a bearer token, if it exists and is still valid
    pub async fn session(&self, token: &str, now: DateTime<Utc>) -> Result<SessionData, AuthError> {
        let session = self
            .context
            .database
            .session_by_token(token)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::NotAuthenticated,
                err => AuthError::Db(err),
            })?;

        if session.expires_at <= now {
            return Err(AuthError::NotAuthenticated);
        }

        Ok(session)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.context.database.delete_session_by_token(token).await
    }

    async fn hash(&self, code: String) -> Result<String, AuthError> {
        let argon = self.argon.clone();

        spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);

            argon
                .hash_password(code.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .await
        .map_err(|e| AuthError::HashError(e.to_string()))?
        .map_err(|e| AuthError::HashError(e.to_string()))
    }

    async fn verify(&self, code: String, code_hash: String) -> Result<(), AuthError> {
        let argon = self.argon.clone();

        spawn_blocking(move || {
            let stored = PasswordHash::new(&code_hash)
                .map_err(|e| AuthError::HashError(e.to_string()))?;

            argon
                .verify_password(code.as_bytes(), &stored)
                .map_err(|_| AuthError::InvalidCode)
        })
        .await
        .map_err(|e| AuthError::HashError(e.to_string()))?
    }

    async fn clear_expired(&self, now: DateTime<Utc>) {
        if let Err(e) = self.context.database.clear_expired_sessions(now).await {
            warn!("Could not clear expired sessions: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;
    use parking_lot::Mutex;

    use super::{Auth, AuthError, CodeSender, DeliveryError};
    use crate::{testing, Database};

    /// Keeps delivered codes so tests can read them back
    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl Outbox {
        fn last_code(&self) -> String {
            self.sent.lock().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl CodeSender for Outbox {
        async fn send_code(&self, email: &str, code: &str) -> Result<(), DeliveryError> {
            self.sent.lock().push((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    fn auth() -> (Auth, Arc<Outbox>, Arc<crate::MemoryDatabase>) {
        let (context, database) = testing::context();
        let outbox = Arc::new(Outbox::default());

        (Auth::new(&context, outbox.clone()), outbox, database)
    }

    #[tokio::test]
    async fn first_verification_creates_the_account() {
        let (auth, outbox, database) = auth();
        let now = testing::now();

        auth.request_code(" New@Example.com ", now).await.unwrap();
        let code = outbox.last_code();
        assert_eq!(code.len(), 6);

        let session = auth
            .verify_code("new@example.com", &code, now)
            .await
            .unwrap();

        assert_eq!(session.user.email, "new@example.com");
        assert_eq!(session.token.len(), 32);
        assert!(database.user_by_email("new@example.com").await.is_ok());

        let resolved = auth.session(&session.token, now).await.unwrap();
        assert_eq!(resolved.user.id, session.user.id);
    }

    #[tokio::test]
    async fn codes_are_single_use() {
        let (auth, outbox, _) = auth();
        let now = testing::now();

        auth.request_code("someone@example.com", now).await.unwrap();
        let code = outbox.last_code();

        auth.verify_code("someone@example.com", &code, now)
            .await
            .unwrap();

        let reused = auth.verify_code("someone@example.com", &code, now).await;
        assert!(matches!(reused, Err(AuthError::InvalidCode)));
    }

    #[tokio::test]
    async fn wrong_and_expired_codes_are_rejected() {
        let (auth, outbox, _) = auth();
        let now = testing::now();

        auth.request_code("someone@example.com", now).await.unwrap();
        let code = outbox.last_code();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let result = auth.verify_code("someone@example.com", wrong, now).await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));

        let later = now + Duration::minutes(11);
        let result = auth.verify_code("someone@example.com", &code, later).await;
        assert!(matches!(result, Err(AuthError::CodeExpired)));
    }

    #[tokio::test]
    async fn code_is_discarded_after_too_many_guesses() {
        let (auth, outbox, database) = auth();
        let now = testing::now();

        auth.request_code("someone@example.com", now).await.unwrap();
        let code = outbox.last_code();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..5 {
            let result = auth.verify_code("someone@example.com", wrong, now).await;
            assert!(matches!(result, Err(AuthError::InvalidCode)));
        }

        let result = auth.verify_code("someone@example.com", &code, now).await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));
        assert!(database.user_by_email("someone@example.com").await.is_err());

        auth.request_code("someone@example.com", now).await.unwrap();
        let fresh = outbox.last_code();
        assert!(auth
            .verify_code("someone@example.com", &fresh, now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn guesses_below_the_limit_keep_the_code() {
        let (auth, outbox, _) = auth();
        let now = testing::now();

        auth.request_code("someone@example.com", now).await.unwrap();
        let code = outbox.last_code();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..4 {
            let result = auth.verify_code("someone@example.com", wrong, now).await;
            assert!(matches!(result, Err(AuthError::InvalidCode)));
        }

        assert!(auth
            .verify_code("someone@example.com", &code, now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let (auth, _, _) = auth();

        let result = auth.request_code("not-an-email", testing::now()).await;
        assert!(matches!(result, Err(AuthError::InvalidEmail)));
    }

    #[tokio::test]
    async fn expired_sessions_do_not_authenticate() {
        let (auth, outbox, _) = auth();
        let now = testing::now();

        auth.request_code("someone@example.com", now).await.unwrap();
        let session = auth
            .verify_code("someone@example.com", &outbox.last_code(), now)
            .await
            .unwrap();

        let much_later = now + Duration::days(8);
        let result = auth.session(&session.token, much_later).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));

        auth.logout(&session.token).await.unwrap();
        let result = auth.session(&session.token, now).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }
}
