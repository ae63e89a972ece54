//! Helpers shared by the service tests

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use udo_core::Config;

use crate::{CollabContext, Database, MemoryDatabase, NewUser, UserData};

/// Noon on a fixed day, so day boundaries are predictable
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
}

pub fn context() -> (CollabContext, Arc<MemoryDatabase>) {
    let database = Arc::new(MemoryDatabase::new());
    let context = CollabContext {
        database: database.clone(),
        config: Config::default(),
    };

    (context, database)
}

pub async fn mock_user(database: &MemoryDatabase, username: &str) -> UserData {
    database
        .create_user(NewUser {
            email: format!("{username}@example.com"),
            display_name: Some(username.to_string()),
            username: Some(username.to_string()),
            now: now(),
        })
        .await
        .unwrap()
}
