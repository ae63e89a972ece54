use chrono::{DateTime, Utc};
use udo_core::{is_valid_username, normalize_username};

use crate::{
    CollabContext, CollabError, CollabResult, DatabaseResult, PrimaryKey, UpdatedUser, UserData,
};

/// Stores user records and resolves usernames.
/// Usernames are compared in their lowercase form everywhere.
pub struct UserDirectory {
    context: CollabContext,
}

/// A partial profile update. Omitted fields are left unchanged.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub username: Option<String>,
}

impl UserDirectory {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn user(&self, user_id: PrimaryKey) -> CollabResult<UserData> {
        Ok(self.context.database.user_by_id(user_id).await?)
    }

    /// Returns the user with this username, if any
    pub async fn resolve_by_username(&self, username: &str) -> CollabResult<Option<UserData>> {
        let username = normalize_username(username);

        Ok(self
            .context
            .database
            .user_by_username(&username)
            .await
            .optional()?)
    }

    /// Like [Self::resolve_by_username], but a missing user is an error
    pub async fn require_by_username(&self, username: &str) -> CollabResult<UserData> {
        let username = normalize_username(username);

        Ok(self.context.database.user_by_username(&username).await?)
    }

    pub async fn is_username_available(&self, username: &str) -> CollabResult<bool> {
        let username = validated_username(username)?;

        Ok(self.resolve_by_username(&username).await?.is_none())
    }

    /// Users whose username starts with `query`, excluding the caller.
    /// Queries shorter than the configured minimum return nothing.
    pub async fn search_by_username_prefix(
        &self,
        query: &str,
        exclude_user_id: PrimaryKey,
        limit: Option<usize>,
    ) -> CollabResult<Vec<UserData>> {
        let config = &self.context.config;
        let query = normalize_username(query);

        if query.chars().count() < config.min_search_length {
            return Ok(vec![]);
        }

        let limit = limit.unwrap_or(config.search_limit).min(config.search_limit);

        Ok(self
            .context
            .database
            .search_users(&query, exclude_user_id, limit)
            .await?)
    }

    pub async fn update_profile(
        &self,
        user_id: PrimaryKey,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> CollabResult<UserData> {
        let display_name = match update.display_name {
            Some(name) if name.trim().is_empty() => {
                return Err(CollabError::validation("Display name cannot be empty"))
            }
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };

        let username = update
            .username
            .as_deref()
            .map(validated_username)
            .transpose()?;

        Ok(self
            .context
            .database
            .update_user(UpdatedUser {
                id: user_id,
                display_name,
                username,
                now,
            })
            .await?)
    }
}

fn validated_username(username: &str) -> CollabResult<String> {
    if !is_valid_username(username) {
        return Err(CollabError::validation(
            "Username must be 3 to 32 characters of letters, digits, '_' or '.'",
        ));
    }

    Ok(normalize_username(username))
}

#[cfg(test)]
mod test {
    use super::{ProfileUpdate, UserDirectory};
    use crate::{testing, CollabError, DatabaseError};

    #[tokio::test]
    async fn usernames_resolve_case_insensitively() {
        let (context, database) = testing::context();
        let users = UserDirectory::new(&context);
        let alice = testing::mock_user(&database, "alice").await;

        let resolved = users.resolve_by_username("ALICE").await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(alice.id));

        assert!(!users.is_username_available("Alice").await.unwrap());
        assert!(users.is_username_available("bob").await.unwrap());
        assert!(users.resolve_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefix_search() {
        let (context, database) = testing::context();
        let users = UserDirectory::new(&context);

        let me = testing::mock_user(&database, "john").await;
        testing::mock_user(&database, "johanna").await;
        testing::mock_user(&database, "joseph").await;
        testing::mock_user(&database, "mary").await;

        let found: Vec<_> = users
            .search_by_username_prefix("Jo", me.id, None)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|u| u.username)
            .collect();

        assert_eq!(found, vec!["johanna".to_string(), "joseph".to_string()]);

        let too_short = users.search_by_username_prefix("j", me.id, None).await;
        assert!(too_short.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let (context, database) = testing::context();
        let users = UserDirectory::new(&context);
        let me = testing::mock_user(&database, "zed").await;

        for i in 0..15 {
            testing::mock_user(&database, &format!("user{i:02}")).await;
        }

        let found = users
            .search_by_username_prefix("user", me.id, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 10);

        let found = users
            .search_by_username_prefix("user", me.id, Some(3))
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn profile_updates_are_partial() {
        let (context, database) = testing::context();
        let users = UserDirectory::new(&context);
        let alice = testing::mock_user(&database, "alice").await;

        let updated = users
            .update_profile(
                alice.id,
                ProfileUpdate {
                    display_name: Some("Alice A.".to_string()),
                    username: None,
                },
                testing::now(),
            )
            .await
            .unwrap();

        assert_eq!(updated.display_name.as_deref(), Some("Alice A."));
        assert_eq!(updated.username.as_deref(), Some("alice"));

        let updated = users
            .update_profile(
                alice.id,
                ProfileUpdate {
                    display_name: None,
                    username: Some("Wonderland".to_string()),
                },
                testing::now(),
            )
            .await
            .unwrap();

        assert_eq!(updated.display_name.as_deref(), Some("Alice A."));
        assert_eq!(updated.username.as_deref(), Some("wonderland"));
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let (context, database) = testing::context();
        let users = UserDirectory::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        testing::mock_user(&database, "bob").await;

        let result = users
            .update_profile(
                alice.id,
                ProfileUpdate {
                    username: Some("BOB".to_string()),
                    ..Default::default()
                },
                testing::now(),
            )
            .await;

        assert!(matches!(
            result,
            Err(CollabError::Db(DatabaseError::Conflict { .. }))
        ));

        // Keeping your own username is fine
        let result = users
            .update_profile(
                alice.id,
                ProfileUpdate {
                    username: Some("alice".to_string()),
                    ..Default::default()
                },
                testing::now(),
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn invalid_profile_input_is_rejected() {
        let (context, database) = testing::context();
        let users = UserDirectory::new(&context);
        let alice = testing::mock_user(&database, "alice").await;

        let empty_name = ProfileUpdate {
            display_name: Some("   ".to_string()),
            ..Default::default()
        };
        let bad_username = ProfileUpdate {
            username: Some("no spaces allowed".to_string()),
            ..Default::default()
        };

        for update in [empty_name, bad_username] {
            let result = users.update_profile(alice.id, update, testing::now()).await;
            assert!(matches!(result, Err(CollabError::Validation(_))));
        }
    }
}
