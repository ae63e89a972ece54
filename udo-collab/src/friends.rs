use chrono::{DateTime, Utc};
use log::info;

use crate::{
    CollabContext, CollabError, CollabResult, DatabaseError, DatabaseResult, FriendPermissionData,
    FriendRequestData, FriendRequestWithUser, NewFriendPermission, NewFriendRequest, PrimaryKey,
    RequestStatus, UserData, UserDirectory,
};

/// Owns friend requests, the friendships they produce, pins, and
/// per-friend task permissions.
///
/// A request moves from pending to accepted or declined by the recipient,
/// or is withdrawn (deleted) by the requester while still pending. The
/// friendship rows created on acceptance are what every "are these two
/// friends" check reads. The request row is kept as a record.
pub struct FriendshipGraph {
    context: CollabContext,
    users: UserDirectory,
}

/// Pending requests involving a user
#[derive(Debug)]
pub struct FriendRequests {
    /// Requests the user has received
    pub incoming: Vec<FriendRequestWithUser>,
    /// Requests the user has sent
    pub outgoing: Vec<FriendRequestWithUser>,
}

impl FriendshipGraph {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
            users: UserDirectory::new(context),
        }
    }

    /// Sends a pending request from `requester_id` to `recipient_id`.
    ///
    /// Fails with a conflict while either side has a pending request to the
    /// other. Two identical requests racing are settled by the storage's
    /// unique pair constraint. Crossing requests (each user asking the
    /// other at once) can both be stored; accepting either settles both.
    pub async fn send_request(
        &self,
        requester_id: PrimaryKey,
        recipient_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> CollabResult<FriendRequestData> {
        if requester_id == recipient_id {
            return Err(CollabError::validation(
                "You cannot send a friend request to yourself",
            ));
        }

        let database = &self.context.database;
        let recipient = database.user_by_id(recipient_id).await?;
        let pair = format!("{}:{}", requester_id, recipient_id);

        if database.are_friends(requester_id, recipient_id).await? {
            return Err(DatabaseError::Conflict {
                resource: "friendship",
                field: "user:friend",
                value: pair,
            }
            .into());
        }

        let reverse = database
            .friend_request_between(recipient_id, requester_id)
            .await
            .optional()?;

        if reverse.is_some_and(|r| r.status == RequestStatus::Pending) {
            return Err(DatabaseError::Conflict {
                resource: "friend request",
                field: "recipient:requester",
                value: pair,
            }
            .into());
        }

        let existing = database
            .friend_request_between(requester_id, recipient_id)
            .await
            .optional()?;

        match existing {
            Some(request) if request.status == RequestStatus::Pending => {
                return Err(DatabaseError::Conflict {
                    resource: "friend request",
                    field: "requester:recipient",
                    value: pair,
                }
                .into())
            }
            // An old request from an ended friendship or a decline makes way for the new one
            Some(stale) => database.delete_friend_request(stale.id).await?,
            None => {}
        }

        let request = database
            .create_friend_request(NewFriendRequest {
                requester_id,
                recipient_id: recipient.id,
                status: RequestStatus::Pending,
                now,
            })
            .await?;

        info!("User {} sent a friend request to user {}", requester_id, recipient_id);
        Ok(request)
    }

    /// Accepts a pending request. Only the recipient may do this.
    pub async fn accept_request(
        &self,
        request_id: PrimaryKey,
        caller_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> CollabResult<FriendRequestData> {
        let request = self.pending_request(request_id).await?;

        if request.recipient_id != caller_id {
            return Err(CollabError::not_authorized(
                "Only the recipient can accept a friend request",
            ));
        }

        let database = &self.context.database;

        // Edges first, so a retry after a failed status update is harmless
        database
            .create_friendship(request.requester_id, request.recipient_id, now)
            .await?;

        let request = database
            .update_friend_request_status(request_id, RequestStatus::Accepted, now)
            .await?;

        let crossing = database
            .friend_request_between(request.recipient_id, request.requester_id)
            .await
            .optional()?;

        if let Some(crossing) = crossing.filter(|r| r.status == RequestStatus::Pending) {
            database.delete_friend_request(crossing.id).await?;
        }

        info!(
            "Users {} and {} are now friends",
            request.requester_id, request.recipient_id
        );

        Ok(request)
    }

    /// Declines a pending request. Only the recipient may do this.
    pub async fn decline_request(
        &self,
        request_id: PrimaryKey,
        caller_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> CollabResult<FriendRequestData> {
        let request = self.pending_request(request_id).await?;

        if request.recipient_id != caller_id {
            return Err(CollabError::not_authorized(
                "Only the recipient can decline a friend request",
            ));
        }

        Ok(self
            .context
            .database
            .update_friend_request_status(request_id, RequestStatus::Declined, now)
            .await?)
    }

    /// Removes a pending request. Only the requester may do this.
    pub async fn withdraw_request(
        &self,
        request_id: PrimaryKey,
        caller_id: PrimaryKey,
    ) -> CollabResult<()> {
        let request = self.pending_request(request_id).await?;

        if request.requester_id != caller_id {
            return Err(CollabError::not_authorized(
                "Only the requester can withdraw a friend request",
            ));
        }

        Ok(self
            .context
            .database
            .delete_friend_request(request_id)
            .await?)
    }

    /// Ends a friendship, removing both edges along with pins and permissions
    /// in both directions. Each step is idempotent, so unfriending a
    /// non-friend succeeds and an interrupted unfriend can be repeated.
    pub async fn unfriend(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> CollabResult<()> {
        let database = &self.context.database;

        for (a, b) in [(user_id, friend_id), (friend_id, user_id)] {
            database.delete_friendship(a, b).await?;
            database.delete_pin(a, b).await?;
            database.delete_friend_permission(a, b).await?;
        }

        info!("Users {} and {} are no longer friends", user_id, friend_id);
        Ok(())
    }

    /// Pins a friend to the user's dashboard. Pinning twice has no effect.
    pub async fn pin(
        &self,
        user_id: PrimaryKey,
        friend_username: &str,
        now: DateTime<Utc>,
    ) -> CollabResult<UserData> {
        let friend = self.users.require_by_username(friend_username).await?;
        self.ensure_friends(user_id, friend.id).await?;

        self.context
            .database
            .create_pin(user_id, friend.id, now)
            .await?;

        Ok(friend)
    }

    pub async fn unpin(&self, user_id: PrimaryKey, friend_username: &str) -> CollabResult<()> {
        let friend = self.users.require_by_username(friend_username).await?;

        Ok(self.context.database.delete_pin(user_id, friend.id).await?)
    }

    /// Allows or disallows `friend_id` to create tasks owned by `user_id`
    pub async fn set_create_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
        allowed: bool,
        now: DateTime<Utc>,
    ) -> CollabResult<FriendPermissionData> {
        self.ensure_friends(user_id, friend_id).await?;

        Ok(self
            .context
            .database
            .set_friend_permission(NewFriendPermission {
                user_id,
                friend_id,
                can_create_tasks: allowed,
                now,
            })
            .await?)
    }

    /// Returns true if `friend_id` may create tasks owned by `user_id`
    pub async fn create_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
    ) -> CollabResult<bool> {
        let permission = self
            .context
            .database
            .friend_permission(user_id, friend_id)
            .await
            .optional()?;

        Ok(permission.is_some_and(|p| p.can_create_tasks))
    }

    /// Every permission the user has granted
    pub async fn permissions(&self, user_id: PrimaryKey) -> CollabResult<Vec<FriendPermissionData>> {
        Ok(self
            .context
            .database
            .list_friend_permissions(user_id)
            .await?)
    }

    pub async fn are_friends(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> CollabResult<bool> {
        Ok(self.context.database.are_friends(user_id, friend_id).await?)
    }

    /// The user's friends, sorted by username
    pub async fn list_friends(&self, user_id: PrimaryKey) -> CollabResult<Vec<UserData>> {
        Ok(self.context.database.list_friends(user_id).await?)
    }

    pub async fn list_requests(&self, user_id: PrimaryKey) -> CollabResult<FriendRequests> {
        let database = &self.context.database;

        Ok(FriendRequests {
            incoming: database.incoming_requests(user_id).await?,
            outgoing: database.outgoing_requests(user_id).await?,
        })
    }

    async fn pending_request(&self, request_id: PrimaryKey) -> CollabResult<FriendRequestData> {
        let request = self
            .context
            .database
            .friend_request_by_id(request_id)
            .await?;

        if request.status != RequestStatus::Pending {
            return Err(DatabaseError::NotFound {
                resource: "pending friend request",
                identifier: "id",
            }
            .into());
        }

        Ok(request)
    }

    async fn ensure_friends(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> CollabResult<()> {
        if !self.are_friends(user_id, friend_id).await? {
            return Err(CollabError::not_authorized("You are not friends with this user"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::FriendshipGraph;
    use crate::{testing, CollabError, Database, DatabaseError, NewFriendRequest, RequestStatus};

    fn is_conflict<T>(result: &Result<T, CollabError>) -> bool {
        matches!(result, Err(CollabError::Db(DatabaseError::Conflict { .. })))
    }

    #[tokio::test]
    async fn accepting_creates_a_symmetric_friendship() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let request = friends.send_request(alice.id, bob.id, now).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let requests = friends.list_requests(bob.id).await.unwrap();
        assert_eq!(requests.incoming.len(), 1);
        assert_eq!(requests.incoming[0].counterparty.id, alice.id);
        assert_eq!(friends.list_requests(alice.id).await.unwrap().outgoing.len(), 1);

        let accepted = friends.accept_request(request.id, bob.id, now).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);

        assert!(database.are_friends(alice.id, bob.id).await.unwrap());
        assert!(database.are_friends(bob.id, alice.id).await.unwrap());

        let of_alice = friends.list_friends(alice.id).await.unwrap();
        let of_bob = friends.list_friends(bob.id).await.unwrap();
        assert_eq!(of_alice.iter().map(|u| u.id).collect::<Vec<_>>(), vec![bob.id]);
        assert_eq!(of_bob.iter().map(|u| u.id).collect::<Vec<_>>(), vec![alice.id]);

        for user in [alice.id, bob.id] {
            let requests = friends.list_requests(user).await.unwrap();
            assert!(requests.incoming.is_empty());
            assert!(requests.outgoing.is_empty());
        }
    }

    #[tokio::test]
    async fn duplicate_requests_conflict_in_both_directions() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        friends.send_request(alice.id, bob.id, now).await.unwrap();

        assert!(is_conflict(&friends.send_request(alice.id, bob.id, now).await));
        assert!(is_conflict(&friends.send_request(bob.id, alice.id, now).await));
    }

    #[tokio::test]
    async fn simultaneous_identical_requests_store_one() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let (first, second) = tokio::join!(
            friends.send_request(alice.id, bob.id, now),
            friends.send_request(alice.id, bob.id, now)
        );

        assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
        assert!(is_conflict(&first) || is_conflict(&second));
        assert_eq!(friends.list_requests(bob.id).await.unwrap().incoming.len(), 1);
    }

    #[tokio::test]
    async fn storage_rejects_a_second_request_for_the_pair() {
        let (_, database) = testing::context();
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;

        let request = || NewFriendRequest {
            requester_id: alice.id,
            recipient_id: bob.id,
            status: RequestStatus::Pending,
            now: testing::now(),
        };

        database.create_friend_request(request()).await.unwrap();
        let duplicate = database.create_friend_request(request()).await;

        assert!(matches!(duplicate, Err(DatabaseError::Conflict { .. })));
    }

    #[tokio::test]
    async fn accepting_settles_a_crossing_request() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let (to_bob, _) = tokio::join!(
            database.create_friend_request(NewFriendRequest {
                requester_id: alice.id,
                recipient_id: bob.id,
                status: RequestStatus::Pending,
                now,
            }),
            database.create_friend_request(NewFriendRequest {
                requester_id: bob.id,
                recipient_id: alice.id,
                status: RequestStatus::Pending,
                now,
            })
        );

        friends
            .accept_request(to_bob.unwrap().id, bob.id, now)
            .await
            .unwrap();

        for user in [alice.id, bob.id] {
            let requests = friends.list_requests(user).await.unwrap();
            assert!(requests.incoming.is_empty());
            assert!(requests.outgoing.is_empty());
        }

        assert!(friends.are_friends(alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn requests_to_friends_or_self_are_rejected() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let to_self = friends.send_request(alice.id, alice.id, now).await;
        assert!(matches!(to_self, Err(CollabError::Validation(_))));

        let to_nobody = friends.send_request(alice.id, 9999, now).await;
        assert!(matches!(
            to_nobody,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));

        let request = friends.send_request(alice.id, bob.id, now).await.unwrap();
        friends.accept_request(request.id, bob.id, now).await.unwrap();

        assert!(is_conflict(&friends.send_request(bob.id, alice.id, now).await));
    }

    #[tokio::test]
    async fn only_the_right_party_acts_on_a_request() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let request = friends.send_request(alice.id, bob.id, now).await.unwrap();

        let accept = friends.accept_request(request.id, alice.id, now).await;
        let decline = friends.decline_request(request.id, alice.id, now).await;
        let withdraw = friends.withdraw_request(request.id, bob.id).await;

        assert!(matches!(accept, Err(CollabError::NotAuthorized(_))));
        assert!(matches!(decline, Err(CollabError::NotAuthorized(_))));
        assert!(matches!(withdraw, Err(CollabError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn declined_and_withdrawn_requests() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let request = friends.send_request(alice.id, bob.id, now).await.unwrap();
        let declined = friends.decline_request(request.id, bob.id, now).await.unwrap();
        assert_eq!(declined.status, RequestStatus::Declined);
        assert!(friends.list_requests(bob.id).await.unwrap().incoming.is_empty());

        // A declined request can't be accepted later
        let late = friends.accept_request(request.id, bob.id, now).await;
        assert!(matches!(
            late,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));

        // But alice may ask again
        let again = friends.send_request(alice.id, bob.id, now).await.unwrap();
        friends.withdraw_request(again.id, alice.id).await.unwrap();
        assert!(database.friend_request_by_id(again.id).await.is_err());
        assert!(!database.are_friends(alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn unfriend_cascades_in_both_directions() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let request = friends.send_request(alice.id, bob.id, now).await.unwrap();
        friends.accept_request(request.id, bob.id, now).await.unwrap();

        friends.pin(alice.id, "bob", now).await.unwrap();
        friends.pin(bob.id, "alice", now).await.unwrap();
        friends.set_create_permission(alice.id, bob.id, true, now).await.unwrap();
        friends.set_create_permission(bob.id, alice.id, true, now).await.unwrap();

        friends.unfriend(alice.id, bob.id).await.unwrap();

        for (a, b) in [(alice.id, bob.id), (bob.id, alice.id)] {
            assert!(!database.are_friends(a, b).await.unwrap());
            assert!(database.pinned_friends(a).await.unwrap().is_empty());
            assert!(database.friend_permission(a, b).await.is_err());
        }

        // Unfriending again is a no-op
        friends.unfriend(bob.id, alice.id).await.unwrap();

        // And they can become friends again
        let request = friends.send_request(bob.id, alice.id, now).await.unwrap();
        friends.accept_request(request.id, alice.id, now).await.unwrap();
        assert!(friends.are_friends(alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn pinning_is_idempotent() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let not_yet = friends.pin(alice.id, "bob", now).await;
        assert!(matches!(not_yet, Err(CollabError::NotAuthorized(_))));

        database.create_friendship(alice.id, bob.id, now).await.unwrap();

        friends.pin(alice.id, "Bob", now).await.unwrap();
        friends.pin(alice.id, "bob", now).await.unwrap();
        assert_eq!(database.pinned_friends(alice.id).await.unwrap().len(), 1);

        friends.unpin(alice.id, "bob").await.unwrap();
        friends.unpin(alice.id, "bob").await.unwrap();
        assert!(database.pinned_friends(alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_permission_defaults_to_false() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        database.create_friendship(alice.id, bob.id, now).await.unwrap();
        assert!(!friends.create_permission(alice.id, bob.id).await.unwrap());

        friends.set_create_permission(alice.id, bob.id, true, now).await.unwrap();
        assert!(friends.create_permission(alice.id, bob.id).await.unwrap());
        assert!(!friends.create_permission(bob.id, alice.id).await.unwrap());

        friends.set_create_permission(alice.id, bob.id, false, now).await.unwrap();
        assert!(!friends.create_permission(alice.id, bob.id).await.unwrap());
        assert_eq!(friends.permissions(alice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn friends_are_sorted_by_username() {
        let (context, database) = testing::context();
        let friends = FriendshipGraph::new(&context);
        let me = testing::mock_user(&database, "me").await;
        let now = testing::now();

        for name in ["zoe", "adam", "kim"] {
            let user = testing::mock_user(&database, name).await;
            database.create_friendship(me.id, user.id, now).await.unwrap();
        }

        let names: Vec<_> = friends
            .list_friends(me.id)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|u| u.username)
            .collect();

        assert_eq!(names, vec!["adam", "kim", "zoe"]);
    }
}
