use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use log::warn;

use crate::{CollabContext, CollabResult, PinnedFriendData, PrimaryKey, TaskData, TaskStore};

/// Combines pins and friends' task views into the home screen
pub struct Dashboard {
    context: CollabContext,
    tasks: TaskStore,
}

/// One entry per pinned friend, in the order they were pinned
#[derive(Debug, Clone)]
pub struct PinnedFriendTasks {
    pub friend_id: PrimaryKey,
    pub friend_username: Option<String>,
    pub friend_display_name: Option<String>,
    /// The friend's today view, without private tasks
    pub tasks: Vec<TaskData>,
}

impl Dashboard {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
            tasks: TaskStore::new(context),
        }
    }

    /// Today tasks of every friend the user has pinned.
    ///
    /// Friends are fetched concurrently. If a friend's tasks can't be read,
    /// that friend is still listed, with no tasks, so one failure doesn't
    /// take down the whole dashboard.
    pub async fn pinned_friends_today_tasks(
        &self,
        user_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> CollabResult<Vec<PinnedFriendTasks>> {
        let database = &self.context.database;
        let mut pins = vec![];

        // A pin can outlive its friendship if an unfriend was interrupted
        for pin in database.pinned_friends(user_id).await? {
            if database.are_friends(user_id, pin.friend.id).await? {
                pins.push(pin);
            }
        }

        let entries = pins.into_iter().map(|pin| self.entry(pin, now));

        Ok(join_all(entries).await)
    }

    async fn entry(&self, pin: PinnedFriendData, now: DateTime<Utc>) -> PinnedFriendTasks {
        let friend = pin.friend;

        let tasks = match self.tasks.today_tasks(friend.id, now).await {
            Ok(tasks) => tasks.into_iter().filter(|t| !t.is_private).collect(),
            Err(e) => {
                warn!("Could not load today tasks of user {}: {}", friend.id, e);
                vec![]
            }
        };

        PinnedFriendTasks {
            friend_id: friend.id,
            friend_username: friend.username,
            friend_display_name: friend.display_name,
            tasks,
        }
    }
}
