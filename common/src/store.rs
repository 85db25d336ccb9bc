use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::StoreError,
    models::{JackpotPool, LeaderboardEntry, NewTaskLog, NewUser, Poll, User, UserId},
};

/// Persistence boundary for the coin ledger.
///
/// Handlers read a [`User`], mutate it in memory and hand it back to
/// [`LedgerStore::save_user`], which only writes when the stored version
/// still matches the one that was read.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError>;

    /// Conditional write of every mutable field plus any newly appended
    /// missions. Fails with [`StoreError::Conflict`] when `user.version` is stale.
    async fn save_user(&self, user: &User) -> Result<User, StoreError>;

    /// [`LedgerStore::save_user`] plus the task-log entry for the claim, in
    /// one write. Neither lands if the other fails.
    async fn save_claim(&self, user: &User, log: Option<NewTaskLog>) -> Result<User, StoreError>;
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Highest balances first, admins excluded.
    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError>;

    async fn active_poll(&self) -> Result<Option<Poll>, StoreError>;
    /// Inserts a poll and points the active-poll record at it.
    async fn create_poll(
        &self,
        question: &str,
        options: &[String],
        now: DateTime<Utc>,
    ) -> Result<Poll, StoreError>;

    /// Saves the voter, logs the reward and counts the vote atomically.
    /// An unknown poll or option fails with [`StoreError::NotFound`] and
    /// leaves the user untouched.
    async fn save_vote(
        &self,
        user: &User,
        log: Option<NewTaskLog>,
        poll_id: i64,
        option_index: usize,
    ) -> Result<(User, Poll), StoreError>;

    /// Opens a new pool if there is none or the active one has expired.
    /// Returns the new pool, or `None` when the active pool is still live.
    async fn rollover_jackpot(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<JackpotPool>, StoreError>;

    async fn current_jackpot(&self, now: DateTime<Utc>) -> Result<JackpotPool, StoreError>;

    /// Saves the already debited buyer, appends their ticket and grows the
    /// pot by `price`, all or nothing.
    async fn save_ticket_purchase(
        &self,
        user: &User,
        pool_id: i64,
        price: i64,
    ) -> Result<(User, JackpotPool), StoreError>;
}
