use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::StoreError,
    models::{
        JackpotPool, LeaderboardEntry, NewTaskLog, NewUser, Poll, PollOption, TaskLogEntry, User,
        UserId,
    },
    store::LedgerStore,
    utils::Role,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    task_logs: Vec<TaskLogEntry>,
    polls: BTreeMap<i64, Poll>,
    active_poll: Option<i64>,
    jackpots: BTreeMap<i64, JackpotPool>,
    active_jackpot: Option<i64>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn open_jackpot(&mut self, now: DateTime<Utc>) -> JackpotPool {
        let pool = JackpotPool::opened_at(self.next_id(), now);
        self.jackpots.insert(pool.id, pool.clone());
        self.active_jackpot = Some(pool.id);
        pool
    }

    fn live_jackpot(&self, now: DateTime<Utc>) -> Option<&JackpotPool> {
        self.active_jackpot
            .and_then(|id| self.jackpots.get(&id))
            .filter(|pool| !pool.is_expired(now))
    }

    fn check_version(&self, user: &User) -> Result<(), StoreError> {
        let stored = self
            .users
            .get(&user.id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;
        if stored.version != user.version {
            return Err(StoreError::Conflict(format!(
                "user {} is at version {}, write carried {}",
                user.id, stored.version, user.version
            )));
        }
        Ok(())
    }

    /// Callers run `check_version` first; nothing here can fail.
    fn store_user(&mut self, user: &User) -> User {
        let mut saved = user.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        self.users.insert(saved.id, saved.clone());
        saved
    }

    fn push_log(&mut self, entry: NewTaskLog) {
        let id = self.next_id();
        self.task_logs.push(TaskLogEntry {
            id,
            user_id: entry.user_id,
            task_type: entry.task_type,
            coins_earned: entry.coins_earned,
            created_at: Utc::now(),
        });
    }
}

/// Process-local store used by tests and `DATABASE_URL=memory` development runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn task_logs(&self) -> Vec<TaskLogEntry> {
        self.tables.read().await.task_logs.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Duplicate(format!("email {}", new_user.email)));
        }
        if tables
            .users
            .values()
            .any(|u| u.referral_code == new_user.referral_code)
        {
            return Err(StoreError::Duplicate(format!(
                "referral code {}",
                new_user.referral_code
            )));
        }

        let now = Utc::now();
        let user = User {
            id: tables.next_id(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            coins: 0,
            referral_code: new_user.referral_code,
            referred_by: new_user.referred_by,
            last_daily_login: None,
            daily_streak: 0,
            last_video_reward: None,
            last_poll_vote: None,
            last_spin: None,
            last_scratch: None,
            completed_missions: Vec::new(),
            multitap_level: 1,
            energy_limit_level: 1,
            role: Role::User,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.referral_code == code)
            .cloned())
    }

    async fn save_user(&self, user: &User) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_version(user)?;
        Ok(tables.store_user(user))
    }

    async fn save_claim(&self, user: &User, log: Option<NewTaskLog>) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_version(user)?;
        let saved = tables.store_user(user);
        if let Some(entry) = log {
            tables.push_log(entry);
        }
        Ok(saved)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.users.remove(&id).is_some())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let tables = self.tables.read().await;
        let mut players: Vec<&User> = tables
            .users
            .values()
            .filter(|u| u.role == Role::User)
            .collect();
        players.sort_by(|a, b| b.coins.cmp(&a.coins).then(a.id.cmp(&b.id)));

        Ok(players
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|u| LeaderboardEntry {
                username: u.username.clone(),
                coins: u.coins,
            })
            .collect())
    }

    async fn active_poll(&self) -> Result<Option<Poll>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .active_poll
            .and_then(|id| tables.polls.get(&id))
            .cloned())
    }

    async fn create_poll(
        &self,
        question: &str,
        options: &[String],
        now: DateTime<Utc>,
    ) -> Result<Poll, StoreError> {
        let mut tables = self.tables.write().await;
        let poll = Poll {
            id: tables.next_id(),
            question: question.to_string(),
            options: options
                .iter()
                .map(|text| PollOption {
                    text: text.clone(),
                    votes: 0,
                })
                .collect(),
            created_at: now,
        };
        tables.polls.insert(poll.id, poll.clone());
        tables.active_poll = Some(poll.id);
        Ok(poll)
    }

    async fn save_vote(
        &self,
        user: &User,
        log: Option<NewTaskLog>,
        poll_id: i64,
        option_index: usize,
    ) -> Result<(User, Poll), StoreError> {
        let mut tables = self.tables.write().await;
        let poll = tables
            .polls
            .get(&poll_id)
            .ok_or_else(|| StoreError::NotFound(format!("poll {}", poll_id)))?;
        if option_index >= poll.options.len() {
            return Err(StoreError::NotFound(format!(
                "option {} of poll {}",
                option_index, poll_id
            )));
        }
        tables.check_version(user)?;

        let saved = tables.store_user(user);
        if let Some(entry) = log {
            tables.push_log(entry);
        }
        let poll = tables
            .polls
            .get_mut(&poll_id)
            .ok_or_else(|| StoreError::NotFound(format!("poll {}", poll_id)))?;
        poll.options[option_index].votes += 1;
        Ok((saved, poll.clone()))
    }

    async fn rollover_jackpot(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<JackpotPool>, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.live_jackpot(now).is_some() {
            return Ok(None);
        }
        Ok(Some(tables.open_jackpot(now)))
    }

    async fn current_jackpot(&self, now: DateTime<Utc>) -> Result<JackpotPool, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(pool) = tables.live_jackpot(now) {
            return Ok(pool.clone());
        }
        Ok(tables.open_jackpot(now))
    }

    async fn save_ticket_purchase(
        &self,
        user: &User,
        pool_id: i64,
        price: i64,
    ) -> Result<(User, JackpotPool), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.jackpots.contains_key(&pool_id) {
            return Err(StoreError::NotFound(format!("jackpot {}", pool_id)));
        }
        tables.check_version(user)?;

        let saved = tables.store_user(user);
        let pool = tables
            .jackpots
            .get_mut(&pool_id)
            .ok_or_else(|| StoreError::NotFound(format!("jackpot {}", pool_id)))?;
        pool.participants.push(saved.id);
        pool.pot += price;
        Ok((saved, pool.clone()))
    }
}
