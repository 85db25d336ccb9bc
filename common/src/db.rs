use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use tracing::info;

use crate::{
    error::StoreError,
    models::{
        CompletedMission, JackpotPool, JackpotWinner, LeaderboardEntry, NewTaskLog, NewUser, Poll,
        PollOption, User, UserId,
    },
    store::LedgerStore,
};

const JACKPOT_KIND: &str = "jackpot";
const POLL_KIND: &str = "poll";
// Serializes jackpot rollovers across connections.
const JACKPOT_ROLLOVER_LOCK: i64 = 0x6a61_636b_706f;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    coins: i64,
    referral_code: String,
    referred_by: Option<String>,
    last_daily_login: Option<DateTime<Utc>>,
    daily_streak: i32,
    last_video_reward: Option<DateTime<Utc>>,
    last_poll_vote: Option<DateTime<Utc>>,
    last_spin: Option<DateTime<Utc>>,
    last_scratch: Option<DateTime<Utc>>,
    multitap_level: i32,
    energy_limit_level: i32,
    role: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, completed_missions: Vec<CompletedMission>) -> Result<User, StoreError> {
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            coins: self.coins,
            referral_code: self.referral_code,
            referred_by: self.referred_by,
            last_daily_login: self.last_daily_login,
            daily_streak: self.daily_streak,
            last_video_reward: self.last_video_reward,
            last_poll_vote: self.last_poll_vote,
            last_spin: self.last_spin,
            last_scratch: self.last_scratch,
            completed_missions,
            multitap_level: self.multitap_level,
            energy_limit_level: self.energy_limit_level,
            role: self.role.parse()?,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MissionRow {
    user_id: i64,
    mission_id: String,
    completed_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PoolRow {
    id: i64,
    pot: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct WinnerRow {
    username: String,
    amount: i64,
    won_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PollRow {
    id: i64,
    question: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OptionRow {
    text: String,
    votes: i64,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

/// Conditional update of every mutable user column plus newly appended missions.
async fn write_user(conn: &mut PgConnection, user: &User) -> Result<UserRow, StoreError> {
    let updated: Option<UserRow> = sqlx::query_as(
        "UPDATE users SET coins = $1, last_daily_login = $2, daily_streak = $3, \
         last_video_reward = $4, last_poll_vote = $5, last_spin = $6, last_scratch = $7, \
         multitap_level = $8, energy_limit_level = $9, role = $10, version = version + 1, \
         updated_at = NOW() WHERE id = $11 AND version = $12 RETURNING *",
    )
    .bind(user.coins)
    .bind(user.last_daily_login)
    .bind(user.daily_streak)
    .bind(user.last_video_reward)
    .bind(user.last_poll_vote)
    .bind(user.last_spin)
    .bind(user.last_scratch)
    .bind(user.multitap_level)
    .bind(user.energy_limit_level)
    .bind(user.role.to_string())
    .bind(user.id)
    .bind(user.version)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = updated else {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match exists {
            Some(_) => StoreError::Conflict(format!(
                "user {} changed since version {}",
                user.id, user.version
            )),
            None => StoreError::NotFound(format!("user {}", user.id)),
        });
    };

    // Missions are append-only: anything past the persisted count is new.
    let persisted: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM completed_missions WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(&mut *conn)
            .await?;
    for mission in user.completed_missions.iter().skip(persisted as usize) {
        sqlx::query(
            "INSERT INTO completed_missions (user_id, mission_id, completed_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(user.id)
        .bind(&mission.mission_id)
        .bind(mission.completed_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(row)
}

async fn insert_task_log(conn: &mut PgConnection, entry: &NewTaskLog) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO task_logs (user_id, task_type, coins_earned) VALUES ($1, $2, $3)")
        .bind(entry.user_id)
        .bind(entry.task_type.to_string())
        .bind(entry.coins_earned)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn establish_connection(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Connected to postgres (max {} connections)", max_connections);
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Ledger schema is up to date");
        Ok(())
    }

    async fn missions_for(&self, user_id: UserId) -> Result<Vec<CompletedMission>, StoreError> {
        let rows: Vec<MissionRow> = sqlx::query_as(
            "SELECT user_id, mission_id, completed_at FROM completed_missions \
             WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CompletedMission {
                mission_id: row.mission_id,
                completed_at: row.completed_at,
            })
            .collect())
    }

    async fn hydrate(&self, row: Option<UserRow>) -> Result<Option<User>, StoreError> {
        match row {
            Some(row) => {
                let missions = self.missions_for(row.id).await?;
                Ok(Some(row.into_user(missions)?))
            }
            None => Ok(None),
        }
    }

    async fn load_pool(&self, pool_id: i64) -> Result<Option<JackpotPool>, StoreError> {
        let row: Option<PoolRow> =
            sqlx::query_as("SELECT id, pot, start_time, end_time FROM jackpot_pools WHERE id = $1")
                .bind(pool_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let participants: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM jackpot_tickets WHERE pool_id = $1 ORDER BY id",
        )
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;

        let winners: Vec<WinnerRow> = sqlx::query_as(
            "SELECT username, amount, won_at FROM jackpot_winners WHERE pool_id = $1 ORDER BY id",
        )
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(JackpotPool {
            id: row.id,
            pot: row.pot,
            participants,
            start_time: row.start_time,
            end_time: row.end_time,
            winners: winners
                .into_iter()
                .map(|w| JackpotWinner {
                    username: w.username,
                    amount: w.amount,
                    date: w.won_at,
                })
                .collect(),
        }))
    }

    async fn load_poll(&self, poll_id: i64) -> Result<Option<Poll>, StoreError> {
        let row: Option<PollRow> =
            sqlx::query_as("SELECT id, question, created_at FROM polls WHERE id = $1")
                .bind(poll_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let options: Vec<OptionRow> = sqlx::query_as(
            "SELECT text, votes FROM poll_options WHERE poll_id = $1 ORDER BY position",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Poll {
            id: row.id,
            question: row.question,
            options: options
                .into_iter()
                .map(|o| PollOption {
                    text: o.text,
                    votes: o.votes,
                })
                .collect(),
            created_at: row.created_at,
        }))
    }

    async fn active_record(&self, kind: &str) -> Result<Option<i64>, StoreError> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT record_id FROM active_records WHERE kind = $1")
                .bind(kind)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (username, email, password_hash, referral_code, referred_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.referral_code)
        .bind(&new_user.referred_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("email {} or referral code", new_user.email))
            } else {
                StoreError::Database(e)
            }
        })?;

        row.into_user(Vec::new())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn save_user(&self, user: &User) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = write_user(&mut *tx, user).await?;
        tx.commit().await?;

        let missions = self.missions_for(row.id).await?;
        row.into_user(missions)
    }

    async fn save_claim(&self, user: &User, log: Option<NewTaskLog>) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = write_user(&mut *tx, user).await?;
        if let Some(entry) = &log {
            insert_task_log(&mut *tx, entry).await?;
        }
        tx.commit().await?;

        let missions = self.missions_for(row.id).await?;
        row.into_user(missions)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mission_rows: Vec<MissionRow> = sqlx::query_as(
            "SELECT user_id, mission_id, completed_at FROM completed_missions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut missions: HashMap<i64, Vec<CompletedMission>> = HashMap::new();
        for row in mission_rows {
            missions.entry(row.user_id).or_default().push(CompletedMission {
                mission_id: row.mission_id,
                completed_at: row.completed_at,
            });
        }

        rows.into_iter()
            .map(|row| {
                let user_missions = missions.remove(&row.id).unwrap_or_default();
                row.into_user(user_missions)
            })
            .collect()
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let leaders: Vec<LeaderboardEntry> = sqlx::query_as(
            "SELECT username, coins FROM users WHERE role = 'user' \
             ORDER BY coins DESC, id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(leaders)
    }

    async fn active_poll(&self) -> Result<Option<Poll>, StoreError> {
        match self.active_record(POLL_KIND).await? {
            Some(poll_id) => self.load_poll(poll_id).await,
            None => Ok(None),
        }
    }

    async fn create_poll(
        &self,
        question: &str,
        options: &[String],
        now: DateTime<Utc>,
    ) -> Result<Poll, StoreError> {
        let mut tx = self.pool.begin().await?;

        let poll_id: i64 = sqlx::query_scalar(
            "INSERT INTO polls (question, created_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(question)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for (position, text) in options.iter().enumerate() {
            sqlx::query("INSERT INTO poll_options (poll_id, position, text) VALUES ($1, $2, $3)")
                .bind(poll_id)
                .bind(position as i32)
                .bind(text)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO active_records (kind, record_id) VALUES ($1, $2) \
             ON CONFLICT (kind) DO UPDATE SET record_id = EXCLUDED.record_id",
        )
        .bind(POLL_KIND)
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Poll {
            id: poll_id,
            question: question.to_string(),
            options: options
                .iter()
                .map(|text| PollOption {
                    text: text.clone(),
                    votes: 0,
                })
                .collect(),
            created_at: now,
        })
    }

    async fn save_vote(
        &self,
        user: &User,
        log: Option<NewTaskLog>,
        poll_id: i64,
        option_index: usize,
    ) -> Result<(User, Poll), StoreError> {
        let position = i32::try_from(option_index)
            .map_err(|_| StoreError::NotFound(format!("option {}", option_index)))?;

        let mut tx = self.pool.begin().await?;
        let row = write_user(&mut *tx, user).await?;
        if let Some(entry) = &log {
            insert_task_log(&mut *tx, entry).await?;
        }

        let result = sqlx::query(
            "UPDATE poll_options SET votes = votes + 1 WHERE poll_id = $1 AND position = $2",
        )
        .bind(poll_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the user write too.
            return Err(StoreError::NotFound(format!(
                "option {} of poll {}",
                option_index, poll_id
            )));
        }

        tx.commit().await?;

        let missions = self.missions_for(row.id).await?;
        let poll = self
            .load_poll(poll_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("poll {}", poll_id)))?;
        Ok((row.into_user(missions)?, poll))
    }

    async fn rollover_jackpot(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<JackpotPool>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(JACKPOT_ROLLOVER_LOCK)
            .execute(&mut *tx)
            .await?;

        let live: Option<i64> = sqlx::query_scalar(
            "SELECT p.id FROM active_records a JOIN jackpot_pools p ON p.id = a.record_id \
             WHERE a.kind = $1 AND p.end_time >= $2",
        )
        .bind(JACKPOT_KIND)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if live.is_some() {
            tx.commit().await?;
            return Ok(None);
        }

        let fresh = JackpotPool::opened_at(0, now);
        let pool_id: i64 = sqlx::query_scalar(
            "INSERT INTO jackpot_pools (pot, start_time, end_time) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(fresh.pot)
        .bind(fresh.start_time)
        .bind(fresh.end_time)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO active_records (kind, record_id) VALUES ($1, $2) \
             ON CONFLICT (kind) DO UPDATE SET record_id = EXCLUDED.record_id",
        )
        .bind(JACKPOT_KIND)
        .bind(pool_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Opened jackpot pool {} until {}", pool_id, fresh.end_time);

        Ok(Some(JackpotPool {
            id: pool_id,
            ..fresh
        }))
    }

    async fn current_jackpot(&self, now: DateTime<Utc>) -> Result<JackpotPool, StoreError> {
        if let Some(pool) = self.rollover_jackpot(now).await? {
            return Ok(pool);
        }

        let pool_id = self
            .active_record(JACKPOT_KIND)
            .await?
            .ok_or_else(|| StoreError::NotFound("active jackpot".to_string()))?;
        self.load_pool(pool_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("jackpot {}", pool_id)))
    }

    async fn save_ticket_purchase(
        &self,
        user: &User,
        pool_id: i64,
        price: i64,
    ) -> Result<(User, JackpotPool), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = write_user(&mut *tx, user).await?;

        let result = sqlx::query("UPDATE jackpot_pools SET pot = pot + $1 WHERE id = $2")
            .bind(price)
            .bind(pool_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("jackpot {}", pool_id)));
        }

        sqlx::query("INSERT INTO jackpot_tickets (pool_id, user_id) VALUES ($1, $2)")
            .bind(pool_id)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let missions = self.missions_for(row.id).await?;
        let pool = self
            .load_pool(pool_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("jackpot {}", pool_id)))?;
        Ok((row.into_user(missions)?, pool))
    }
}
