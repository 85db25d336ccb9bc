use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{Role, TaskType, JACKPOT_SEED_POT, JACKPOT_WINDOW_HOURS};

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub coins: i64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub last_daily_login: Option<DateTime<Utc>>,
    pub daily_streak: i32,
    pub last_video_reward: Option<DateTime<Utc>>,
    pub last_poll_vote: Option<DateTime<Utc>>,
    pub last_spin: Option<DateTime<Utc>>,
    pub last_scratch: Option<DateTime<Utc>>,
    pub completed_missions: Vec<CompletedMission>,
    pub multitap_level: i32,
    pub energy_limit_level: i32,
    pub role: Role,
    // Bumped by every successful save; a save carrying an older value is rejected.
    #[serde(skip_serializing)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMission {
    pub mission_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Fields supplied at registration; everything else starts at its default.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub referral_code: String,
    pub referred_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLogEntry {
    pub id: i64,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub coins_earned: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTaskLog {
    pub user_id: UserId,
    pub task_type: TaskType,
    pub coins_earned: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JackpotWinner {
    pub username: String,
    pub amount: i64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JackpotPool {
    pub id: i64,
    pub pot: i64,
    /// One entry per ticket, in purchase order.
    pub participants: Vec<UserId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub winners: Vec<JackpotWinner>,
}

impl JackpotPool {
    /// Window bounds for a pool opened at `start_time`.
    pub fn window(start_time: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (start_time, start_time + Duration::hours(JACKPOT_WINDOW_HOURS))
    }

    pub fn opened_at(id: i64, start_time: DateTime<Utc>) -> Self {
        let (start_time, end_time) = Self::window(start_time);
        JackpotPool {
            id,
            pot: JACKPOT_SEED_POT,
            participants: Vec::new(),
            start_time,
            end_time,
            winners: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }

    pub fn tickets_for(&self, user_id: UserId) -> usize {
        self.participants.iter().filter(|id| **id == user_id).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: i64,
    pub question: String,
    pub options: Vec<PollOption>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub username: String,
    pub coins: i64,
}
