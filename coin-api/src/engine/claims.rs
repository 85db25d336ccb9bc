use chrono::{DateTime, Utc};
use common::{
    impl_display_for_enum, impl_from_str_for_enum,
    models::{CompletedMission, User},
    utils::TaskType,
};
use thiserror::Error;

use super::RewardRules;

pub const DAILY_LOGIN_REWARD: i64 = 10;
pub const VIDEO_REWARD: i64 = 40;
pub const VIDEO_MIN_WATCH_SECS: f64 = 120.0;
pub const SPIN_MAX_REWARD: i64 = 50;
pub const SCRATCH_MAX_REWARD: i64 = 100;
pub const POLL_VOTE_REWARD: i64 = 10;
pub const REFERRAL_BONUS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimType {
    DailyLogin,
    Video,
    Spin,
    Scratch,
    Tap,
    Mission,
}

impl_from_str_for_enum!(
    ClaimType,
    DailyLogin => "daily-login",
    Video => "video",
    Spin => "spin",
    Scratch => "scratch",
    Tap => "tap",
    Mission => "mission",
);
impl_display_for_enum!(
    ClaimType,
    DailyLogin => "daily-login",
    Video => "video",
    Spin => "spin",
    Scratch => "scratch",
    Tap => "tap",
    Mission => "mission",
);

impl ClaimType {
    pub fn task_type(self) -> TaskType {
        match self {
            ClaimType::DailyLogin => TaskType::DailyLogin,
            ClaimType::Video => TaskType::Video,
            ClaimType::Spin => TaskType::Spin,
            ClaimType::Scratch => TaskType::Scratch,
            ClaimType::Tap => TaskType::Tap,
            ClaimType::Mission => TaskType::Mission,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClaimPayload {
    pub watch_time: Option<f64>,
    pub amount: Option<i64>,
    pub mission_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("{0}")]
    AlreadyClaimed(&'static str),

    #[error("Watch at least 2 minutes")]
    WatchTooShort,

    #[error("Mission id is required")]
    MissingMissionId,

    #[error("Invalid amount")]
    InvalidAmount,
}

impl ClaimError {
    /// Malformed input rather than an eligibility refusal.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClaimError::MissingMissionId | ClaimError::InvalidAmount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub task_type: TaskType,
    pub coins_earned: i64,
    pub message: String,
}

impl ClaimReceipt {
    fn credited(task_type: TaskType, coins_earned: i64) -> Self {
        Self {
            task_type,
            coins_earned,
            message: "Reward credited successfully".to_string(),
        }
    }
}

fn client_amount(payload: &ClaimPayload) -> Result<i64, ClaimError> {
    match payload.amount {
        Some(amount) if amount < 0 => Err(ClaimError::InvalidAmount),
        Some(amount) => Ok(amount),
        None => Ok(0),
    }
}

fn credited_balance(user: &User, amount: i64) -> Result<i64, ClaimError> {
    user.coins
        .checked_add(amount)
        .ok_or(ClaimError::InvalidAmount)
}

/// Validates and applies one claim. On `Err` the user is left untouched.
pub fn apply_claim(
    user: &mut User,
    claim_type: ClaimType,
    payload: &ClaimPayload,
    rules: &RewardRules,
    now: DateTime<Utc>,
) -> Result<ClaimReceipt, ClaimError> {
    match claim_type {
        ClaimType::DailyLogin => apply_daily_login(user, rules, now),
        ClaimType::Video => {
            if payload.watch_time.unwrap_or(0.0) < VIDEO_MIN_WATCH_SECS {
                return Err(ClaimError::WatchTooShort);
            }
            if rules.day.claimed_today(user.last_video_reward, now) {
                return Err(ClaimError::AlreadyClaimed(
                    "Video reward already claimed today",
                ));
            }
            user.coins = credited_balance(user, VIDEO_REWARD)?;
            user.last_video_reward = Some(now);
            Ok(ClaimReceipt::credited(TaskType::Video, VIDEO_REWARD))
        }
        ClaimType::Spin => {
            let amount = client_amount(payload)?.min(SPIN_MAX_REWARD);
            if rules.day.claimed_today(user.last_spin, now) {
                return Err(ClaimError::AlreadyClaimed("Spin already used today"));
            }
            user.coins = credited_balance(user, amount)?;
            user.last_spin = Some(now);
            Ok(ClaimReceipt::credited(TaskType::Spin, amount))
        }
        ClaimType::Scratch => {
            let amount = client_amount(payload)?.min(SCRATCH_MAX_REWARD);
            if rules.day.claimed_today(user.last_scratch, now) {
                return Err(ClaimError::AlreadyClaimed("Scratch card already used today"));
            }
            user.coins = credited_balance(user, amount)?;
            user.last_scratch = Some(now);
            Ok(ClaimReceipt::credited(TaskType::Scratch, amount))
        }
        ClaimType::Tap => {
            // Tap batches are client-counted; only the optional cap applies.
            let amount = rules.cap_client_amount(client_amount(payload)?);
            user.coins = credited_balance(user, amount)?;
            Ok(ClaimReceipt::credited(TaskType::Tap, amount))
        }
        ClaimType::Mission => {
            let mission_id = payload
                .mission_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(ClaimError::MissingMissionId)?;
            let amount = rules.cap_client_amount(client_amount(payload)?);

            let done_today = user
                .completed_missions
                .iter()
                .any(|m| m.mission_id == mission_id && rules.day.same_day(m.completed_at, now));
            if done_today {
                return Err(ClaimError::AlreadyClaimed("Mission already completed today"));
            }

            user.coins = credited_balance(user, amount)?;
            user.completed_missions.push(CompletedMission {
                mission_id: mission_id.to_string(),
                completed_at: now,
            });
            Ok(ClaimReceipt::credited(TaskType::Mission, amount))
        }
    }
}

pub fn apply_daily_login(
    user: &mut User,
    rules: &RewardRules,
    now: DateTime<Utc>,
) -> Result<ClaimReceipt, ClaimError> {
    if rules.day.claimed_today(user.last_daily_login, now) {
        return Err(ClaimError::AlreadyClaimed("Already claimed today"));
    }

    let streak = match user.last_daily_login {
        Some(last) if rules.day.days_between(last, now) == 1 => user.daily_streak.saturating_add(1),
        _ => 1,
    };

    user.coins = credited_balance(user, DAILY_LOGIN_REWARD)?;
    user.last_daily_login = Some(now);
    user.daily_streak = streak;

    Ok(ClaimReceipt {
        task_type: TaskType::DailyLogin,
        coins_earned: DAILY_LOGIN_REWARD,
        message: format!("Daily login successful! Streak: {}", streak),
    })
}

/// Gates and credits the poll reward; the vote itself is recorded by the caller.
pub fn apply_poll_vote(
    user: &mut User,
    rules: &RewardRules,
    now: DateTime<Utc>,
) -> Result<ClaimReceipt, ClaimError> {
    if rules.day.claimed_today(user.last_poll_vote, now) {
        return Err(ClaimError::AlreadyClaimed("Already voted today"));
    }

    user.coins = credited_balance(user, POLL_VOTE_REWARD)?;
    user.last_poll_vote = Some(now);

    Ok(ClaimReceipt {
        task_type: TaskType::PollVote,
        coins_earned: POLL_VOTE_REWARD,
        message: format!("Vote submitted +{} coins", POLL_VOTE_REWARD),
    })
}

pub fn apply_referral_bonus(referrer: &mut User) -> Result<ClaimReceipt, ClaimError> {
    referrer.coins = credited_balance(referrer, REFERRAL_BONUS)?;
    Ok(ClaimReceipt::credited(TaskType::ReferralBonus, REFERRAL_BONUS))
}
