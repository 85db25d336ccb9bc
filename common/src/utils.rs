use serde::{Deserialize, Serialize};

/// Pot a freshly opened jackpot window starts with.
pub const JACKPOT_SEED_POT: i64 = 15_000;
pub const JACKPOT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Kind of coin-earning event recorded in the task log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    DailyLogin,
    Video,
    Spin,
    Scratch,
    Tap,
    Mission,
    PollVote,
    ReferralBonus,
}

impl_from_str_for_enum!(Role, User => "user", Admin => "admin");
impl_display_for_enum!(Role, User => "user", Admin => "admin");

impl_from_str_for_enum!(
    TaskType,
    DailyLogin => "daily-login",
    Video => "video",
    Spin => "spin",
    Scratch => "scratch",
    Tap => "tap",
    Mission => "mission",
    PollVote => "poll-vote",
    ReferralBonus => "referral-bonus",
);
impl_display_for_enum!(
    TaskType,
    DailyLogin => "daily-login",
    Video => "video",
    Spin => "spin",
    Scratch => "scratch",
    Tap => "tap",
    Mission => "mission",
    PollVote => "poll-vote",
    ReferralBonus => "referral-bonus",
);
