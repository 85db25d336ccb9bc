//! Reward engine: pure eligibility and balance rules.
//!
//! Nothing in here touches the store. Handlers load a [`User`], call into
//! these functions with the current time, and persist the mutated record
//! with a single conditional save.
//!
//! [`User`]: common::models::User

pub mod calendar;
pub mod claims;
pub mod jackpot;
pub mod upgrades;

use calendar::DayBoundary;

#[derive(Debug, Clone, Copy, Default)]
pub struct RewardRules {
    pub day: DayBoundary,
    /// Ceiling for client-asserted tap and mission amounts. `None` trusts the client.
    pub client_amount_cap: Option<i64>,
}

impl RewardRules {
    /// Never negative, whatever the cap holds.
    pub fn cap_client_amount(&self, amount: i64) -> i64 {
        let amount = amount.max(0);
        match self.client_amount_cap {
            Some(cap) => amount.min(cap.max(0)),
            None => amount,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_user(coins: i64) -> common::models::User {
    use chrono::TimeZone;

    let created = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    common::models::User {
        id: 1,
        username: "player".to_string(),
        email: "player@example.com".to_string(),
        password_hash: String::new(),
        coins,
        referral_code: "ABC123".to_string(),
        referred_by: None,
        last_daily_login: None,
        daily_streak: 0,
        last_video_reward: None,
        last_poll_vote: None,
        last_spin: None,
        last_scratch: None,
        completed_missions: Vec::new(),
        multitap_level: 1,
        energy_limit_level: 1,
        role: common::utils::Role::User,
        version: 0,
        created_at: created,
        updated_at: created,
    }
}
