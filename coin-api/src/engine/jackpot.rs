use chrono::{DateTime, Utc};
use common::models::{JackpotPool, JackpotWinner, User, UserId};
use serde::Serialize;
use thiserror::Error;

pub const TICKET_PRICE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JackpotError {
    #[error("Not enough coins")]
    NotEnoughCoins,
}

pub fn debit_ticket(user: &mut User) -> Result<(), JackpotError> {
    if user.coins < TICKET_PRICE {
        return Err(JackpotError::NotEnoughCoins);
    }
    user.coins -= TICKET_PRICE;
    Ok(())
}

/// What a player sees of the current pool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JackpotView {
    pub pot: i64,
    pub end_time: DateTime<Utc>,
    pub tickets: usize,
    pub total_tickets: usize,
    pub winners: Vec<JackpotWinner>,
}

impl JackpotView {
    pub fn for_user(pool: &JackpotPool, user_id: UserId) -> Self {
        Self {
            pot: pool.pot,
            end_time: pool.end_time,
            tickets: pool.tickets_for(user_id),
            total_tickets: pool.participants.len(),
            winners: pool.winners.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sample_user;
    use chrono::TimeZone;

    #[test]
    fn ticket_costs_exactly_one_hundred() {
        let mut user = sample_user(250);
        debit_ticket(&mut user).unwrap();
        assert_eq!(user.coins, 150);
    }

    #[test]
    fn short_balance_is_refused() {
        let mut user = sample_user(50);
        assert_eq!(debit_ticket(&mut user), Err(JackpotError::NotEnoughCoins));
        assert_eq!(user.coins, 50);
    }

    #[test]
    fn view_counts_only_callers_tickets() {
        let start = Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap();
        let mut pool = JackpotPool::opened_at(3, start);
        pool.participants = vec![1, 2, 1];
        pool.pot += 300;

        let view = JackpotView::for_user(&pool, 1);
        assert_eq!(view.tickets, 2);
        assert_eq!(view.total_tickets, 3);
        assert_eq!(view.pot, 15_300);
    }
}
