use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{models::User, models::UserId, LedgerStore};

use crate::{
    config::Config,
    engine::{calendar::DayBoundary, RewardRules},
    error::ApiError,
};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, config: Config) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn rules(&self) -> RewardRules {
        RewardRules {
            day: DayBoundary::from_offset_minutes(self.config.day_offset_minutes)
                .unwrap_or_default(),
            client_amount_cap: self.config.client_amount_cap,
        }
    }

    pub async fn load_user(&self, user_id: UserId) -> Result<User, ApiError> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }
}
