use std::sync::{Arc, Mutex};

use actix_web::{http::header, test::TestRequest, web};
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{
    memory::MemoryStore,
    models::{NewUser, User},
    utils::Role,
    LedgerStore,
};

use crate::{
    auth::create_token,
    config::Config,
    state::{AppState, Clock},
};

/// Clock the tests move by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap())
    }
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub state: web::Data<AppState>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::for_tests())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let state = AppState::new(store.clone(), config).with_clock(clock.clone());
        Self {
            store,
            clock,
            state: web::Data::new(state),
        }
    }

    /// Inserts a user straight into the store with the given balance and role.
    pub async fn seed_user(&self, username: &str, coins: i64, role: Role) -> User {
        let mut user = self
            .store
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash: String::new(),
                referral_code: username.to_uppercase(),
                referred_by: None,
            })
            .await
            .unwrap();
        user.coins = coins;
        user.role = role;
        self.store.save_user(&user).await.unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        create_token(user.id, user.role, &self.state.config.jwt_secret, 3600).unwrap()
    }

    pub async fn user(&self, user: &User) -> User {
        self.store.find_user(user.id).await.unwrap().unwrap()
    }
}

pub fn authed(req: TestRequest, token: &str) -> TestRequest {
    req.insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
}
