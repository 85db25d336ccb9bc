use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

// Ledger Metrics
lazy_static! {
    pub static ref CLAIMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reward_claims_total",
        "Reward claims by type and outcome",
        &["claim_type", "outcome"]
    )
    .unwrap();
    pub static ref COINS_CREDITED: IntCounterVec = register_int_counter_vec!(
        "coins_credited_total",
        "Coins credited to players by source",
        &["source"]
    )
    .unwrap();
    pub static ref COINS_SPENT: IntCounterVec = register_int_counter_vec!(
        "coins_spent_total",
        "Coins debited from players by sink",
        &["sink"]
    )
    .unwrap();
}

// Account Metrics
lazy_static! {
    pub static ref HTTP_REQUESTS: IntCounter =
        register_int_counter!("http_requests_total", "Total HTTP requests received").unwrap();
    pub static ref REGISTRATIONS: IntCounter =
        register_int_counter!("registrations_total", "Total number of registered users").unwrap();
    pub static ref JACKPOT_TICKETS: IntCounter =
        register_int_counter!("jackpot_tickets_total", "Total jackpot tickets sold").unwrap();
    pub static ref JACKPOT_ROLLOVERS: IntCounter =
        register_int_counter!("jackpot_rollovers_total", "Jackpot windows opened").unwrap();
}

pub fn record_claim(claim_type: &str, outcome: &str) {
    CLAIMS_TOTAL.with_label_values(&[claim_type, outcome]).inc();
}

pub fn record_credit(source: &str, coins: i64) {
    if coins > 0 {
        COINS_CREDITED
            .with_label_values(&[source])
            .inc_by(coins as u64);
    }
}

pub fn record_spend(sink: &str, coins: i64) {
    if coins > 0 {
        COINS_SPENT.with_label_values(&[sink]).inc_by(coins as u64);
    }
}

pub fn record_request() {
    HTTP_REQUESTS.inc();
}

pub fn record_registration() {
    REGISTRATIONS.inc();
}

pub fn record_ticket() {
    JACKPOT_TICKETS.inc();
}

pub fn record_rollover() {
    JACKPOT_ROLLOVERS.inc();
}

/// Prometheus text exposition of every registered metric.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
