use actix_web::{dev::Service, http::StatusCode, test, test::TestRequest};
use chrono::Duration;
use common::{utils::Role, utils::TaskType, LedgerStore};
use serde_json::{json, Value};

use super::build_app;
use crate::test_support::{authed, Harness};

#[actix_web::test]
async fn register_login_and_me() {
    let h = Harness::new();
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({"username": "sam", "email": "Sam@Example.com", "password": "hunter2"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Registered successfully");

    let req = TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": "sam@example.com", "password": "hunter2"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["username"], "sam");
    assert_eq!(body["user"]["coins"], 0);
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["referralCode"].as_str().unwrap().len(), 6);

    let req = authed(TestRequest::get().uri("/api/auth/me"), &token).to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["email"], "sam@example.com");
    assert_eq!(me["multitapLevel"], 1);
    assert!(me.get("passwordHash").is_none());
}

#[actix_web::test]
async fn duplicate_email_and_bad_password_are_rejected() {
    let h = Harness::new();
    let app = test::init_service(build_app(h.state.clone())).await;
    let signup = json!({"username": "kim", "email": "kim@example.com", "password": "pw"});

    let req = TestRequest::post().uri("/api/auth/register").set_json(&signup).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = TestRequest::post().uri("/api/auth/register").set_json(&signup).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User already exists");

    let req = TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": "kim@example.com", "password": "nope"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Invalid credentials");
}

#[actix_web::test]
async fn referral_credits_referrer_once() {
    let h = Harness::new();
    let referrer = h.seed_user("alice", 0, Role::User).await;
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": "bob",
            "email": "bob@example.com",
            "password": "pw",
            "referralCode": "ALICE"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    assert_eq!(h.user(&referrer).await.coins, 500);
    let bonuses: Vec<_> = h
        .store
        .task_logs()
        .await
        .into_iter()
        .filter(|log| log.task_type == TaskType::ReferralBonus)
        .collect();
    assert_eq!(bonuses.len(), 1);
    assert_eq!(bonuses[0].user_id, referrer.id);
    assert_eq!(bonuses[0].coins_earned, 500);

    let bob = h.store.find_user_by_email("bob@example.com").await.unwrap().unwrap();
    assert_eq!(bob.referred_by.as_deref(), Some("ALICE"));
    assert_eq!(bob.coins, 0);
}

#[actix_web::test]
async fn protected_routes_need_a_valid_token() {
    let h = Harness::new();
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = TestRequest::post().uri("/api/rewards/daily-login").to_request();
    let err = app.call(req).await.err().expect("missing token must be refused");
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);

    let req = authed(TestRequest::post().uri("/api/rewards/daily-login"), "garbage").to_request();
    let err = app.call(req).await.err().expect("bad token must be refused");
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);

    let req = TestRequest::get().uri("/health").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn daily_login_once_per_calendar_day() {
    let h = Harness::new();
    let user = h.seed_user("dee", 0, Role::User).await;
    let token = h.token_for(&user);
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::post().uri("/api/rewards/daily-login"), &token).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["coins"], 10);
    assert_eq!(body["dailyStreak"], 1);
    assert_eq!(body["message"], "Daily login successful! Streak: 1");

    h.clock.advance(Duration::hours(10));
    let req = authed(TestRequest::post().uri("/api/rewards/daily-login"), &token).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Already claimed today");
    assert_eq!(body["coins"], 10);

    h.clock.advance(Duration::hours(10));
    let req = authed(TestRequest::post().uri("/api/rewards/daily-login"), &token).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["coins"], 20);
    assert_eq!(body["dailyStreak"], 2);

    let logs = h.store.task_logs().await;
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.task_type == TaskType::DailyLogin && l.coins_earned == 10));
}

#[actix_web::test]
async fn video_needs_full_watch_time() {
    let h = Harness::new();
    let user = h.seed_user("vic", 0, Role::User).await;
    let token = h.token_for(&user);
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(json!({"type": "video", "watchTime": 119}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Watch at least 2 minutes");

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(json!({"type": "video", "watchTime": 120}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["coins"], 40);
    assert_eq!(body["coinsEarned"], 40);
    assert!(body["lastVideoReward"].is_string());

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(json!({"type": "video", "watchTime": 300}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Video reward already claimed today");
    assert_eq!(h.user(&user).await.coins, 40);
}

#[actix_web::test]
async fn spin_is_clamped_and_daily() {
    let h = Harness::new();
    let user = h.seed_user("sol", 0, Role::User).await;
    let token = h.token_for(&user);
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(json!({"type": "spin", "amount": 999}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["coins"], 50);
    assert!(body["lastSpin"].is_string());

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(json!({"type": "spin", "amount": 5}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Spin already used today");
    assert_eq!(body["coins"], 50);
}

#[actix_web::test]
async fn mission_repeats_on_the_next_day() {
    let h = Harness::new();
    let user = h.seed_user("mo", 0, Role::User).await;
    let token = h.token_for(&user);
    let app = test::init_service(build_app(h.state.clone())).await;
    let claim = json!({"type": "mission", "amount": 75, "missionId": "mission_tap"});

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(&claim)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["coins"], 75);
    assert_eq!(body["completedMissions"][0]["missionId"], "mission_tap");

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(&claim)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Mission already completed today");

    h.clock.advance(Duration::days(1));
    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(&claim)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["coins"], 150);
    assert_eq!(body["completedMissions"].as_array().unwrap().len(), 2);

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(json!({"type": "mission", "amount": 10}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Mission id is required");
}

#[actix_web::test]
async fn unknown_claim_type_changes_nothing() {
    let h = Harness::new();
    let user = h.seed_user("una", 30, Role::User).await;
    let token = h.token_for(&user);
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::post().uri("/api/rewards/earn"), &token)
        .set_json(json!({"type": "lottery", "amount": 1000}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["coins"], 30);
    assert_eq!(body["coinsEarned"], 0);
    assert!(h.store.task_logs().await.is_empty());
    assert_eq!(h.user(&user).await.version, user.version);
}

#[actix_web::test]
async fn upgrade_debits_next_tier() {
    let h = Harness::new();
    let user = h.seed_user("ula", 100_000, Role::User).await;
    let token = h.token_for(&user);
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::post().uri("/api/game/upgrade"), &token)
        .set_json(json!({"type": "multitap"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Upgrade successful");
    assert_eq!(body["coins"], 99_500);
    assert_eq!(body["multitapLevel"], 2);
    assert!(body.get("energyLimitLevel").is_none());

    for _ in 0..3 {
        let req = authed(TestRequest::post().uri("/api/game/upgrade"), &token)
            .set_json(json!({"type": "multitap"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    let req = authed(TestRequest::post().uri("/api/game/upgrade"), &token)
        .set_json(json!({"type": "multitap"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Max level reached");
    assert_eq!(h.user(&user).await.multitap_level, 5);

    let req = authed(TestRequest::post().uri("/api/game/upgrade"), &token)
        .set_json(json!({"type": "turbo"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Invalid upgrade type");
}

#[actix_web::test]
async fn jackpot_ticket_moves_exactly_one_hundred() {
    let h = Harness::new();
    let rich = h.seed_user("rita", 250, Role::User).await;
    let poor = h.seed_user("pete", 50, Role::User).await;
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::get().uri("/api/game/jackpot"), &h.token_for(&rich)).to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["pot"], 15_000);
    assert_eq!(view["tickets"], 0);

    let buy = TestRequest::post().uri("/api/game/jackpot/buy");
    let req = authed(buy, &h.token_for(&rich)).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Ticket purchased");
    assert_eq!(body["coins"], 150);
    assert_eq!(body["pot"], 15_100);
    assert_eq!(body["tickets"], 1);

    let buy = TestRequest::post().uri("/api/game/jackpot/buy");
    let req = authed(buy, &h.token_for(&poor)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Not enough coins");
    assert_eq!(h.user(&poor).await.coins, 50);

    let req = authed(TestRequest::get().uri("/api/game/jackpot"), &h.token_for(&poor)).to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["pot"], 15_100);
    assert_eq!(view["totalTickets"], 1);
    assert_eq!(view["tickets"], 0);
}

#[actix_web::test]
async fn leaderboard_is_public_and_skips_admins() {
    let h = Harness::new();
    for i in 0..12 {
        h.seed_user(&format!("p{:02}", i), i * 10, Role::User).await;
    }
    h.seed_user("boss", 1_000_000, Role::Admin).await;
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = TestRequest::get().uri("/api/rewards/leaderboard").to_request();
    let board: Value = test::call_and_read_body_json(&app, req).await;
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 10);
    assert_eq!(board[0]["username"], "p11");
    assert_eq!(board[0]["coins"], 110);
    assert!(board.iter().all(|e| e["username"] != "boss"));
    assert!(board
        .windows(2)
        .all(|w| w[0]["coins"].as_i64() >= w[1]["coins"].as_i64()));
}

#[actix_web::test]
async fn admin_routes_check_role() {
    let h = Harness::new();
    let admin = h.seed_user("root", 0, Role::Admin).await;
    let player = h.seed_user("joe", 0, Role::User).await;
    let app = test::init_service(build_app(h.state.clone())).await;

    let users = TestRequest::get().uri("/api/admin/users");
    let req = authed(users, &h.token_for(&player)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = authed(TestRequest::get().uri("/api/admin/users"), &h.token_for(&admin)).to_request();
    let users: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(users.as_array().unwrap().len(), 2);
    assert!(users[0].get("passwordHash").is_none());

    let req = authed(
        TestRequest::patch().uri(&format!("/api/admin/users/{}/role", player.id)),
        &h.token_for(&admin),
    )
    .set_json(json!({"role": "admin"}))
    .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["role"], "admin");

    let req = authed(
        TestRequest::delete().uri(&format!("/api/admin/users/{}", player.id)),
        &h.token_for(&admin),
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = authed(
        TestRequest::delete().uri(&format!("/api/admin/users/{}", player.id)),
        &h.token_for(&admin),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User not found");
}

#[actix_web::test]
async fn demoted_admin_loses_access_before_token_expiry() {
    let h = Harness::new();
    let admin = h.seed_user("root", 0, Role::Admin).await;
    let token = h.token_for(&admin);
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::get().uri("/api/admin/users"), &token).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let mut demoted = h.user(&admin).await;
    demoted.role = Role::User;
    h.store.save_user(&demoted).await.unwrap();

    let req = authed(TestRequest::get().uri("/api/admin/users"), &token).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    h.store.delete_user(admin.id).await.unwrap();
    let req = authed(TestRequest::get().uri("/api/admin/users"), &token).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn poll_vote_flow() {
    let h = Harness::new();
    let admin = h.seed_user("root", 0, Role::Admin).await;
    let voter = h.seed_user("vera", 5, Role::User).await;
    let token = h.token_for(&voter);
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = authed(TestRequest::get().uri("/api/poll"), &token).to_request();
    let poll: Value = test::call_and_read_body_json(&app, req).await;
    assert!(poll.is_null());

    let req = authed(TestRequest::post().uri("/api/poll/vote"), &token)
        .set_json(json!({"optionIndex": 0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "No poll found");
    assert_eq!(h.user(&voter).await.coins, 5);

    let req = authed(TestRequest::post().uri("/api/admin/polls"), &h.token_for(&admin))
        .set_json(json!({"question": "Best reward?", "options": ["Spin", "Scratch", " "]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["options"].as_array().unwrap().len(), 2);

    let req = authed(TestRequest::post().uri("/api/poll/vote"), &token)
        .set_json(json!({"optionIndex": 7}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Invalid option");

    let req = authed(TestRequest::post().uri("/api/poll/vote"), &token)
        .set_json(json!({"optionIndex": 1}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Vote submitted +10 coins");
    assert_eq!(body["coins"], 15);

    let req = authed(TestRequest::post().uri("/api/poll/vote"), &token)
        .set_json(json!({"optionIndex": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Already voted today");

    let req = authed(TestRequest::get().uri("/api/poll"), &token).to_request();
    let poll: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(poll["question"], "Best reward?");
    assert_eq!(poll["options"][1]["votes"], 1);
    assert_eq!(poll["options"][0]["votes"], 0);

    // One credited vote, one log row; the refused attempts left no trace.
    let logs = h.store.task_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].task_type, TaskType::PollVote);
    assert_eq!(h.user(&voter).await.coins, 15);
}

#[actix_web::test]
async fn stale_write_is_a_conflict() {
    let h = Harness::new();
    let user = h.seed_user("race", 0, Role::User).await;

    let mut first = h.user(&user).await;
    let mut second = first.clone();
    first.coins += 10;
    second.coins += 10;

    h.store.save_user(&first).await.unwrap();
    let err: crate::error::ApiError = h.store.save_user(&second).await.unwrap_err().into();
    assert_eq!(err.to_string(), crate::error::CONFLICT_MESSAGE);
    assert_eq!(h.user(&user).await.coins, 10);
}

#[actix_web::test]
async fn metrics_are_exposed() {
    let h = Harness::new();
    let app = test::init_service(build_app(h.state.clone())).await;

    let req = TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("http_requests_total"));
}
