//! Integration tests for the entitlement engine against a real SQLite file
//!
//! Run with: cargo test --test entitlement_test

use golosok::core::entitlement::{check_clone_allowed, check_usage, record_clone, CloneDecision, Limits, UsageDecision};
use golosok::core::premium::{self, ActivatedBy, PlanType};
use golosok::core::config;
use golosok::storage::db;
use golosok::storage::{create_pool, get_connection, DbPool};
use tempfile::TempDir;

fn test_pool() -> (TempDir, DbPool) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.sqlite");
    let pool = create_pool(path.to_str().unwrap()).unwrap();
    (dir, pool)
}

fn limits() -> Limits {
    Limits {
        max_free_trials: 10,
        max_chars_per_request: 100,
        free_char_limit_total: 500,
    }
}

// ============================================================================
// User Record Accessor
// ============================================================================

mod accessor_tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_zeroed_record() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let user = db::get_or_create_user(&conn, 1001, Some("alice"), Some("Alice")).unwrap();

        assert_eq!(user.telegram_id, 1001);
        assert_eq!(user.chars_used, 0);
        assert_eq!(user.request_count, 0);
        assert!(!user.voice_cloned);
        assert!(!user.is_premium);
        assert!(user.voice_id.is_none());
        assert!(!user.created_at.is_empty());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 1002, Some("bob"), None).unwrap();
        db::record_usage(&conn, 1002, 42).unwrap();

        let again = db::get_or_create_user(&conn, 1002, Some("bob"), None).unwrap();
        assert_eq!(again.chars_used, 42);
        assert_eq!(again.request_count, 1);
    }

    #[test]
    fn test_profile_refresh_on_read() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 1003, Some("old_name"), None).unwrap();
        let user = db::get_or_create_user(&conn, 1003, Some("new_name"), Some("New Name")).unwrap();
        assert_eq!(user.username.as_deref(), Some("new_name"));

        let stored = db::get_user(&conn, 1003).unwrap().unwrap();
        assert_eq!(stored.username.as_deref(), Some("new_name"));
        assert_eq!(stored.full_name.as_deref(), Some("New Name"));
    }

    #[test]
    fn test_delete_user_escape_hatch() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 1004, None, None).unwrap();
        assert!(db::delete_user(&conn, 1004).unwrap());
        assert!(!db::delete_user(&conn, 1004).unwrap());
        assert!(db::get_user(&conn, 1004).unwrap().is_none());
    }
}

// ============================================================================
// Usage Gate
// ============================================================================

mod usage_tests {
    use super::*;

    #[test]
    fn test_counters_are_non_decreasing() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 2001, None, None).unwrap();

        let mut last_chars = 0;
        let mut last_requests = 0;
        for chars in [10i64, 25, 5, 100] {
            db::record_usage(&conn, 2001, chars).unwrap();
            let user = db::get_user(&conn, 2001).unwrap().unwrap();
            assert!(user.chars_used >= last_chars);
            assert!(user.request_count >= last_requests);
            last_chars = user.chars_used;
            last_requests = user.request_count;
        }

        assert_eq!(last_chars, 140);
        assert_eq!(last_requests, 4);
    }

    #[test]
    fn test_request_must_fit_remaining_budget_at_480_of_500() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 2002, None, None).unwrap();
        db::record_usage(&conn, 2002, 480).unwrap();

        let user = db::get_user(&conn, 2002).unwrap().unwrap();
        assert_eq!(
            check_usage(&user, &limits(), 25),
            UsageDecision::CharLimitExceeded { remaining: 20 }
        );
        assert_eq!(check_usage(&user, &limits(), 15), UsageDecision::Allow);
    }

    #[test]
    fn test_trials_exhausted_after_counter_limit() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 2003, None, None).unwrap();
        // Burn through the request counter with tiny requests
        let tight = Limits {
            max_free_trials: 2,
            max_chars_per_request: 100,
            free_char_limit_total: 500,
        };
        db::record_usage(&conn, 2003, 1).unwrap();
        db::record_usage(&conn, 2003, 1).unwrap();

        let user = db::get_user(&conn, 2003).unwrap().unwrap();
        assert_eq!(check_usage(&user, &tight, 10), UsageDecision::TrialsExhausted);
    }
}

// ============================================================================
// Voice-Clone Gate
// ============================================================================

mod clone_tests {
    use super::*;

    #[test]
    fn test_free_user_clones_exactly_once() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let user = db::get_or_create_user(&conn, 3001, None, None).unwrap();
        assert_eq!(check_clone_allowed(&user), CloneDecision::Allow);

        assert!(record_clone(&conn, &user, "voice-abc", "active").unwrap());

        let user = db::get_user(&conn, 3001).unwrap().unwrap();
        assert!(user.voice_cloned);
        assert_eq!(user.voice_id.as_deref(), Some("voice-abc"));
        assert_eq!(check_clone_allowed(&user), CloneDecision::AlreadyCloned);

        // The guarded update refuses a second write too
        assert!(!db::record_clone_free(&conn, 3001, "voice-second", "active").unwrap());
        let user = db::get_user(&conn, 3001).unwrap().unwrap();
        assert_eq!(user.voice_id.as_deref(), Some("voice-abc"));
    }

    #[test]
    fn test_concurrent_first_clone_has_exactly_one_winner() {
        let (_dir, pool) = test_pool();
        {
            let conn = get_connection(&pool).unwrap();
            db::get_or_create_user(&conn, 3002, None, None).unwrap();
        }

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
        let mut handles = Vec::new();

        for voice_id in ["voice-a", "voice-b"] {
            let pool = pool.clone();
            let barrier = std::sync::Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                let conn = get_connection(&pool).unwrap();
                barrier.wait();
                db::record_clone_free(&conn, 3002, voice_id, "active").unwrap()
            }));
        }

        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|&&won| won).count(), 1);

        let conn = get_connection(&pool).unwrap();
        let user = db::get_user(&conn, 3002).unwrap().unwrap();
        assert!(user.voice_cloned);
        // Exactly one identifier survived
        assert!(user.voice_id.as_deref() == Some("voice-a") || user.voice_id.as_deref() == Some("voice-b"));
    }

    #[test]
    fn test_premium_clone_quota_enforced_by_guarded_update() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 3003, None, None).unwrap();
        premium::activate(&conn, 3003, 30, PlanType::Premium, ActivatedBy::Admin(1)).unwrap();

        let max_clones = *config::premium::MAX_VOICE_CLONES;
        for i in 0..max_clones {
            let user = db::get_user(&conn, 3003).unwrap().unwrap();
            assert_eq!(check_clone_allowed(&user), CloneDecision::Allow);
            assert!(record_clone(&conn, &user, &format!("voice-{}", i), "active").unwrap());
        }

        let user = db::get_user(&conn, 3003).unwrap().unwrap();
        assert_eq!(user.voice_clones_used, max_clones);
        assert_eq!(check_clone_allowed(&user), CloneDecision::QuotaReached);
        assert!(!db::record_clone_premium(&conn, 3003, "voice-over", "active").unwrap());
    }

    #[test]
    fn test_reclone_overwrites_single_voice_identifier() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 3004, None, None).unwrap();
        premium::activate(&conn, 3004, 30, PlanType::Premium, ActivatedBy::Admin(1)).unwrap();

        assert!(db::record_clone_premium(&conn, 3004, "voice-first", "active").unwrap());
        assert!(db::record_clone_premium(&conn, 3004, "voice-second", "active").unwrap());

        let user = db::get_user(&conn, 3004).unwrap().unwrap();
        assert_eq!(user.voice_id.as_deref(), Some("voice-second"));
        assert_eq!(user.voice_clones_used, 2);
    }
}

// ============================================================================
// Premium State
// ============================================================================

mod premium_tests {
    use super::*;

    #[test]
    fn test_activate_sets_fresh_budget() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 4001, None, None).unwrap();
        premium::activate(&conn, 4001, 30, PlanType::Premium, ActivatedBy::Admin(99)).unwrap();

        let user = db::get_user(&conn, 4001).unwrap().unwrap();
        assert!(user.is_premium);
        assert_eq!(user.plan_type.as_deref(), Some("premium"));
        assert_eq!(user.remaining_chars, *config::premium::MONTHLY_CHARS);
        assert_eq!(user.total_chars, *config::premium::MONTHLY_CHARS);
        assert_eq!(user.activated_by.as_deref(), Some("admin"));
        assert_eq!(user.activated_by_admin, Some(99));
        assert!(user.expires_at.is_some());
    }

    #[test]
    fn test_activate_twice_does_not_stack() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 4002, None, None).unwrap();
        premium::activate(&conn, 4002, 30, PlanType::Premium, ActivatedBy::User).unwrap();

        // Spend part of the budget, then re-activate
        assert!(db::deduct_premium_chars(&conn, 4002, 1000).unwrap());
        premium::activate(&conn, 4002, 30, PlanType::Premium, ActivatedBy::User).unwrap();

        let user = db::get_user(&conn, 4002).unwrap().unwrap();
        // Fresh monthly budget, not the sum of two
        assert_eq!(user.remaining_chars, *config::premium::MONTHLY_CHARS);
        assert_eq!(user.total_chars, *config::premium::MONTHLY_CHARS);
    }

    #[test]
    fn test_deduct_never_goes_negative() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 4003, None, None).unwrap();
        premium::activate(&conn, 4003, 30, PlanType::Premium, ActivatedBy::User).unwrap();

        let budget = *config::premium::MONTHLY_CHARS;
        assert!(db::deduct_premium_chars(&conn, 4003, budget - 1).unwrap());

        // 2 > remaining 1: rejected, record unchanged
        assert!(!db::deduct_premium_chars(&conn, 4003, 2).unwrap());
        let user = db::get_user(&conn, 4003).unwrap().unwrap();
        assert_eq!(user.remaining_chars, 1);

        assert!(db::deduct_premium_chars(&conn, 4003, 1).unwrap());
        let user = db::get_user(&conn, 4003).unwrap().unwrap();
        assert_eq!(user.remaining_chars, 0);
    }

    #[test]
    fn test_deduct_is_noop_for_trial_and_free() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let free_user = db::get_or_create_user(&conn, 4004, None, None).unwrap();
        assert!(premium::deduct(&conn, &free_user, 100).unwrap());

        db::get_or_create_user(&conn, 4005, None, None).unwrap();
        premium::activate(&conn, 4005, 3, PlanType::Trial, ActivatedBy::Admin(1)).unwrap();
        let trial_user = db::get_user(&conn, 4005).unwrap().unwrap();
        assert!(premium::deduct(&conn, &trial_user, 100_000).unwrap());

        let after = db::get_user(&conn, 4005).unwrap().unwrap();
        assert_eq!(after.remaining_chars, trial_user.remaining_chars);
    }

    #[test]
    fn test_expired_premium_is_deactivated_lazily() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 4006, None, None).unwrap();
        premium::activate(&conn, 4006, 30, PlanType::Premium, ActivatedBy::User).unwrap();

        // Push the expiry into the past behind the engine's back
        conn.execute(
            "UPDATE users SET expires_at = datetime('now', '-1 day') WHERE telegram_id = 4006",
            [],
        )
        .unwrap();

        assert!(!premium::is_active(&conn, 4006).unwrap());

        let user = db::get_user(&conn, 4006).unwrap().unwrap();
        assert!(!user.is_premium);
        assert_eq!(user.remaining_chars, 0);
        assert!(user.deactivated_at.is_some());
        // Voice identity persists independently of premium status
        assert_eq!(check_usage(&user, &limits(), 10), UsageDecision::Allow);
    }

    #[test]
    fn test_lazy_expiry_applies_on_get_or_create() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 4007, None, None).unwrap();
        premium::activate(&conn, 4007, 30, PlanType::Premium, ActivatedBy::User).unwrap();
        conn.execute(
            "UPDATE users SET expires_at = datetime('now', '-1 hour') WHERE telegram_id = 4007",
            [],
        )
        .unwrap();

        let user = db::get_or_create_user(&conn, 4007, None, None).unwrap();
        assert!(!user.is_premium);
    }

    #[test]
    fn test_deactivate_preserves_usage_counters() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 4008, None, None).unwrap();
        db::record_usage(&conn, 4008, 123).unwrap();
        premium::activate(&conn, 4008, 30, PlanType::Premium, ActivatedBy::User).unwrap();
        premium::deactivate(&conn, 4008).unwrap();

        let user = db::get_user(&conn, 4008).unwrap().unwrap();
        assert!(!user.is_premium);
        assert_eq!(user.remaining_chars, 0);
        assert_eq!(user.chars_used, 123);
        assert_eq!(user.request_count, 1);
    }

    #[test]
    fn test_expire_old_premium_sweeps_only_overdue_rows() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 4009, None, None).unwrap();
        db::get_or_create_user(&conn, 4010, None, None).unwrap();
        premium::activate(&conn, 4009, 30, PlanType::Premium, ActivatedBy::User).unwrap();
        premium::activate(&conn, 4010, 30, PlanType::Premium, ActivatedBy::User).unwrap();

        conn.execute(
            "UPDATE users SET expires_at = datetime('now', '-1 day') WHERE telegram_id = 4009",
            [],
        )
        .unwrap();

        assert_eq!(db::expire_old_premium(&conn).unwrap(), 1);
        assert!(!db::get_user(&conn, 4009).unwrap().unwrap().is_premium);
        assert!(db::get_user(&conn, 4010).unwrap().unwrap().is_premium);
    }
}

// ============================================================================
// Aggregated stats
// ============================================================================

mod stats_tests {
    use super::*;

    #[test]
    fn test_global_stats_counts() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        db::get_or_create_user(&conn, 5001, None, None).unwrap();
        db::get_or_create_user(&conn, 5002, None, None).unwrap();
        db::get_or_create_user(&conn, 5003, None, None).unwrap();
        premium::activate(&conn, 5002, 30, PlanType::Premium, ActivatedBy::Admin(1)).unwrap();
        db::record_usage(&conn, 5001, 200).unwrap();
        db::record_usage(&conn, 5003, 50).unwrap();

        let stats = db::get_global_stats(&conn).unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.premium_users, 1);
        assert_eq!(stats.total_chars, 250);
        // record_usage stamps last_used_at, both users count as active
        assert_eq!(stats.active_today, 2);
    }
}
