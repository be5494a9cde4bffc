//! Entitlement engine: the decision layer consulted on every user action.
//!
//! The gates are pure functions over an already-read (and expiry-normalized)
//! user row; the recorders re-assert every gate condition inside the guarded
//! UPDATE, so a concurrent double-submission can never overshoot a quota.

use crate::core::config;
use crate::storage::db::{self, DbConnection, User};

/// Лимиты бесплатного тарифа.
///
/// Передаются явно, чтобы гейты оставались чистыми функциями и покрывались
/// тестами без переменных окружения.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Максимум бесплатных запросов (0 отключает счетчик)
    pub max_free_trials: i64,
    /// Максимум символов в одном запросе
    pub max_chars_per_request: i64,
    /// Суммарный бесплатный бюджет символов
    pub free_char_limit_total: i64,
}

impl Limits {
    /// Собирает лимиты из конфигурации окружения.
    pub fn from_env() -> Self {
        Self {
            max_free_trials: *config::limits::MAX_FREE_TRIALS,
            max_chars_per_request: *config::limits::MAX_CHARS_PER_REQUEST,
            free_char_limit_total: *config::limits::FREE_CHAR_LIMIT_TOTAL,
        }
    }
}

/// Решение гейта использования для одного текстового запроса.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageDecision {
    /// Запрос можно выполнять
    Allow,
    /// Запрос не помещается в оставшийся бюджет символов
    CharLimitExceeded {
        /// Сколько символов еще доступно (не меньше нуля)
        remaining: i64,
    },
    /// Исчерпан счетчик бесплатных запросов
    TrialsExhausted,
}

/// Решение гейта клонирования голоса.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneDecision {
    /// Клонирование разрешено
    Allow,
    /// Бесплатный голос уже клонирован (необратимо вне премиума)
    AlreadyCloned,
    /// Премиум-лимит смен голоса исчерпан
    QuotaReached,
}

/// Проверяет, разрешен ли запрос на озвучку `incoming_chars` символов.
///
/// Порядок проверок:
/// 1. Активный метрируемый премиум: запрос должен целиком помещаться в
///    `remaining_chars` (частичное списание не поддерживается).
/// 2. Активный trial: без посимвольного учета, ограничен только сроком.
/// 3. Бесплатный тариф: суммарный бюджет, затем счетчик запросов.
pub fn check_usage(user: &User, limits: &Limits, incoming_chars: i64) -> UsageDecision {
    if user.has_metered_premium() {
        let remaining = user.remaining_chars.max(0);
        if remaining <= 0 || incoming_chars > remaining {
            return UsageDecision::CharLimitExceeded { remaining };
        }
        return UsageDecision::Allow;
    }

    if user.has_trial_premium() {
        return UsageDecision::Allow;
    }

    let remaining = limits.free_char_limit_total - user.chars_used;
    if remaining <= 0 || incoming_chars > remaining {
        return UsageDecision::CharLimitExceeded {
            remaining: remaining.max(0),
        };
    }

    if limits.max_free_trials > 0 && user.request_count >= limits.max_free_trials {
        return UsageDecision::TrialsExhausted;
    }

    UsageDecision::Allow
}

/// Проверяет, разрешено ли пользователю клонировать голос.
///
/// Премиум дает `max_voice_clones` смен голоса, бесплатный тариф — ровно
/// одну, навсегда.
pub fn check_clone_allowed(user: &User) -> CloneDecision {
    if user.is_premium {
        if user.voice_clones_used < user.max_voice_clones {
            return CloneDecision::Allow;
        }
        return CloneDecision::QuotaReached;
    }

    if user.voice_cloned {
        return CloneDecision::AlreadyCloned;
    }

    CloneDecision::Allow
}

/// Записывает успешное клонирование голоса.
///
/// Выбирает премиум- или бесплатный путь по состоянию строки и выполняет
/// один охраняемый UPDATE. `Ok(false)` означает, что параллельный запрос
/// успел первым и квота уже выбрана — вызывающая сторона сообщает об отказе,
/// второй идентификатор голоса не сохраняется.
pub fn record_clone(conn: &DbConnection, user: &User, voice_id: &str, status: &str) -> rusqlite::Result<bool> {
    if user.is_premium {
        db::record_clone_premium(conn, user.telegram_id, voice_id, status)
    } else {
        db::record_clone_free(conn, user.telegram_id, voice_id, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn free_user() -> User {
        User {
            telegram_id: 100,
            username: Some("tester".to_string()),
            full_name: None,
            created_at: "2025-01-01 00:00:00".to_string(),
            last_used_at: None,
            chars_used: 0,
            request_count: 0,
            voice_cloned: false,
            voice_id: None,
            voice_status: None,
            is_premium: false,
            plan_type: None,
            activated_at: None,
            expires_at: None,
            deactivated_at: None,
            remaining_chars: 0,
            total_chars: 0,
            voice_clones_used: 0,
            max_voice_clones: 0,
            activated_by: None,
            activated_by_admin: None,
        }
    }

    fn limits() -> Limits {
        Limits {
            max_free_trials: 2,
            max_chars_per_request: 100,
            free_char_limit_total: 500,
        }
    }

    #[test]
    fn test_fresh_user_is_allowed() {
        let user = free_user();
        assert_eq!(check_usage(&user, &limits(), 50), UsageDecision::Allow);
    }

    #[test]
    fn test_request_must_fit_remaining_budget() {
        let mut user = free_user();
        user.chars_used = 480;

        // 25 > remaining 20 — отказ целиком, без усечения
        assert_eq!(
            check_usage(&user, &limits(), 25),
            UsageDecision::CharLimitExceeded { remaining: 20 }
        );
        assert_eq!(check_usage(&user, &limits(), 15), UsageDecision::Allow);
    }

    #[test]
    fn test_exhausted_budget_denies_any_request() {
        let mut user = free_user();
        user.chars_used = 500;
        assert_eq!(
            check_usage(&user, &limits(), 1),
            UsageDecision::CharLimitExceeded { remaining: 0 }
        );

        user.chars_used = 600;
        assert_eq!(
            check_usage(&user, &limits(), 1),
            UsageDecision::CharLimitExceeded { remaining: 0 }
        );
    }

    #[test]
    fn test_trial_counter_denies_after_limit() {
        let mut user = free_user();
        user.request_count = 2;
        assert_eq!(check_usage(&user, &limits(), 10), UsageDecision::TrialsExhausted);
    }

    #[test]
    fn test_trial_counter_disabled_when_zero() {
        let mut user = free_user();
        user.request_count = 99;
        let mut l = limits();
        l.max_free_trials = 0;
        assert_eq!(check_usage(&user, &l, 10), UsageDecision::Allow);
    }

    #[test]
    fn test_char_limit_checked_before_trial_counter() {
        let mut user = free_user();
        user.chars_used = 500;
        user.request_count = 2;
        assert_eq!(
            check_usage(&user, &limits(), 10),
            UsageDecision::CharLimitExceeded { remaining: 0 }
        );
    }

    #[test]
    fn test_metered_premium_bypasses_free_counters() {
        let mut user = free_user();
        user.is_premium = true;
        user.plan_type = Some("premium".to_string());
        user.remaining_chars = 10_000;
        user.chars_used = 500;
        user.request_count = 99;

        assert_eq!(check_usage(&user, &limits(), 5_000), UsageDecision::Allow);
    }

    #[test]
    fn test_metered_premium_request_must_fit_budget() {
        let mut user = free_user();
        user.is_premium = true;
        user.plan_type = Some("premium".to_string());
        user.remaining_chars = 100;

        assert_eq!(
            check_usage(&user, &limits(), 101),
            UsageDecision::CharLimitExceeded { remaining: 100 }
        );
        assert_eq!(check_usage(&user, &limits(), 100), UsageDecision::Allow);
    }

    #[test]
    fn test_trial_premium_is_unmetered() {
        let mut user = free_user();
        user.is_premium = true;
        user.plan_type = Some("trial".to_string());
        user.chars_used = 10_000;
        user.request_count = 50;

        assert_eq!(check_usage(&user, &limits(), 5_000), UsageDecision::Allow);
    }

    #[test]
    fn test_free_user_clones_once() {
        let mut user = free_user();
        assert_eq!(check_clone_allowed(&user), CloneDecision::Allow);

        user.voice_cloned = true;
        user.voice_id = Some("voice-1".to_string());
        assert_eq!(check_clone_allowed(&user), CloneDecision::AlreadyCloned);
    }

    #[test]
    fn test_premium_clone_quota() {
        let mut user = free_user();
        user.is_premium = true;
        user.plan_type = Some("premium".to_string());
        user.voice_cloned = true;
        user.max_voice_clones = 3;
        user.voice_clones_used = 2;

        assert_eq!(check_clone_allowed(&user), CloneDecision::Allow);

        user.voice_clones_used = 3;
        assert_eq!(check_clone_allowed(&user), CloneDecision::QuotaReached);
    }
}
