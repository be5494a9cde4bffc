//! Premium/entitlement state: activation, deactivation, metered deduction
//! and the single place where expiry is decided.

use crate::core::config;
use crate::storage::db::{self, DbConnection};

/// Тип премиум-плана.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanType {
    /// Оценочный план: ограничен сроком, символы не метрируются
    Trial,
    /// Оплаченный план: месячный бюджет символов и лимит смен голоса
    Premium,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Trial => "trial",
            PlanType::Premium => "premium",
        }
    }
}

/// Кто активировал премиум.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivatedBy {
    /// Администратор (с его ID)
    Admin(i64),
    /// Сам пользователь (оплата вне бота)
    User,
}

/// Проверяет, действует ли премиум у пользователя.
///
/// Единственное место, где принимается решение об истечении: просроченная
/// запись гасится здесь же (с отметкой деактивации), побочным эффектом
/// чтения, а не по расписанию.
pub fn is_active(conn: &DbConnection, telegram_id: i64) -> rusqlite::Result<bool> {
    db::expire_due(conn, telegram_id)?;

    let active: Option<i64> = conn
        .query_row(
            "SELECT is_premium FROM users WHERE telegram_id = ?1",
            rusqlite::params![telegram_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(active == Some(1))
}

/// Активирует премиум или trial на `days` дней.
///
/// Повторная активация перезаписывает срок и бюджет (не суммируется):
/// `remaining_chars` становится свежим бюджетом плана, `expires_at` отражает
/// только последний вызов.
pub fn activate(conn: &DbConnection, telegram_id: i64, days: i64, plan: PlanType, activated_by: ActivatedBy) -> rusqlite::Result<()> {
    let budget = match plan {
        PlanType::Trial => *config::premium::TRIAL_CHARS,
        PlanType::Premium => *config::premium::MONTHLY_CHARS,
    };

    let (by, admin_id) = match activated_by {
        ActivatedBy::Admin(id) => ("admin", Some(id)),
        ActivatedBy::User => ("user", None),
    };

    db::activate_premium(
        conn,
        telegram_id,
        days,
        plan.as_str(),
        budget,
        *config::premium::MAX_VOICE_CLONES,
        by,
        admin_id,
    )?;

    log::info!(
        "Premium activated: user_id={}, plan={}, days={}, budget={}, by={}",
        telegram_id,
        plan.as_str(),
        days,
        budget,
        by
    );
    Ok(())
}

/// Деактивирует премиум, не трогая исторические счетчики использования.
pub fn deactivate(conn: &DbConnection, telegram_id: i64) -> rusqlite::Result<()> {
    db::deactivate_premium(conn, telegram_id)?;
    log::info!("Premium deactivated: user_id={}", telegram_id);
    Ok(())
}

/// Списывает `chars` символов с премиум-бюджета после успешной озвучки.
///
/// Для метрируемого плана — атомарный охраняемый декремент: `Ok(false)`
/// означает, что средств не хватило и строка не изменилась. Для trial и
/// для пользователей без премиума списания нет (возвращается `Ok(true)`,
/// бесплатный учет ведет гейт использования).
pub fn deduct(conn: &DbConnection, user: &db::User, chars: i64) -> rusqlite::Result<bool> {
    if !user.has_metered_premium() {
        if user.has_trial_premium() {
            db::touch_last_used(conn, user.telegram_id)?;
        }
        return Ok(true);
    }

    db::deduct_premium_chars(conn, user.telegram_id, chars)
}
