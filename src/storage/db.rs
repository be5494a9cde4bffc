use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Result;

/// Структура, представляющая пользователя в базе данных.
///
/// Одна строка на Telegram ID. Все счетчики изменяются только атомарными
/// UPDATE-запросами с арифметикой на стороне SQL.
#[derive(Debug, Clone)]
pub struct User {
    /// Telegram ID пользователя
    pub telegram_id: i64,
    /// Имя пользователя (username) в Telegram, если доступно
    pub username: Option<String>,
    /// Отображаемое имя пользователя
    pub full_name: Option<String>,
    /// Дата первого контакта (ставится один раз при создании)
    pub created_at: String,
    /// Дата последнего успешного клонирования или озвучки
    pub last_used_at: Option<String>,
    /// Символы, израсходованные на бесплатном тарифе (только растет)
    pub chars_used: i64,
    /// Количество бесплатных запросов (только растет)
    pub request_count: i64,
    /// Флаг клонирования голоса (необратим вне премиума)
    pub voice_cloned: bool,
    /// Идентификатор голоса у провайдера (ровно один на пользователя)
    pub voice_id: Option<String>,
    /// Статус голоса, как его вернул провайдер
    pub voice_status: Option<String>,
    /// Активен ли премиум
    pub is_premium: bool,
    /// Тип плана: "trial" или "premium"
    pub plan_type: Option<String>,
    /// Дата активации премиума
    pub activated_at: Option<String>,
    /// Дата окончания премиума
    pub expires_at: Option<String>,
    /// Дата деактивации премиума
    pub deactivated_at: Option<String>,
    /// Остаток символов премиум-бюджета (никогда не уходит в минус)
    pub remaining_chars: i64,
    /// Снимок бюджета на момент активации
    pub total_chars: i64,
    /// Использованные премиум-клонирования голоса
    pub voice_clones_used: i64,
    /// Лимит премиум-клонирований (снимок на момент активации)
    pub max_voice_clones: i64,
    /// Кто активировал премиум: "admin" или "user"
    pub activated_by: Option<String>,
    /// ID администратора, если активировал администратор
    pub activated_by_admin: Option<i64>,
}

impl User {
    /// Возвращает Telegram ID пользователя.
    pub fn telegram_id(&self) -> i64 {
        self.telegram_id
    }

    /// Активен ли метрируемый (не trial) премиум.
    ///
    /// Строка должна быть прочитана через `get_or_create_user`, который
    /// нормализует просроченный премиум перед чтением.
    pub fn has_metered_premium(&self) -> bool {
        self.is_premium && self.plan_type.as_deref() == Some("premium")
    }

    /// Активен ли trial-план (не метрируется по символам).
    pub fn has_trial_premium(&self) -> bool {
        self.is_premium && self.plan_type.as_deref() == Some("trial")
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const USER_COLUMNS: &str = "telegram_id, username, full_name, created_at, last_used_at, \
     chars_used, request_count, voice_cloned, voice_id, voice_status, \
     is_premium, plan_type, activated_at, expires_at, deactivated_at, \
     remaining_chars, total_chars, voice_clones_used, max_voice_clones, \
     activated_by, activated_by_admin";

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        telegram_id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        created_at: row.get(3)?,
        last_used_at: row.get(4)?,
        chars_used: row.get(5)?,
        request_count: row.get(6)?,
        voice_cloned: row.get::<_, i64>(7)? == 1,
        voice_id: row.get(8)?,
        voice_status: row.get(9)?,
        is_premium: row.get::<_, i64>(10)? == 1,
        plan_type: row.get(11)?,
        activated_at: row.get(12)?,
        expires_at: row.get(13)?,
        deactivated_at: row.get(14)?,
        remaining_chars: row.get(15)?,
        total_chars: row.get(16)?,
        voice_clones_used: row.get(17)?,
        max_voice_clones: row.get(18)?,
        activated_by: row.get(19)?,
        activated_by_admin: row.get(20)?,
    })
}

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and runs schema
/// migrations. Connections are opened with a busy timeout so that concurrent
/// guarded updates queue instead of failing.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
///
/// # Returns
///
/// Returns a `DbPool` on success or an `r2d2::Error` if pool creation fails.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
    });
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    // Ensure schema is up to date on first connection
    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
        // Don't fail on migration errors, as they might be expected
    }

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is automatically returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Migrate database schema to ensure all required columns exist
/// This function safely adds missing columns to existing tables
fn migrate_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            telegram_id INTEGER PRIMARY KEY,
            username TEXT,
            full_name TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            last_used_at DATETIME DEFAULT NULL,
            chars_used INTEGER NOT NULL DEFAULT 0,
            request_count INTEGER NOT NULL DEFAULT 0,
            voice_cloned INTEGER NOT NULL DEFAULT 0,
            voice_id TEXT DEFAULT NULL,
            voice_status TEXT DEFAULT NULL,
            is_premium INTEGER NOT NULL DEFAULT 0,
            plan_type TEXT DEFAULT NULL,
            activated_at DATETIME DEFAULT NULL,
            expires_at DATETIME DEFAULT NULL,
            remaining_chars INTEGER NOT NULL DEFAULT 0,
            total_chars INTEGER NOT NULL DEFAULT 0,
            voice_clones_used INTEGER NOT NULL DEFAULT 0,
            max_voice_clones INTEGER NOT NULL DEFAULT 0,
            activated_by TEXT DEFAULT NULL
        )",
        [],
    )?;

    // Check which columns exist (the table may predate some of them)
    let mut stmt = conn.prepare("PRAGMA table_info(users)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }

    // Add deactivated_at if it doesn't exist
    if !columns.contains(&"deactivated_at".to_string()) {
        log::info!("Adding missing column: deactivated_at to users table");
        if let Err(e) = conn.execute("ALTER TABLE users ADD COLUMN deactivated_at DATETIME DEFAULT NULL", []) {
            log::warn!("Failed to add deactivated_at column: {}", e);
        }
    }

    // Add activated_by_admin if it doesn't exist
    if !columns.contains(&"activated_by_admin".to_string()) {
        log::info!("Adding missing column: activated_by_admin to users table");
        if let Err(e) = conn.execute(
            "ALTER TABLE users ADD COLUMN activated_by_admin INTEGER DEFAULT NULL",
            [],
        ) {
            log::warn!("Failed to add activated_by_admin column: {}", e);
        }
    }

    Ok(())
}

/// Получает пользователя из базы данных по Telegram ID.
///
/// Возвращает `Ok(Some(User))` если пользователь найден, `Ok(None)` если не
/// найден, или ошибку базы данных. Ошибка БД никогда не маскируется под
/// «нового пользователя» — это решает вызывающая сторона как отказ с
/// повтором.
pub fn get_user(conn: &DbConnection, telegram_id: i64) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?1"))?;
    let mut rows = stmt.query_map(rusqlite::params![telegram_id], map_user)?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Гасит просроченный премиум у одного пользователя (ленивое истечение).
///
/// Исторические счетчики не трогаются. Возвращает `true`, если строка была
/// переведена в неактивное состояние этим вызовом.
pub fn expire_due(conn: &DbConnection, telegram_id: i64) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET is_premium = 0,
                          remaining_chars = 0,
                          deactivated_at = datetime('now')
         WHERE telegram_id = ?1
           AND is_premium = 1
           AND expires_at IS NOT NULL
           AND expires_at < datetime('now')",
        rusqlite::params![telegram_id],
    )?;
    if rows > 0 {
        log::info!("Premium expired lazily for user {}", telegram_id);
    }
    Ok(rows > 0)
}

/// Гасит все просроченные премиумы (фоновый обход).
///
/// Возвращает количество обновленных пользователей.
pub fn expire_old_premium(conn: &DbConnection) -> Result<usize> {
    let count = conn.execute(
        "UPDATE users SET is_premium = 0,
                          remaining_chars = 0,
                          deactivated_at = datetime('now')
         WHERE is_premium = 1
           AND expires_at IS NOT NULL
           AND expires_at < datetime('now')",
        [],
    )?;

    if count > 0 {
        log::info!("Expired {} premium subscription(s)", count);
    }

    Ok(count)
}

/// Получает пользователя, создавая его при первом контакте.
///
/// Перед чтением нормализует ленивое истечение премиума, поэтому
/// `is_premium = true` в возвращенной строке означает действующий премиум.
/// Обновляет username/full_name, если они изменились в Telegram.
pub fn get_or_create_user(
    conn: &DbConnection,
    telegram_id: i64,
    username: Option<&str>,
    full_name: Option<&str>,
) -> Result<User> {
    expire_due(conn, telegram_id)?;

    if let Some(mut user) = get_user(conn, telegram_id)? {
        if (username.is_some() && user.username.as_deref() != username)
            || (full_name.is_some() && user.full_name.as_deref() != full_name)
        {
            conn.execute(
                "UPDATE users SET username = COALESCE(?1, username),
                                  full_name = COALESCE(?2, full_name)
                 WHERE telegram_id = ?3",
                rusqlite::params![username, full_name, telegram_id],
            )?;
            if username.is_some() {
                user.username = username.map(str::to_string);
            }
            if full_name.is_some() {
                user.full_name = full_name.map(str::to_string);
            }
        }
        return Ok(user);
    }

    // INSERT OR IGNORE: два первых сообщения подряд не должны падать на гонке
    conn.execute(
        "INSERT OR IGNORE INTO users (telegram_id, username, full_name) VALUES (?1, ?2, ?3)",
        rusqlite::params![telegram_id, username, full_name],
    )?;

    get_user(conn, telegram_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Атомарно списывает бесплатное использование после успешной озвучки.
///
/// Инкрементирует оба счетчика одним UPDATE. Вызывается только после того,
/// как внешний вызов синтеза завершился успешно.
pub fn record_usage(conn: &DbConnection, telegram_id: i64, chars: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET chars_used = chars_used + ?1,
                          request_count = request_count + 1,
                          last_used_at = datetime('now')
         WHERE telegram_id = ?2",
        rusqlite::params![chars, telegram_id],
    )?;
    Ok(())
}

/// Обновляет отметку последнего использования без изменения счетчиков.
pub fn touch_last_used(conn: &DbConnection, telegram_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET last_used_at = datetime('now') WHERE telegram_id = ?1",
        rusqlite::params![telegram_id],
    )?;
    Ok(())
}

/// Записывает первое (бесплатное) клонирование голоса.
///
/// Охранное условие `voice_cloned = 0` входит в сам UPDATE: из двух
/// конкурирующих запросов выиграет ровно один, второй получит `false`.
pub fn record_clone_free(conn: &DbConnection, telegram_id: i64, voice_id: &str, status: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET voice_id = ?1,
                          voice_status = ?2,
                          voice_cloned = 1,
                          last_used_at = datetime('now')
         WHERE telegram_id = ?3
           AND voice_cloned = 0",
        rusqlite::params![voice_id, status, telegram_id],
    )?;
    Ok(rows > 0)
}

/// Записывает премиум-клонирование (перезапись голоса).
///
/// Старый идентификатор затирается, счетчик клонирований инкрементируется
/// под охраной `voice_clones_used < max_voice_clones` в том же UPDATE.
pub fn record_clone_premium(conn: &DbConnection, telegram_id: i64, voice_id: &str, status: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET voice_id = ?1,
                          voice_status = ?2,
                          voice_cloned = 1,
                          voice_clones_used = voice_clones_used + 1,
                          last_used_at = datetime('now')
         WHERE telegram_id = ?3
           AND is_premium = 1
           AND voice_clones_used < max_voice_clones",
        rusqlite::params![voice_id, status, telegram_id],
    )?;
    Ok(rows > 0)
}

/// Активирует премиум или trial для пользователя.
///
/// Повторная активация перезаписывает бюджет и срок (не суммируется).
#[allow(clippy::too_many_arguments)]
pub fn activate_premium(
    conn: &DbConnection,
    telegram_id: i64,
    days: i64,
    plan_type: &str,
    budget_chars: i64,
    max_voice_clones: i64,
    activated_by: &str,
    activated_by_admin: Option<i64>,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET is_premium = 1,
                          plan_type = ?1,
                          activated_at = datetime('now'),
                          expires_at = datetime('now', '+' || ?2 || ' days'),
                          deactivated_at = NULL,
                          remaining_chars = ?3,
                          total_chars = ?3,
                          voice_clones_used = 0,
                          max_voice_clones = ?4,
                          activated_by = ?5,
                          activated_by_admin = ?6
         WHERE telegram_id = ?7",
        rusqlite::params![
            plan_type,
            days,
            budget_chars,
            max_voice_clones,
            activated_by,
            activated_by_admin,
            telegram_id
        ],
    )?;
    Ok(())
}

/// Деактивирует премиум, сохраняя исторические счетчики использования.
pub fn deactivate_premium(conn: &DbConnection, telegram_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET is_premium = 0,
                          remaining_chars = 0,
                          deactivated_at = datetime('now')
         WHERE telegram_id = ?1",
        rusqlite::params![telegram_id],
    )?;
    Ok(())
}

/// Атомарно списывает символы из премиум-бюджета.
///
/// Охрана `remaining_chars >= ?1` не дает бюджету уйти в минус: при
/// недостатке средств UPDATE не затрагивает строку и функция возвращает
/// `false`. Вместе со списанием инкрементируется общий счетчик символов.
pub fn deduct_premium_chars(conn: &DbConnection, telegram_id: i64, chars: i64) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET remaining_chars = remaining_chars - ?1,
                          chars_used = chars_used + ?1,
                          last_used_at = datetime('now')
         WHERE telegram_id = ?2
           AND is_premium = 1
           AND plan_type = 'premium'
           AND remaining_chars >= ?1",
        rusqlite::params![chars, telegram_id],
    )?;
    Ok(rows > 0)
}

/// Удаляет пользователя (административный аварийный выход).
///
/// Возвращает `true`, если строка существовала.
pub fn delete_user(conn: &DbConnection, telegram_id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM users WHERE telegram_id = ?1", rusqlite::params![telegram_id])?;
    Ok(rows > 0)
}

/// Получает список всех пользователей из базы данных.
pub fn get_all_users(conn: &DbConnection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY telegram_id"))?;
    let rows = stmt.query_map([], map_user)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

/// Структура глобальной статистики
#[derive(Debug, Clone)]
pub struct GlobalStats {
    pub total_users: i64,
    pub premium_users: i64,
    pub active_today: i64,
    pub total_chars: i64,
}

/// Получает глобальную статистику бота
pub fn get_global_stats(conn: &DbConnection) -> Result<GlobalStats> {
    let total_users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

    let premium_users: i64 = conn.query_row("SELECT COUNT(*) FROM users WHERE is_premium = 1", [], |row| {
        row.get(0)
    })?;

    let active_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users
         WHERE last_used_at IS NOT NULL
           AND last_used_at >= datetime('now', '-1 day')",
        [],
        |row| row.get(0),
    )?;

    let total_chars: i64 = conn.query_row(
        "SELECT COALESCE(SUM(chars_used), 0) FROM users",
        [],
        |row| row.get(0),
    )?;

    Ok(GlobalStats {
        total_users,
        premium_users,
        active_today,
        total_chars,
    })
}
