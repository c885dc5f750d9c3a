//! Installs the row-level trigger that feeds `CacheNotificationListener`.
//!
//! `notify_lifecycle_change()` sends one NOTIFY per changed row on the
//! `entity_lifecycle` channel, with a JSON payload of the form
//! `{"table": "users", "action": "insert|update|delete", "id": "<primary key>"}`.
//! The function reads the `id` column of `NEW` (or `OLD` on delete), so only
//! tables keyed by a column named `id` can be attached.

use sqlx::PgPool;

/// Creates (or replaces) the `notify_lifecycle_change()` trigger function.
///
/// No table emits notifications until it is attached with
/// [`attach_lifecycle_trigger`].
///
/// ```rust,no_run
/// use sqlx::PgPool;
/// use postgres_query_cache::{attach_lifecycle_trigger, init_lifecycle_triggers};
///
/// # async fn example(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// init_lifecycle_triggers(pool).await?;
/// attach_lifecycle_trigger(pool, "users").await?;
/// # Ok(())
/// # }
/// ```
pub async fn init_lifecycle_triggers(pool: &PgPool) -> Result<(), sqlx::Error> {
    const SQL: &str = include_str!("../sql/lifecycle_notification_triggers.sql");
    sqlx::raw_sql(SQL).execute(pool).await?;
    Ok(())
}

/// Attaches an `AFTER INSERT OR UPDATE OR DELETE` row trigger named
/// `<table>_lifecycle_notify` to `table`, replacing any previous one.
pub async fn attach_lifecycle_trigger(pool: &PgPool, table: &str) -> Result<(), sqlx::Error> {
    let trigger = quote_ident(&format!("{table}_lifecycle_notify"));
    let table = quote_ident(table);
    let sql = format!(
        "DROP TRIGGER IF EXISTS {trigger} ON {table};
         CREATE TRIGGER {trigger}
         AFTER INSERT OR UPDATE OR DELETE ON {table}
         FOR EACH ROW EXECUTE FUNCTION notify_lifecycle_change();"
    );
    sqlx::raw_sql(&sql).execute(pool).await?;
    Ok(())
}

/// Drops `notify_lifecycle_change()` and, through `CASCADE`, every trigger
/// attached with [`attach_lifecycle_trigger`].
pub async fn cleanup_lifecycle_triggers(pool: &PgPool) -> Result<(), sqlx::Error> {
    const SQL: &str = include_str!("../cleanup/cleanup_lifecycle_notification_triggers.sql");
    sqlx::raw_sql(SQL).execute(pool).await?;
    Ok(())
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
