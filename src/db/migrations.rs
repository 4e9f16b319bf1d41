use tokio_rusqlite::Connection;

use crate::db::schema::SCHEMA_V1;

pub async fn setup_migrations(conn: &Connection) -> Result<(), tokio_rusqlite::Error> {
    conn.call(|conn| {
        let ver: i32 = conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?;

        if ver < 1 {
            conn.execute_batch(SCHEMA_V1)?;
        }

        // A future SCHEMA_V2 gets its own `ver < 2` block here.

        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().await.expect("open in-memory db");
        setup_migrations(&conn).await.expect("first run");
        setup_migrations(&conn).await.expect("second run");

        let ver: i32 = conn
            .call(|conn| Ok(conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?))
            .await
            .expect("read user_version");
        assert_eq!(ver, 1);
    }
}
