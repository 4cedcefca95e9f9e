// Copyright 2026 the crawler authors.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::{collections::HashSet, str::FromStr};

use async_trait::async_trait;
use chrono::Utc;
use errors::Result;
use once_cell::sync::Lazy;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Pool, Postgres, Row,
};

use crate::types::{DiscoveredFile, ErrorType, FileRecord, NewUser, Site, SiteStatus, User};

pub static CLIENT: Lazy<Pool<Postgres>> = Lazy::new(connect);

fn connect() -> Pool<Postgres> {
    let cfg = config::get_config();
    let dsn = format!(
        "postgres://{}:{}@{}/{}",
        cfg.store.user, cfg.store.password, cfg.store.server, cfg.store.database
    );
    let opts = PgConnectOptions::from_str(&dsn).expect("postgres connect options create failed");
    PgPoolOptions::new()
        .min_connections(cfg.store.min_connections)
        .max_connections(cfg.store.max_connections)
        .connect_lazy_with(opts)
}

#[derive(Default)]
pub struct PostgresStore {}

impl PostgresStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::Store for PostgresStore {
    async fn provision(&self) -> Result<()> {
        let pool = CLIENT.clone();
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS users (
    user_id    VARCHAR(255) PRIMARY KEY,
    email      VARCHAR(255) NOT NULL,
    name       VARCHAR(255) NOT NULL,
    provider   VARCHAR(50) NOT NULL,
    api_key    VARCHAR(64) UNIQUE NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_login TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS sites (
    site_url                VARCHAR(500) NOT NULL,
    user_id                 VARCHAR(255) NOT NULL,
    process_interval_hours  BIGINT NOT NULL DEFAULT 24,
    last_processed          TIMESTAMPTZ,
    is_active               BOOLEAN NOT NULL DEFAULT true,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (site_url, user_id)
);
CREATE TABLE IF NOT EXISTS files (
    site_url         VARCHAR(500) NOT NULL,
    user_id          VARCHAR(255) NOT NULL,
    file_url         VARCHAR(500) NOT NULL,
    schema_map       VARCHAR(500),
    last_read_time   TIMESTAMPTZ,
    number_of_items  BIGINT NOT NULL DEFAULT 0,
    is_manual        BOOLEAN NOT NULL DEFAULT false,
    is_active        BOOLEAN NOT NULL DEFAULT true,
    PRIMARY KEY (file_url, user_id)
);
CREATE TABLE IF NOT EXISTS ids (
    file_url VARCHAR(500) NOT NULL,
    user_id  VARCHAR(255) NOT NULL,
    id       VARCHAR(500) NOT NULL
);
CREATE INDEX IF NOT EXISTS ids_file_user_idx ON ids (file_url, user_id);
CREATE INDEX IF NOT EXISTS ids_id_user_idx ON ids (id, user_id);
CREATE TABLE IF NOT EXISTS processing_errors (
    id             BIGSERIAL PRIMARY KEY,
    file_url       VARCHAR(500) NOT NULL,
    user_id        VARCHAR(255) NOT NULL,
    error_type     VARCHAR(100) NOT NULL,
    error_message  TEXT NOT NULL,
    error_details  TEXT,
    occurred_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn add_user(&self, user: NewUser) -> Result<()> {
        let pool = CLIENT.clone();
        let api_key = crate::types::generate_api_key();
        sqlx::query(
            r#"INSERT INTO users (user_id, email, name, provider, api_key) VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (user_id) DO UPDATE SET last_login = now();"#,
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.provider)
        .bind(&api_key)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let pool = CLIENT.clone();
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE user_id = $1;"#)
            .bind(user_id)
            .fetch_optional(&pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>> {
        let pool = CLIENT.clone();
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE api_key = $1;"#)
            .bind(api_key)
            .fetch_optional(&pool)
            .await?;
        Ok(user)
    }

    async fn update_last_login(&self, user_id: &str) -> Result<()> {
        let pool = CLIENT.clone();
        sqlx::query(r#"UPDATE users SET last_login = now() WHERE user_id = $1;"#)
            .bind(user_id)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn add_site(&self, site_url: &str, user_id: &str, interval_hours: i64) -> Result<()> {
        let site_url = crate::types::normalize_site_url(site_url);
        let pool = CLIENT.clone();
        sqlx::query(
            r#"INSERT INTO sites (site_url, user_id, process_interval_hours, is_active) VALUES ($1, $2, $3, true)
               ON CONFLICT (site_url, user_id) DO UPDATE SET process_interval_hours = $3, is_active = true;"#,
        )
        .bind(&site_url)
        .bind(user_id)
        .bind(interval_hours)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn remove_site(&self, site_url: &str, user_id: &str) -> Result<Vec<String>> {
        let pool = CLIENT.clone();
        let mut tx = pool.begin().await?;

        let files: Vec<String> = sqlx::query_scalar(
            r#"SELECT file_url FROM files WHERE site_url = $1 AND user_id = $2;"#,
        )
        .bind(site_url)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"DELETE FROM ids WHERE user_id = $1 AND file_url IN (
                   SELECT file_url FROM files WHERE site_url = $2 AND user_id = $1
               );"#,
        )
        .bind(user_id)
        .bind(site_url)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r#"DELETE FROM files WHERE site_url = $1 AND user_id = $2;"#)
            .bind(site_url)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(r#"DELETE FROM sites WHERE site_url = $1 AND user_id = $2;"#)
            .bind(site_url)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(files)
    }

    async fn get_due_sites(&self) -> Result<Vec<Site>> {
        let pool = CLIENT.clone();
        let now = Utc::now();
        let sites = sqlx::query_as::<_, Site>(
            r#"SELECT * FROM sites WHERE is_active = true AND (
                   last_processed IS NULL
                   OR last_processed + (process_interval_hours || ' hours')::interval <= $1
               );"#,
        )
        .bind(now)
        .fetch_all(&pool)
        .await?;
        Ok(sites)
    }

    async fn update_site_last_processed(&self, site_url: &str, user_id: &str) -> Result<()> {
        let pool = CLIENT.clone();
        sqlx::query(
            r#"UPDATE sites SET last_processed = $1 WHERE site_url = $2 AND user_id = $3;"#,
        )
        .bind(Utc::now())
        .bind(site_url)
        .bind(user_id)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn get_site_status(&self, user_id: &str) -> Result<Vec<SiteStatus>> {
        let pool = CLIENT.clone();
        let rows = sqlx::query(
            r#"SELECT
                   s.site_url AS site_url,
                   s.is_active AS is_active,
                   s.last_processed AS last_processed,
                   COUNT(DISTINCT f.file_url) AS total_files,
                   COUNT(DISTINCT CASE WHEN f.is_manual THEN f.file_url END) AS manual_files,
                   COUNT(DISTINCT i.id) AS total_ids
               FROM sites s
               LEFT JOIN files f ON s.site_url = f.site_url AND s.user_id = f.user_id AND f.is_active = true
               LEFT JOIN ids i ON f.file_url = i.file_url AND f.user_id = i.user_id
               WHERE s.user_id = $1
               GROUP BY s.site_url, s.is_active, s.last_processed
               ORDER BY s.site_url;"#,
        )
        .bind(user_id)
        .fetch_all(&pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| SiteStatus {
                site_url: r.get("site_url"),
                is_active: r.get("is_active"),
                last_processed: r.get("last_processed"),
                total_files: r.get("total_files"),
                manual_files: r.get("manual_files"),
                total_ids: r.get("total_ids"),
            })
            .collect())
    }

    async fn list_site_files(&self, site_url: &str, user_id: &str) -> Result<Vec<FileRecord>> {
        let pool = CLIENT.clone();
        let files = sqlx::query_as::<_, FileRecord>(
            r#"SELECT * FROM files WHERE site_url = $1 AND user_id = $2 AND is_active = true;"#,
        )
        .bind(site_url)
        .bind(user_id)
        .fetch_all(&pool)
        .await?;
        Ok(files)
    }

    async fn file_exists(&self, file_url: &str, user_id: &str) -> Result<bool> {
        let pool = CLIENT.clone();
        let row: Option<(i32,)> = sqlx::query_as(
            r#"SELECT 1 FROM files WHERE file_url = $1 AND user_id = $2 AND is_active = true;"#,
        )
        .bind(file_url)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?;
        Ok(row.is_some())
    }

    async fn add_manual_schema_file(
        &self,
        site_url: &str,
        user_id: &str,
        file_url: &str,
    ) -> Result<()> {
        let pool = CLIENT.clone();
        sqlx::query(
            r#"INSERT INTO files (site_url, user_id, file_url, schema_map, is_manual, is_active)
               VALUES ($1, $2, $3, NULL, true, true)
               ON CONFLICT (file_url, user_id) DO UPDATE SET is_active = true, is_manual = true, site_url = $1;"#,
        )
        .bind(site_url)
        .bind(user_id)
        .bind(file_url)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn diff_site_files(
        &self,
        site_url: &str,
        user_id: &str,
        schema_map: &str,
        discovered: &[DiscoveredFile],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let pool = CLIENT.clone();
        let mut tx = pool.begin().await?;

        let existing: HashSet<String> = sqlx::query_scalar(
            r#"SELECT file_url FROM files WHERE site_url = $1 AND user_id = $2 AND is_active = true AND schema_map = $3;"#,
        )
        .bind(site_url)
        .bind(user_id)
        .bind(schema_map)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let current: HashSet<String> =
            discovered.iter().map(|f| f.file_url.clone()).collect();

        let added: Vec<String> = current.difference(&existing).cloned().collect();
        let removed: Vec<String> = existing.difference(&current).cloned().collect();

        for file_url in &added {
            sqlx::query(
                r#"INSERT INTO files (site_url, user_id, file_url, schema_map, is_active)
                   VALUES ($1, $2, $3, $4, true)
                   ON CONFLICT (file_url, user_id) DO UPDATE SET is_active = true, site_url = $1, schema_map = $4;"#,
            )
            .bind(site_url)
            .bind(user_id)
            .bind(file_url)
            .bind(schema_map)
            .execute(&mut *tx)
            .await?;
        }

        for file_url in &removed {
            sqlx::query(
                r#"UPDATE files SET is_active = false WHERE site_url = $1 AND user_id = $2 AND file_url = $3;"#,
            )
            .bind(site_url)
            .bind(user_id)
            .bind(file_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((added, removed))
    }

    async fn delete_file(&self, file_url: &str, user_id: &str) -> Result<()> {
        let pool = CLIENT.clone();
        sqlx::query(r#"DELETE FROM files WHERE file_url = $1 AND user_id = $2;"#)
            .bind(file_url)
            .bind(user_id)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn list_file_ids(&self, file_url: &str, user_id: &str) -> Result<HashSet<String>> {
        let pool = CLIENT.clone();
        let ids: Vec<String> = sqlx::query_scalar(
            r#"SELECT id FROM ids WHERE file_url = $1 AND user_id = $2;"#,
        )
        .bind(file_url)
        .bind(user_id)
        .fetch_all(&pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn diff_file_ids(
        &self,
        file_url: &str,
        user_id: &str,
        new_ids: &HashSet<String>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let pool = CLIENT.clone();
        let mut tx = pool.begin().await?;

        let existing: HashSet<String> = sqlx::query_scalar(
            r#"SELECT id FROM ids WHERE file_url = $1 AND user_id = $2;"#,
        )
        .bind(file_url)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let added: Vec<String> = new_ids.difference(&existing).cloned().collect();
        let removed: Vec<String> = existing.difference(new_ids).cloned().collect();

        for id in &added {
            sqlx::query(r#"INSERT INTO ids (file_url, user_id, id) VALUES ($1, $2, $3);"#)
                .bind(file_url)
                .bind(user_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if new_ids.is_empty() {
            sqlx::query(r#"DELETE FROM ids WHERE file_url = $1 AND user_id = $2;"#)
                .bind(file_url)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        } else {
            const BATCH_SIZE: usize = 500;
            for batch in removed.chunks(BATCH_SIZE) {
                let placeholders: Vec<String> =
                    (0..batch.len()).map(|i| format!("${}", i + 3)).collect();
                let sql = format!(
                    "DELETE FROM ids WHERE file_url = $1 AND user_id = $2 AND id IN ({});",
                    placeholders.join(", ")
                );
                let mut query = sqlx::query(&sql).bind(file_url).bind(user_id);
                for id in batch {
                    query = query.bind(id);
                }
                query.execute(&mut *tx).await?;
            }
        }

        sqlx::query(
            r#"UPDATE files SET last_read_time = $1, number_of_items = $2 WHERE file_url = $3 AND user_id = $4;"#,
        )
        .bind(Utc::now())
        .bind(new_ids.len() as i64)
        .bind(file_url)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((added, removed))
    }

    async fn ref_count(&self, id: &str, user_id: &str) -> Result<i64> {
        let pool = CLIENT.clone();
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM ids WHERE id = $1 AND user_id = $2;"#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&pool)
        .await?;
        Ok(count)
    }

    async fn log_error(
        &self,
        file_url: &str,
        user_id: &str,
        error_type: ErrorType,
        message: &str,
        details: Option<&str>,
    ) -> Result<()> {
        let pool = CLIENT.clone();
        sqlx::query(
            r#"INSERT INTO processing_errors (file_url, user_id, error_type, error_message, error_details)
               VALUES ($1, $2, $3, $4, $5);"#,
        )
        .bind(file_url)
        .bind(user_id)
        .bind(error_type.to_string())
        .bind(message)
        .bind(details)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn clear_errors(&self, file_url: &str, user_id: &str) -> Result<()> {
        let pool = CLIENT.clone();
        sqlx::query(r#"DELETE FROM processing_errors WHERE file_url = $1 AND user_id = $2;"#)
            .bind(file_url)
            .bind(user_id)
            .execute(&pool)
            .await?;
        Ok(())
    }
}
