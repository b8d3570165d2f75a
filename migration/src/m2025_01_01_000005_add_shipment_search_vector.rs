//! Migration adding the generated full-text search column on shipments.
//!
//! Postgres only; other backends fall back to LIKE search and skip this step.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, DbBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() != DbBackend::Postgres {
            return Ok(());
        }

        let db = manager.get_connection();
        db.execute_unprepared(
            r#"ALTER TABLE "shipments" ADD COLUMN IF NOT EXISTS "search_vector" tsvector
               GENERATED ALWAYS AS (
                   setweight(to_tsvector('simple', coalesce("pro_number", '')), 'A') ||
                   setweight(to_tsvector('simple', coalesce("bol", '')), 'B')
               ) STORED"#,
        )
        .await?;
        db.execute_unprepared(
            r#"CREATE INDEX IF NOT EXISTS "idx_shipments_search_vector"
               ON "shipments" USING GIN ("search_vector")"#,
        )
        .await?;
        db.execute_unprepared(
            r#"CREATE INDEX IF NOT EXISTS "idx_workers_endorsements"
               ON "workers" USING GIN ("endorsements")"#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() != DbBackend::Postgres {
            return Ok(());
        }

        let db = manager.get_connection();
        db.execute_unprepared(r#"DROP INDEX IF EXISTS "idx_workers_endorsements""#)
            .await?;
        db.execute_unprepared(r#"DROP INDEX IF EXISTS "idx_shipments_search_vector""#)
            .await?;
        db.execute_unprepared(r#"ALTER TABLE "shipments" DROP COLUMN IF EXISTS "search_vector""#)
            .await?;
        Ok(())
    }
}
