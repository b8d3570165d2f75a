//! Migration replacing the email profile default lookup index with a partial
//! unique index, so an organization can hold at most one default profile.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(r#"DROP INDEX IF EXISTS "idx_email_profiles_default""#)
            .await?;
        // Partial indexes are supported by both Postgres and SQLite.
        db.execute_unprepared(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_email_profiles_one_default"
               ON "email_profiles" ("organization_id") WHERE "is_default""#,
        )
        .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(r#"DROP INDEX IF EXISTS "idx_email_profiles_one_default""#)
            .await?;
        db.execute_unprepared(
            r#"CREATE INDEX IF NOT EXISTS "idx_email_profiles_default"
               ON "email_profiles" ("organization_id", "is_default")"#,
        )
        .await?;
        Ok(())
    }
}
