//! Migration to create the sequences table.
//!
//! One counter row per organization, sequence type, year and month.

use sea_orm_migration::prelude::*;

use crate::common::{Envelope, tenant_table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                tenant_table(Sequences::Table)
                    .col(ColumnDef::new(Sequences::Type).text().not_null())
                    .col(ColumnDef::new(Sequences::Year).small_integer().not_null())
                    .col(ColumnDef::new(Sequences::Month).small_integer().not_null())
                    .col(
                        ColumnDef::new(Sequences::CurrentSequence)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_sequences_org_type_year_month")
                    .table(Sequences::Table)
                    .col(Envelope::OrganizationId)
                    .col(Sequences::Type)
                    .col(Sequences::Year)
                    .col(Sequences::Month)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sequences::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sequences {
    Table,
    Type,
    Year,
    Month,
    CurrentSequence,
}
