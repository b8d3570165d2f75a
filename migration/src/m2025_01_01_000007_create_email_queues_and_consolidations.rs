//! Migration to create the outbound email queue and consolidation groups,
//! and to link shipments to their group.

use sea_orm_migration::prelude::*;

use crate::common::{Envelope, tenant_index, tenant_table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                tenant_table(EmailQueues::Table)
                    .col(ColumnDef::new(EmailQueues::ProfileId).string().not_null())
                    .col(ColumnDef::new(EmailQueues::TemplateId).string().null())
                    .col(ColumnDef::new(EmailQueues::ToAddresses).text().not_null())
                    .col(ColumnDef::new(EmailQueues::CcAddresses).text().null())
                    .col(ColumnDef::new(EmailQueues::Subject).text().not_null())
                    .col(ColumnDef::new(EmailQueues::HtmlBody).text().null())
                    .col(ColumnDef::new(EmailQueues::TextBody).text().null())
                    .col(ColumnDef::new(EmailQueues::Priority).text().not_null())
                    .col(ColumnDef::new(EmailQueues::Status).text().not_null())
                    .col(ColumnDef::new(EmailQueues::ScheduledAt).big_integer().null())
                    .col(ColumnDef::new(EmailQueues::SentAt).big_integer().null())
                    .col(ColumnDef::new(EmailQueues::MessageId).text().null())
                    .col(ColumnDef::new(EmailQueues::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(EmailQueues::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(tenant_index("idx_email_queues_tenant", EmailQueues::Table))
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_email_queues_status")
                    .table(EmailQueues::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(EmailQueues::Status)
                    .col(EmailQueues::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(ConsolidationGroups::Table)
                    .col(
                        ColumnDef::new(ConsolidationGroups::ConsolidationNumber)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConsolidationGroups::Status).text().not_null())
                    .col(ColumnDef::new(ConsolidationGroups::Description).text().null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(tenant_index(
                "idx_consolidation_groups_tenant",
                ConsolidationGroups::Table,
            ))
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_consolidation_groups_number")
                    .table(ConsolidationGroups::Table)
                    .col(Envelope::OrganizationId)
                    .col(ConsolidationGroups::ConsolidationNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Shipments::Table)
                    .add_column(ColumnDef::new(Shipments::ConsolidationGroupId).string().null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_shipments_consolidation_group")
                    .table(Shipments::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(Shipments::ConsolidationGroupId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_shipments_consolidation_group")
                    .table(Shipments::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(Shipments::Table)
                    .drop_column(Shipments::ConsolidationGroupId)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ConsolidationGroups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailQueues::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailQueues {
    Table,
    ProfileId,
    TemplateId,
    ToAddresses,
    CcAddresses,
    Subject,
    HtmlBody,
    TextBody,
    Priority,
    Status,
    ScheduledAt,
    SentAt,
    MessageId,
    ErrorMessage,
    RetryCount,
}

#[derive(DeriveIden)]
enum ConsolidationGroups {
    Table,
    ConsolidationNumber,
    Status,
    Description,
}

#[derive(DeriveIden)]
enum Shipments {
    Table,
    ConsolidationGroupId,
}
