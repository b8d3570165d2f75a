//! Migration to create email profiles, dedicated lanes, notifications and
//! documents.

use sea_orm_migration::prelude::*;

use crate::common::{Envelope, tenant_index, tenant_table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                tenant_table(EmailProfiles::Table)
                    .col(ColumnDef::new(EmailProfiles::Name).text().not_null())
                    .col(ColumnDef::new(EmailProfiles::Status).text().not_null())
                    .col(ColumnDef::new(EmailProfiles::ProviderType).text().not_null())
                    .col(ColumnDef::new(EmailProfiles::AuthType).text().not_null())
                    .col(ColumnDef::new(EmailProfiles::Host).text().null())
                    .col(ColumnDef::new(EmailProfiles::Port).integer().null())
                    .col(ColumnDef::new(EmailProfiles::Username).text().null())
                    .col(ColumnDef::new(EmailProfiles::EncryptedPassword).binary().null())
                    .col(ColumnDef::new(EmailProfiles::EncryptedApiKey).binary().null())
                    .col(ColumnDef::new(EmailProfiles::Oauth2ClientId).text().null())
                    .col(
                        ColumnDef::new(EmailProfiles::EncryptedOauth2ClientSecret)
                            .binary()
                            .null(),
                    )
                    .col(ColumnDef::new(EmailProfiles::FromAddress).text().not_null())
                    .col(ColumnDef::new(EmailProfiles::FromName).text().null())
                    .col(
                        ColumnDef::new(EmailProfiles::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(tenant_index("idx_email_profiles_tenant", EmailProfiles::Table))
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_email_profiles_default")
                    .table(EmailProfiles::Table)
                    .col(Envelope::OrganizationId)
                    .col(EmailProfiles::IsDefault)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(DedicatedLanes::Table)
                    .col(ColumnDef::new(DedicatedLanes::Name).text().not_null())
                    .col(ColumnDef::new(DedicatedLanes::Status).text().not_null())
                    .col(ColumnDef::new(DedicatedLanes::CustomerId).string().not_null())
                    .col(
                        ColumnDef::new(DedicatedLanes::OriginLocationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DedicatedLanes::DestinationLocationId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DedicatedLanes::TractorTypeId).string().null())
                    .col(ColumnDef::new(DedicatedLanes::TrailerTypeId).string().null())
                    .col(ColumnDef::new(DedicatedLanes::PrimaryWorkerId).string().null())
                    .col(ColumnDef::new(DedicatedLanes::SecondaryWorkerId).string().null())
                    .col(
                        ColumnDef::new(DedicatedLanes::AutoAssign)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_dedicated_lanes_match")
                    .table(DedicatedLanes::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(DedicatedLanes::CustomerId)
                    .col(DedicatedLanes::OriginLocationId)
                    .col(DedicatedLanes::DestinationLocationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(Notifications::Table)
                    .col(ColumnDef::new(Notifications::TargetUserId).string().null())
                    .col(ColumnDef::new(Notifications::EventType).text().not_null())
                    .col(ColumnDef::new(Notifications::Priority).text().not_null())
                    .col(ColumnDef::new(Notifications::Title).text().not_null())
                    .col(ColumnDef::new(Notifications::Message).text().not_null())
                    .col(ColumnDef::new(Notifications::Status).text().not_null())
                    .col(ColumnDef::new(Notifications::ReadAt).big_integer().null())
                    .col(ColumnDef::new(Notifications::ExpiresAt).big_integer().null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_target")
                    .table(Notifications::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(Notifications::TargetUserId)
                    .col(Notifications::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(Documents::Table)
                    .col(ColumnDef::new(Documents::ResourceId).string().not_null())
                    .col(ColumnDef::new(Documents::ResourceType).text().not_null())
                    .col(ColumnDef::new(Documents::FileName).text().not_null())
                    .col(ColumnDef::new(Documents::FileType).text().not_null())
                    .col(ColumnDef::new(Documents::FileSize).big_integer().not_null())
                    .col(ColumnDef::new(Documents::Status).text().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_documents_resource")
                    .table(Documents::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(Documents::ResourceId)
                    .col(Documents::ResourceType)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Documents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DedicatedLanes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailProfiles {
    Table,
    Name,
    Status,
    ProviderType,
    AuthType,
    Host,
    Port,
    Username,
    EncryptedPassword,
    EncryptedApiKey,
    Oauth2ClientId,
    EncryptedOauth2ClientSecret,
    FromAddress,
    FromName,
    IsDefault,
}

#[derive(DeriveIden)]
enum DedicatedLanes {
    Table,
    Name,
    Status,
    CustomerId,
    OriginLocationId,
    DestinationLocationId,
    TractorTypeId,
    TrailerTypeId,
    PrimaryWorkerId,
    SecondaryWorkerId,
    AutoAssign,
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    TargetUserId,
    EventType,
    Priority,
    Title,
    Message,
    Status,
    ReadAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    ResourceId,
    ResourceType,
    FileName,
    FileType,
    FileSize,
    Status,
}
