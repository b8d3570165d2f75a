//! Email profile entity model
//!
//! Credentials are stored as ciphertext produced by the configured
//! [`EncryptionService`](crate::crypto::EncryptionService). At most one
//! profile per organization has `is_default` set.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pulid::Pulid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Pulid,
    pub organization_id: Pulid,
    pub business_unit_id: Pulid,

    pub name: String,
    pub status: EmailProfileStatus,
    pub provider_type: ProviderType,
    pub auth_type: AuthType,
    pub host: Option<String>,
    pub port: Option<i32>,
    pub username: Option<String>,
    #[serde(skip)]
    pub encrypted_password: Option<Vec<u8>>,
    #[serde(skip)]
    pub encrypted_api_key: Option<Vec<u8>>,
    pub oauth2_client_id: Option<String>,
    #[serde(skip)]
    pub encrypted_oauth2_client_secret: Option<Vec<u8>>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub is_default: bool,

    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum EmailProfileStatus {
    #[sea_orm(string_value = "Active")]
    #[default]
    Active,
    #[sea_orm(string_value = "Inactive")]
    Inactive,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ProviderType {
    #[sea_orm(string_value = "SMTP")]
    #[default]
    Smtp,
    #[sea_orm(string_value = "SendGrid")]
    SendGrid,
    #[sea_orm(string_value = "AWSSES")]
    AwsSes,
    #[sea_orm(string_value = "Mailgun")]
    Mailgun,
    #[sea_orm(string_value = "Postmark")]
    Postmark,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum AuthType {
    #[sea_orm(string_value = "Plain")]
    #[default]
    Plain,
    #[sea_orm(string_value = "Login")]
    Login,
    #[sea_orm(string_value = "CRAMMD5")]
    CramMd5,
    #[sea_orm(string_value = "OAuth2")]
    OAuth2,
    #[sea_orm(string_value = "APIKey")]
    ApiKey,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

crate::impl_record!("EmailProfile", "ep_");
