//! # Email Profile Repository
//!
//! Outbound mail settings. Credentials are encrypted with the injected
//! [`EncryptionService`] before they reach the database and the plaintext is
//! zeroized right after. At most one profile per organization is the default.

use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use zeroize::Zeroize;

use crate::crypto::{Credentials, EncryptionService};
use crate::db::DbConnections;
use crate::error::{OperationExt, RepositoryError};
use crate::models::email_profile::{self, EmailProfileStatus, Entity as EmailProfile};
use crate::optimistic::{UpdateMode, update_with_version};
use crate::pulid::Pulid;
use crate::query::{
    BOOL_OPS, ENUM_OPS, FieldConfig, FieldKind, FieldSpec, ListRequest, ListResult, SearchConfig,
    TEXT_OPS, TIMESTAMP_OPS, TenantInfo,
};
use crate::record::{Record, now_unix};

use super::{find_in_tenant, insert_new, list_with_config, tenant_condition, unique_on};

/// Reported when a concurrent writer claimed the default slot first.
const DEFAULT_TAKEN: &str = "Another email profile is already the default for this organization";

pub static EMAIL_PROFILE_FIELDS: FieldConfig = FieldConfig {
    fields: &[
        FieldSpec {
            api_name: "name",
            column: "name",
            kind: FieldKind::Text,
            ops: TEXT_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "status",
            column: "status",
            kind: FieldKind::Enum,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "providerType",
            column: "provider_type",
            kind: FieldKind::Enum,
            ops: ENUM_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "isDefault",
            column: "is_default",
            kind: FieldKind::Boolean,
            ops: BOOL_OPS,
            sortable: true,
        },
        FieldSpec {
            api_name: "createdAt",
            column: "created_at",
            kind: FieldKind::Timestamp,
            ops: TIMESTAMP_OPS,
            sortable: true,
        },
    ],
    search: SearchConfig {
        vector_column: None,
        columns: &["name", "from_address"],
    },
};

/// A profile with plaintext credentials to store.
///
/// On update a `None` credential keeps the stored ciphertext.
#[derive(Debug, Clone)]
pub struct EmailProfileInput {
    pub profile: email_profile::Model,
    pub credentials: Credentials,
}

/// A stored profile with its password and API key decrypted. The OAuth2
/// client secret stays encrypted on the model until it is used.
#[derive(Debug, Clone)]
pub struct EmailProfileDetails {
    pub profile: email_profile::Model,
    pub credentials: Credentials,
}

/// Repository for email profile database operations
#[derive(Clone)]
pub struct EmailProfileRepository {
    db: Arc<DbConnections>,
    encryption: Arc<dyn EncryptionService>,
}

impl EmailProfileRepository {
    pub fn new(db: Arc<DbConnections>, encryption: Arc<dyn EncryptionService>) -> Self {
        Self { db, encryption }
    }

    /// Lists profiles without decrypting anything.
    pub async fn list(
        &self,
        req: &ListRequest,
    ) -> Result<ListResult<email_profile::Model>, RepositoryError> {
        list_with_config::<EmailProfile>(&self.db, &EMAIL_PROFILE_FIELDS, req)
            .await
            .with_op("email_profile.list")
    }

    pub async fn get_by_id(
        &self,
        id: &Pulid,
        tenant: &TenantInfo,
    ) -> Result<EmailProfileDetails, RepositoryError> {
        let profile = self
            .db
            .with_read(|conn| {
                let (id, tenant) = (id.clone(), tenant.clone());
                async move { find_in_tenant::<email_profile::Model, _>(&conn, &id, &tenant).await }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::not_found(email_profile::Model::RESOURCE, id))
            })
            .with_op("email_profile.get_by_id")?;

        self.decrypt(profile).with_op("email_profile.get_by_id")
    }

    /// The tenant's active default profile.
    pub async fn get_default(
        &self,
        tenant: &TenantInfo,
    ) -> Result<EmailProfileDetails, RepositoryError> {
        let profile = self
            .db
            .with_read(|conn| {
                let tenant = tenant.clone();
                async move {
                    EmailProfile::find()
                        .filter(tenant_condition::<email_profile::Model>(&tenant))
                        .filter(email_profile::Column::IsDefault.eq(true))
                        .filter(email_profile::Column::Status.eq(EmailProfileStatus::Active))
                        .order_by_desc(email_profile::Column::UpdatedAt)
                        .one(&conn)
                        .await
                }
            })
            .await
            .map_err(RepositoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| RepositoryError::NotFound {
                    resource: email_profile::Model::RESOURCE,
                    message: "No default email profile is configured".to_string(),
                })
            })
            .with_op("email_profile.get_default")?;

        self.decrypt(profile).with_op("email_profile.get_default")
    }

    pub async fn create(
        &self,
        tenant: &TenantInfo,
        mut input: EmailProfileInput,
    ) -> Result<email_profile::Model, RepositoryError> {
        self.seal(&mut input).with_op("email_profile.create")?;
        let mut profile = input.profile.clone();
        if profile.id.is_nil() {
            profile.id = Pulid::new(email_profile::Model::ID_PREFIX);
        }

        let txn = self.db.write().begin().await.with_op("email_profile.create")?;
        if profile.is_default {
            clear_other_defaults(&txn, &tenant.org_id, &profile.id)
                .await
                .with_op("email_profile.create")?;
        }
        let is_default = profile.is_default;
        let profile = insert_new(&txn, profile, tenant)
            .await
            .map_err(|err| {
                if is_default {
                    RepositoryError::from_db_with_field(err, "isDefault", DEFAULT_TAKEN)
                } else {
                    RepositoryError::from(err)
                }
            })
            .with_op("email_profile.create")?;
        txn.commit().await.with_op("email_profile.create")?;

        tracing::info!(
            id = %profile.id,
            org_id = %tenant.org_id,
            is_default = profile.is_default,
            "Created email profile"
        );
        Ok(profile)
    }

    pub async fn update(
        &self,
        tenant: &TenantInfo,
        mut input: EmailProfileInput,
    ) -> Result<email_profile::Model, RepositoryError> {
        self.seal(&mut input).with_op("email_profile.update")?;
        let mut profile = input.profile.clone();
        profile.set_tenant(&tenant.org_id, &tenant.bu_id);

        let txn = self.db.write().begin().await.with_op("email_profile.update")?;
        if profile.is_default {
            clear_other_defaults(&txn, &tenant.org_id, &profile.id)
                .await
                .with_op("email_profile.update")?;
        }
        update_with_version(&txn, &mut profile, UpdateMode::Full)
            .await
            .map_err(unique_on("isDefault", DEFAULT_TAKEN))
            .with_op("email_profile.update")?;
        txn.commit().await.with_op("email_profile.update")?;
        Ok(profile)
    }

    /// Moves plaintext credentials into the ciphertext columns and wipes them.
    fn seal(&self, input: &mut EmailProfileInput) -> Result<(), RepositoryError> {
        let credentials = &input.credentials;
        let profile = &mut input.profile;

        if let Some(password) = credentials.password.as_deref() {
            profile.encrypted_password = Some(self.encryption.encrypt_str(password)?);
        }
        if let Some(api_key) = credentials.api_key.as_deref() {
            profile.encrypted_api_key = Some(self.encryption.encrypt_str(api_key)?);
        }
        if let Some(secret) = credentials.oauth2_client_secret.as_deref() {
            profile.encrypted_oauth2_client_secret = Some(self.encryption.encrypt_str(secret)?);
        }

        input.credentials.zeroize();
        Ok(())
    }

    fn decrypt(
        &self,
        profile: email_profile::Model,
    ) -> Result<EmailProfileDetails, RepositoryError> {
        let password = profile
            .encrypted_password
            .as_deref()
            .map(|bytes| self.encryption.decrypt_string(bytes))
            .transpose()?;
        let api_key = profile
            .encrypted_api_key
            .as_deref()
            .map(|bytes| self.encryption.decrypt_string(bytes))
            .transpose()?;

        Ok(EmailProfileDetails {
            profile,
            credentials: Credentials {
                password,
                api_key,
                oauth2_client_secret: None,
            },
        })
    }
}

/// Clears `is_default` on every other profile of the organization.
async fn clear_other_defaults<C: ConnectionTrait>(
    conn: &C,
    org_id: &Pulid,
    keep_id: &Pulid,
) -> Result<u64, RepositoryError> {
    let result = EmailProfile::update_many()
        .col_expr(email_profile::Column::IsDefault, Expr::value(false))
        .col_expr(
            email_profile::Column::Version,
            Expr::col(email_profile::Column::Version).add(1),
        )
        .col_expr(email_profile::Column::UpdatedAt, Expr::value(now_unix()))
        .filter(email_profile::Column::OrganizationId.eq(org_id.clone()))
        .filter(email_profile::Column::IsDefault.eq(true))
        .filter(email_profile::Column::Id.ne(keep_id.clone()))
        .exec(conn)
        .await?;

    if result.rows_affected > 0 {
        tracing::debug!(
            org_id = %org_id,
            cleared = result.rows_affected,
            "Cleared previous default email profile"
        );
    }
    Ok(result.rows_affected)
}
