//! Auth service: login records and credential checks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::messages::{
    AskForAuthServiceStatus, AuthUserCreated, CreateAuthUser, CredentialsWereValidated,
    SendAuthServiceStatus, ValidateCredentials,
};
use common::{CorrelationId, ServiceName, validate};
use transport::{EndpointHandle, Handler, HandlerError, RequestClient, serve};

use crate::credentials::CredentialHasher;
use crate::entities::AuthUser;
use crate::health::{check_status, record_write};
use crate::store::EntityStore;
use crate::token::TokenIssuer;
use crate::{ResponderError, Result};

/// Clients for every request type the Auth service answers.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub create_user: RequestClient<CreateAuthUser, AuthUserCreated>,
    pub validate_credentials: RequestClient<ValidateCredentials, CredentialsWereValidated>,
    pub status: RequestClient<AskForAuthServiceStatus, SendAuthServiceStatus>,
}

pub struct AuthResponder<S, H, T> {
    users: S,
    hasher: H,
    tokens: T,
}

impl<S, H, T> AuthResponder<S, H, T>
where
    S: EntityStore<AuthUser> + 'static,
    H: CredentialHasher,
    T: TokenIssuer,
{
    pub fn new(users: S, hasher: H, tokens: T) -> Self {
        Self {
            users,
            hasher,
            tokens,
        }
    }

    pub fn users(&self) -> &S {
        &self.users
    }

    /// Mounts the responder on the transport, one endpoint per request type.
    pub fn serve(self: Arc<Self>) -> (AuthEndpoints, Vec<EndpointHandle>) {
        let (create_user, h1) = serve::<CreateAuthUser, _>("auth.create_user", Arc::clone(&self));
        let (validate_credentials, h2) =
            serve::<ValidateCredentials, _>("auth.validate_credentials", Arc::clone(&self));
        let (status, h3) = serve::<AskForAuthServiceStatus, _>("auth.status", self);

        (
            AuthEndpoints {
                create_user,
                validate_credentials,
                status,
            },
            vec![h1, h2, h3],
        )
    }

    /// Stores the login for an aggregate. Redelivery confirms the stored row.
    #[tracing::instrument(
        skip(self, command),
        fields(correlation_id = %command.correlation_id, aggregate_id = %command.aggregate_id)
    )]
    pub async fn create_user(&self, command: CreateAuthUser) -> Result<AuthUserCreated> {
        validate::require_email(&command.email).map_err(ResponderError::Rejected)?;
        if command.password.is_empty() {
            return Err(ResponderError::Rejected(
                "password must not be empty".to_string(),
            ));
        }

        let salt = self.hasher.generate_salt();
        let user = AuthUser {
            aggregate_id: command.aggregate_id,
            email: validate::normalize_email(&command.email),
            password_hash: self.hasher.hash(&command.password, &salt),
            salt,
            created_at: Utc::now(),
        };

        let inserted = self.users.insert_if_absent(user).await?;
        record_write(ServiceName::Auth, "AuthUser", &inserted);

        Ok(AuthUserCreated {
            correlation_id: command.correlation_id,
        })
    }

    /// Checks a login. A miss is an unauthenticated answer, not an error.
    #[tracing::instrument(skip(self, command), fields(correlation_id = %command.correlation_id))]
    pub async fn validate_credentials(
        &self,
        command: ValidateCredentials,
    ) -> Result<CredentialsWereValidated> {
        let denied = CredentialsWereValidated {
            correlation_id: command.correlation_id,
            token: String::new(),
            is_authenticated: false,
        };

        let username = validate::normalize_email(&command.username);
        let Some(user) = self.users.find_by_unique("email", &username).await?
        else {
            tracing::info!("unknown user");
            return Ok(denied);
        };

        if !self
            .hasher
            .verify(&command.password, &user.salt, &user.password_hash)
        {
            tracing::info!(aggregate_id = %user.aggregate_id, "wrong password");
            return Ok(denied);
        }

        let token = self.tokens.issue(user.aggregate_id).map_err(|e| {
            ResponderError::Unavailable(format!("token issuance failed: {e}"))
        })?;

        Ok(CredentialsWereValidated {
            correlation_id: command.correlation_id,
            token,
            is_authenticated: true,
        })
    }

    pub async fn status(&self, correlation_id: CorrelationId) -> SendAuthServiceStatus {
        SendAuthServiceStatus {
            correlation_id,
            status: check_status(ServiceName::Auth, self.users.ping()).await,
        }
    }
}

#[async_trait]
impl<S, H, T> Handler<CreateAuthUser> for AuthResponder<S, H, T>
where
    S: EntityStore<AuthUser> + 'static,
    H: CredentialHasher,
    T: TokenIssuer,
{
    type Response = AuthUserCreated;

    async fn handle(&self, message: CreateAuthUser) -> std::result::Result<AuthUserCreated, HandlerError> {
        Ok(self.create_user(message).await?)
    }
}

#[async_trait]
impl<S, H, T> Handler<ValidateCredentials> for AuthResponder<S, H, T>
where
    S: EntityStore<AuthUser> + 'static,
    H: CredentialHasher,
    T: TokenIssuer,
{
    type Response = CredentialsWereValidated;

    async fn handle(
        &self,
        message: ValidateCredentials,
    ) -> std::result::Result<CredentialsWereValidated, HandlerError> {
        Ok(self.validate_credentials(message).await?)
    }
}

#[async_trait]
impl<S, H, T> Handler<AskForAuthServiceStatus> for AuthResponder<S, H, T>
where
    S: EntityStore<AuthUser> + 'static,
    H: CredentialHasher,
    T: TokenIssuer,
{
    type Response = SendAuthServiceStatus;

    async fn handle(
        &self,
        message: AskForAuthServiceStatus,
    ) -> std::result::Result<SendAuthServiceStatus, HandlerError> {
        Ok(self.status(message.correlation_id).await)
    }
}
