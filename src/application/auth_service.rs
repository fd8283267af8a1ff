use anyhow::anyhow;
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::repository::UserRepository;
use crate::domain::user::{AuthError, AuthToken, NewUser, RegisterUser, UpdateProfile, User, UserId};

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 72;

#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    async fn register(&self, input: RegisterUser) -> Result<User, AuthError>;
    async fn issue_token(&self, email: &str, password: &str) -> Result<AuthToken, AuthError>;
    /// Resolves a bearer token key to its user, rejecting unknown keys,
    /// keys older than the TTL, and inactive users.
    async fn authenticate(&self, key: &str) -> Result<User, AuthError>;
    async fn get_user(&self, id: UserId) -> Result<User, AuthError>;
    async fn update_profile(&self, id: UserId, input: UpdateProfile) -> Result<User, AuthError>;
}

#[derive(Clone)]
pub struct AuthServiceImpl<R: UserRepository> {
    repo: R,
    token_ttl: Duration,
}

impl<R: UserRepository> AuthServiceImpl<R> {
    pub fn new(repo: R, token_ttl: Duration) -> Self {
        Self { repo, token_ttl }
    }

    fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(anyhow!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Internal(anyhow!("stored hash unreadable: {e}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    }
}

#[async_trait]
impl<R: UserRepository> AuthService for AuthServiceImpl<R> {
    async fn register(&self, input: RegisterUser) -> Result<User, AuthError> {
        if self.repo.find_user_by_email(&input.email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        let user = self
            .repo
            .create_user(NewUser {
                email: input.email,
                password_hash: Self::hash_password(&input.password)?,
                first_name: input.first_name,
                last_name: input.last_name,
            })
            .await?;
        tracing::info!(user = user.id.0, "registered user");
        Ok(user)
    }

    async fn issue_token(&self, email: &str, password: &str) -> Result<AuthToken, AuthError> {
        let user = self
            .repo
            .find_user_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        Self::verify_password(password, &user.password_hash)?;
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }
        let token = AuthToken {
            key: Uuid::new_v4().simple().to_string(),
            user: user.id,
            created: Utc::now(),
        };
        self.repo.insert_token(&token).await?;
        Ok(token)
    }

    async fn authenticate(&self, key: &str) -> Result<User, AuthError> {
        let token = self
            .repo
            .find_token(key)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if token.created < Utc::now() - self.token_ttl {
            return Err(AuthError::ExpiredToken);
        }
        let user = self
            .repo
            .find_user(token.user)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<User, AuthError> {
        self.repo
            .find_user(id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    async fn update_profile(&self, id: UserId, input: UpdateProfile) -> Result<User, AuthError> {
        let mut user = self.get_user(id).await?;
        if let Some(first_name) = input.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = input.last_name {
            user.last_name = last_name;
        }
        if let Some(password) = input.password {
            user.password_hash = Self::hash_password(&password)?;
        }
        self.repo.update_user(&user).await?;
        Ok(user)
    }
}
