//! User registration and lookup. Credentials belong to the identity layer.

use common::{NewUser, User, UserId};
use store::{ShopStore, StoreError};

use crate::error::{DomainError, Result};

/// Service for registered users.
#[derive(Clone)]
pub struct UserService<S: ShopStore> {
    store: S,
}

impl<S: ShopStore> UserService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a user. Nickname and e-mail must be unique.
    #[tracing::instrument(skip(self, new), fields(nickname = %new.nickname))]
    pub async fn register_user(&self, new: NewUser) -> Result<User> {
        let nickname = new.nickname.trim();
        let email = new.email.trim();
        if nickname.is_empty() {
            return Err(DomainError::validation("nickname must not be blank"));
        }
        if !email.contains('@') {
            return Err(DomainError::validation(format!(
                "invalid e-mail address: {email}"
            )));
        }

        let user = User {
            id: UserId::new(),
            nickname: nickname.to_string(),
            email: email.to_string(),
            role: new.role,
            address: new.address,
            avatar_url: new.avatar_url,
        };

        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict { constraint }) => {
                let reason = if constraint.contains("email") {
                    format!("e-mail already registered: {}", user.email)
                } else {
                    format!("nickname already taken: {}", user.nickname)
                };
                return Err(DomainError::Validation(reason));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Loads a user by ID.
    pub async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))
    }
}
