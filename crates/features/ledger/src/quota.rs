use crate::error::LedgerError;
use ndisk_database::{Reader, Transaction};
use ndisk_domain::User;
use tracing::{debug, instrument};

/// Current and maximum volume of an account, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub now: u64,
    pub total: u64,
}

impl Usage {
    #[must_use]
    pub const fn available(&self) -> u64 {
        self.total.saturating_sub(self.now)
    }
}

impl From<&User> for Usage {
    fn from(user: &User) -> Self {
        Self { now: user.now_volume, total: user.total_volume }
    }
}

/// Per-user volume accounting. The only writer of `now_volume`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaLedger;

impl QuotaLedger {
    pub async fn get_usage(&self, reader: &impl Reader, user_id: &str) -> Result<Usage, LedgerError> {
        reader
            .user(user_id)
            .await?
            .map(|user| Usage::from(&user))
            .ok_or_else(|| LedgerError::not_found("user", user_id))
    }

    /// Moves `now_volume` by `delta` bytes under the user row lock.
    ///
    /// The delta is counted once: `projected = now_volume + delta` must stay within
    /// `0..=total_volume`.
    ///
    /// # Errors
    /// [`LedgerError::QuotaExceeded`] above the total, [`LedgerError::InvariantViolation`]
    /// below zero, [`LedgerError::NotFound`] for an unknown user. Nothing is written on error.
    #[instrument(skip(self, tx), fields(tx = tx.id()))]
    pub async fn reserve_delta(
        &self,
        tx: &mut Transaction,
        user_id: &str,
        delta: i64,
    ) -> Result<Usage, LedgerError> {
        let mut user =
            tx.lock_user(user_id).await?.ok_or_else(|| LedgerError::not_found("user", user_id))?;

        let projected = i128::from(user.now_volume) + i128::from(delta);
        if projected < 0 {
            return Err(LedgerError::invariant(format!(
                "volume of user {user_id} cannot drop below zero ({} {delta:+})",
                user.now_volume
            )));
        }
        if projected > i128::from(user.total_volume) {
            return Err(LedgerError::QuotaExceeded {
                message: format!(
                    "user {user_id} needs {projected} bytes of {}",
                    user.total_volume
                )
                .into(),
                context: None,
            });
        }

        user.now_volume = u64::try_from(projected).map_err(|e| LedgerError::invariant(e.to_string()))?;
        let usage = Usage::from(&user);
        tx.update_user(user).await?;
        debug!(now = usage.now, total = usage.total, "Volume reserved");
        Ok(usage)
    }

    /// The account registered under `email`.
    pub async fn find_by_email(&self, reader: &impl Reader, email: &str) -> Result<User, LedgerError> {
        reader.user_by_email(email).await?.ok_or_else(|| LedgerError::not_found("user with email", email))
    }

    /// Opens a storage account with an empty volume.
    ///
    /// # Errors
    /// [`LedgerError::Conflict`] if the account exists or its email is registered to
    /// another account.
    #[instrument(skip(self, tx, email), fields(tx = tx.id()))]
    pub async fn open_account(
        &self,
        tx: &mut Transaction,
        user_id: &str,
        email: &str,
        total_volume: u64,
    ) -> Result<User, LedgerError> {
        if tx.lock_user(user_id).await?.is_some() {
            return Err(LedgerError::Conflict {
                message: format!("user {user_id} already exists").into(),
                context: None,
            });
        }
        if let Some(owner) = tx.user_by_email(email).await? {
            return Err(LedgerError::Conflict {
                message: format!("email is registered to user {}", owner.id).into(),
                context: None,
            });
        }
        let user = User {
            id: user_id.to_owned(),
            email: email.to_owned(),
            now_volume: 0,
            total_volume,
        };
        tx.insert_user(user.clone()).await?;
        Ok(user)
    }
}
