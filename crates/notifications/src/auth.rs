//! Interface to the external authentication collaborator.

use parking_lot::RwLock;

/// The signed-in user, as far as notifications care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
}

/// Supplies the bearer credential and the authenticated-user signal.
///
/// Queried on every connection attempt, so token refreshes are picked up by the
/// next reconnect.
pub trait CredentialProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn token(&self) -> Option<String>;

    fn user(&self) -> Option<AuthenticatedUser> {
        None
    }
}

/// Credentials held in memory, replaceable at runtime.
#[derive(Debug, Default)]
pub struct SessionCredentials {
    token: RwLock<Option<String>>,
    user: RwLock<Option<AuthenticatedUser>>,
}

impl SessionCredentials {
    pub fn new(token: impl Into<String>, user: Option<AuthenticatedUser>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            user: RwLock::new(user),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Forget the credential; subsequent checks report unauthenticated.
    pub fn logout(&self) {
        *self.token.write() = None;
        *self.user.write() = None;
    }
}

impl CredentialProvider for SessionCredentials {
    fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn user(&self) -> Option<AuthenticatedUser> {
        self.user.read().clone()
    }
}
