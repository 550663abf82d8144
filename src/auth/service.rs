use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;
use super::crypto::{EmailCipher, PasswordHasher};
use super::models::{Role, UserCreate, UserRecord, UserResponse};
use super::store::UserTable;
use super::tokens::{Claims, IssuedToken, JwtHandler};
use crate::config::{BootstrapAdmin, Config};

/// Everything the session layer needs: the credential table plus the
/// primitives that protect its rows and sign tokens.
#[derive(Debug)]
pub struct AuthService {
    users: UserTable,
    passwords: PasswordHasher,
    emails: EmailCipher,
    tokens: JwtHandler,
    cookie_secure: bool,
    /// Verified against on unknown usernames so every login pays one hash
    decoy_hash: String,
}

impl AuthService {
    pub fn new(
        users: UserTable,
        passwords: PasswordHasher,
        emails: EmailCipher,
        tokens: JwtHandler,
        cookie_secure: bool,
    ) -> Self {
        let decoy_hash = passwords.hash("");
        Self {
            users,
            passwords,
            emails,
            tokens,
            cookie_secure,
            decoy_hash,
        }
    }

    /// Build the service from configuration, opening the persisted credential table
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        Ok(Self::new(
            UserTable::open(config.users_table_path())?,
            PasswordHasher::default(),
            EmailCipher::new(&config.encryption_key),
            JwtHandler::new(&config.jwt_secret, &config.jwt_algorithm)?,
            config.cookie_secure,
        ))
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    pub fn create_user(&self, user: UserCreate) -> Result<UserResponse, AuthError> {
        let username = user.username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidInput("Username cannot be empty".to_string()));
        }
        if user.password.is_empty() {
            return Err(AuthError::InvalidInput("Password cannot be empty".to_string()));
        }
        if !is_plausible_email(&user.email) {
            return Err(AuthError::InvalidInput(format!("Invalid email address: {}", user.email)));
        }

        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            encrypted_email: self.emails.encrypt(&user.email)?,
            encrypted_password: self.passwords.hash(&user.password),
            role: user.role,
            created_at: Utc::now().to_rfc3339(),
            is_active: true,
            last_login: None,
        };
        let response = UserResponse {
            id: record.id.clone(),
            username: record.username.clone(),
            email: user.email,
            role: record.role,
            last_login: None,
        };

        self.users.insert_new(record)?;
        info!("Created user {} with role {}", response.username, response.role);
        Ok(response)
    }

    /// Check a username/password pair and stamp the login time.
    /// Runs the full key derivation; call it off the async workers.
    pub fn authenticate_user(&self, username: &str, password: &str) -> Result<UserResponse, AuthError> {
        let Some(record) = self.users.get(username) else {
            self.passwords.verify(password, &self.decoy_hash);
            return Err(AuthError::InvalidCredentials);
        };
        if !record.is_active {
            warn!("Login attempt for deactivated user {}", username);
            return Err(AuthError::Inactive);
        }
        if !self.passwords.verify(password, &record.encrypted_password) {
            return Err(AuthError::InvalidCredentials);
        }

        let last_login = Utc::now().to_rfc3339();
        self.users.set_last_login(username, &last_login)?;

        let mut user = self.to_response(&record)?;
        user.last_login = Some(last_login);
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<UserResponse, AuthError> {
        let record = self.users.get(username).ok_or(AuthError::UserNotFound)?;
        self.to_response(&record)
    }

    pub fn issue_token(&self, user: &UserResponse) -> Result<IssuedToken, AuthError> {
        self.tokens.issue(user, Utc::now())
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.verify(token)
    }

    /// Create the configured admin account unless the username is taken.
    /// Returns whether an account was created.
    pub fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> Result<bool, AuthError> {
        if self.users.get(&admin.username).is_some() {
            return Ok(false);
        }

        let created = self.create_user(UserCreate {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password: admin.password.clone(),
            role: Role::Admin,
        });

        match created {
            Ok(_) => Ok(true),
            Err(AuthError::AlreadyExists) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn to_response(&self, record: &UserRecord) -> Result<UserResponse, AuthError> {
        Ok(UserResponse {
            id: record.id.clone(),
            username: record.username.clone(),
            email: self.emails.decrypt(&record.encrypted_email)?,
            role: record.role,
            last_login: record.last_login.clone(),
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap service for tests: in-memory table, few hashing rounds
    pub(crate) fn service() -> AuthService {
        AuthService::new(
            UserTable::in_memory(),
            PasswordHasher::with_rounds(10),
            EmailCipher::new("test-key"),
            JwtHandler::new("test-secret", "HS256").unwrap(),
            false,
        )
    }

    fn new_user(username: &str, role: Role) -> UserCreate {
        UserCreate {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "correct horse".to_string(),
            role,
        }
    }

    #[test]
    fn test_create_then_authenticate() {
        let auth = service();
        let created = auth.create_user(new_user("ana", Role::User)).unwrap();
        assert!(created.last_login.is_none());

        let user = auth.authenticate_user("ana", "correct horse").unwrap();
        assert_eq!(user.id, created.id);
        assert_eq!(user.email, "ana@example.com");
        assert!(user.last_login.is_some());

        let fetched = auth.get_user_by_username("ana").unwrap();
        assert_eq!(fetched.last_login, user.last_login);
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let auth = service();
        auth.create_user(new_user("ana", Role::User)).unwrap();

        assert!(matches!(
            auth.create_user(new_user("ana", Role::Admin)),
            Err(AuthError::AlreadyExists)
        ));
    }

    #[test]
    fn test_bad_credentials() {
        let auth = service();
        auth.create_user(new_user("ana", Role::User)).unwrap();

        assert!(matches!(auth.authenticate_user("ana", "wrong"), Err(AuthError::InvalidCredentials)));
        assert!(matches!(auth.authenticate_user("bob", "x"), Err(AuthError::InvalidCredentials)));
        assert!(matches!(auth.get_user_by_username("bob"), Err(AuthError::UserNotFound)));
    }

    #[test]
    fn test_unknown_user_pays_for_a_hash() {
        let auth = service();

        assert!(auth.passwords.verify("", &auth.decoy_hash));
        assert!(matches!(
            auth.authenticate_user("ghost", ""),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_invalid_email_rejected() {
        let auth = service();
        let user = UserCreate {
            email: "not-an-email".to_string(),
            ..new_user("ana", Role::User)
        };
        assert!(matches!(auth.create_user(user), Err(AuthError::InvalidInput(_))));
    }

    #[test]
    fn test_bootstrap_admin_is_idempotent() {
        let auth = service();
        let admin = BootstrapAdmin {
            username: "root".to_string(),
            password: "s3cret".to_string(),
            email: "root@example.com".to_string(),
        };

        assert!(auth.bootstrap_admin(&admin).unwrap());
        assert!(!auth.bootstrap_admin(&admin).unwrap());
        assert_eq!(auth.get_user_by_username("root").unwrap().role, Role::Admin);
    }

    #[test]
    fn test_token_carries_identity() {
        let auth = service();
        let user = auth.create_user(new_user("wall", Role::Monitor)).unwrap();
        let issued = auth.issue_token(&user).unwrap();

        let claims = auth.verify_token(&issued.token).unwrap();
        assert_eq!(claims.sub, "wall");
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::Monitor);
    }
}
