use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use argon2::Params;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use authsvc_core::UserId;

use super::*;
use crate::cache::{CacheError, MemoryCache};
use crate::db::MemoryUserStore;
use crate::services::tokens::random_token;

const PASSWORD: &str = "Passw0rd!";

fn ttl() -> TtlPolicy {
    TtlPolicy {
        default: Duration::from_secs(3600),
        remember_me: Duration::from_secs(30 * 24 * 3600),
    }
}

fn hasher() -> PasswordHasher {
    PasswordHasher::with_params(Params::new(1024, 1, 1, None).unwrap())
}

fn email(s: &str) -> Email {
    Email::parse(s).unwrap()
}

struct Harness {
    service: AuthService,
    users: Arc<MemoryUserStore>,
    cache: Arc<MemoryCache>,
    candidates: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let users = Arc::new(MemoryUserStore::new());
        let cache = Arc::new(MemoryCache::new(10_000));
        Self::over(users, cache)
    }

    fn over(users: Arc<MemoryUserStore>, cache: Arc<MemoryCache>) -> Self {
        let candidates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&candidates);
        let tokens = TokenStore::with_generator(
            cache.clone(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                random_token()
            }),
        );

        let service = AuthService::new(
            users.clone(),
            cache.clone(),
            hasher(),
            LastLoginRecorder::sync(users.clone()),
            ttl(),
        )
        .with_token_store(tokens);

        Self {
            service,
            users,
            cache,
            candidates,
        }
    }

    fn minted(&self) -> usize {
        self.candidates.load(Ordering::SeqCst)
    }

    async fn register(&self, addr: &str) -> IssuedToken {
        self.service
            .register(&email(addr), PASSWORD, "10.0.0.1", RememberMe::Off)
            .await
            .unwrap()
    }
}

// =============================================================================
// Registration and login
// =============================================================================

#[tokio::test]
async fn test_register_creates_unverified_user() {
    let h = Harness::new();
    let issued = h.register("a@x.com").await;

    let user = h.users.get_user(&email("a@x.com")).await.unwrap();
    assert!(!user.email_verified);
    assert!(user.has_password());
    assert_eq!(user.ip_created, "10.0.0.1");
    assert_eq!(
        h.service.get_user_email(issued.token.as_str()).await,
        Some(email("a@x.com"))
    );
    assert_eq!(
        h.cache.get("emailVerified:a@x.com").await.unwrap().as_deref(),
        Some("false")
    );
}

#[tokio::test]
async fn test_duplicate_register_mints_no_token() {
    let h = Harness::new();
    h.register("a@x.com").await;
    let before = h.minted();

    let err = h
        .service
        .register(&email("a@x.com"), "0therPass!", "10.0.0.2", RememberMe::On)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::UserExists));
    assert_eq!(h.minted(), before);
}

#[tokio::test]
async fn test_login_with_correct_password() {
    let h = Harness::new();
    h.register("a@x.com").await;

    let issued = h
        .service
        .login(&email("a@x.com"), PASSWORD, "10.0.0.9", RememberMe::Off)
        .await
        .unwrap();

    assert_eq!(
        h.service.get_user_email(issued.token.as_str()).await,
        Some(email("a@x.com"))
    );
    let user = h.users.get_user(&email("a@x.com")).await.unwrap();
    assert_eq!(user.last_login_ip, "10.0.0.9");
}

#[tokio::test]
async fn test_login_with_wrong_password_mints_no_token() {
    let h = Harness::new();
    h.register("a@x.com").await;
    let before = h.minted();

    let err = h
        .service
        .login(&email("a@x.com"), "WrongPass1", "10.0.0.9", RememberMe::Off)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(h.minted(), before);
    // last-login fields untouched
    let user = h.users.get_user(&email("a@x.com")).await.unwrap();
    assert_eq!(user.last_login_ip, "10.0.0.1");
}

#[tokio::test]
async fn test_login_unknown_email_is_invalid_credentials() {
    let h = Harness::new();
    let err = h
        .service
        .login(&email("nobody@x.com"), PASSWORD, "", RememberMe::Off)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_remember_me_ttl_is_longer() {
    let h = Harness::new();
    h.register("a@x.com").await;

    let short = h
        .service
        .login(&email("a@x.com"), PASSWORD, "", RememberMe::Off)
        .await
        .unwrap();
    let long = h
        .service
        .login(&email("a@x.com"), PASSWORD, "", RememberMe::On)
        .await
        .unwrap();

    assert!(long.ttl > short.ttl);
    let short_left = h.service.token_ttl(short.token.as_str()).await.unwrap();
    let long_left = h.service.token_ttl(long.token.as_str()).await.unwrap();
    assert!(long_left > short_left);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let h = Harness::new();
    let issued = h.register("a@x.com").await;

    h.service.logout(issued.token.as_str()).await.unwrap();
    assert_eq!(h.service.get_user_email(issued.token.as_str()).await, None);

    // idempotent, and garbage is ignored
    h.service.logout(issued.token.as_str()).await.unwrap();
    h.service.logout("not-a-token").await.unwrap();
}

#[tokio::test]
async fn test_empty_or_malformed_token_resolves_to_nothing() {
    let h = Harness::new();
    assert_eq!(h.service.get_user_email("").await, None);
    assert_eq!(h.service.get_user_email("short").await, None);
    assert_eq!(h.service.token_ttl("").await, None);
}

#[tokio::test]
async fn test_scenario_register_verify_login() {
    let h = Harness::new();
    h.service
        .register(&email("a@x.com"), "Passw0rd!", "127.0.0.1", RememberMe::Off)
        .await
        .unwrap();
    h.service.email_verify(&email("a@x.com")).await.unwrap();

    let issued = h
        .service
        .login(&email("a@x.com"), "Passw0rd!", "127.0.0.1", RememberMe::from_flag("off"))
        .await
        .unwrap();

    assert_eq!(issued.token.as_str().len(), 32);
    assert!(
        issued
            .token
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_alphanumeric())
    );
    assert_eq!(issued.ttl, ttl().default);
    assert!(h.service.email_verified(&email("a@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_token_generation_failure_surfaces() {
    let users = Arc::new(MemoryUserStore::new());
    let cache = Arc::new(MemoryCache::new(100));
    let fixed = "Z".repeat(SessionToken::LENGTH);
    let service = AuthService::new(
        users.clone(),
        cache.clone(),
        hasher(),
        LastLoginRecorder::sync(users),
        ttl(),
    )
    .with_token_store(TokenStore::with_generator(
        cache,
        Arc::new(move || fixed.clone()),
    ));

    service
        .create_token(&email("a@x.com"), RememberMe::Off)
        .await
        .unwrap();
    let err = service
        .create_token(&email("b@x.com"), RememberMe::Off)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenGenerationFailed));
}

// =============================================================================
// OAuth
// =============================================================================

#[tokio::test]
async fn test_oauth_creates_verified_federated_account() {
    let h = Harness::new();
    let issued = h
        .service
        .oauth(&email("fed@x.com"), "10.1.1.1")
        .await
        .unwrap();

    let user = h.users.get_user(&email("fed@x.com")).await.unwrap();
    assert!(user.email_verified);
    assert!(!user.has_password());
    assert_eq!(issued.ttl, ttl().remember_me);
    assert_eq!(
        h.cache.get("emailVerified:fed@x.com").await.unwrap().as_deref(),
        Some("true")
    );

    // no password can ever log in to a federated-only account
    let err = h
        .service
        .login(&email("fed@x.com"), "", "", RememberMe::Off)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_oauth_on_existing_account_verifies_and_records_login() {
    let h = Harness::new();
    h.register("a@x.com").await;

    h.service.oauth(&email("a@x.com"), "10.2.2.2").await.unwrap();

    let user = h.users.get_user(&email("a@x.com")).await.unwrap();
    assert!(user.email_verified);
    assert!(user.has_password());
    assert_eq!(user.last_login_ip, "10.2.2.2");
    assert!(h.service.email_verified(&email("a@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_oauth_creates_one_account() {
    let h = Harness::new();
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = h.service.clone();
            tokio::spawn(async move { service.oauth(&email("race@x.com"), "").await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(h.users.len().await, 1);
}

// =============================================================================
// Credential changes
// =============================================================================

#[tokio::test]
async fn test_change_password_rotates_session() {
    let h = Harness::new();
    let old = h.register("a@x.com").await;
    let other = h
        .service
        .login(&email("a@x.com"), PASSWORD, "", RememberMe::Off)
        .await
        .unwrap();

    let fresh = h
        .service
        .change_password(&email("a@x.com"), "N3wPassword", "10.3.3.3", old.token.as_str())
        .await
        .unwrap();

    assert_eq!(h.service.get_user_email(old.token.as_str()).await, None);
    assert_eq!(
        h.service.get_user_email(fresh.token.as_str()).await,
        Some(email("a@x.com"))
    );
    // other sessions survive
    assert_eq!(
        h.service.get_user_email(other.token.as_str()).await,
        Some(email("a@x.com"))
    );
    assert_eq!(fresh.ttl, ttl().remember_me);

    assert!(
        h.service
            .login(&email("a@x.com"), PASSWORD, "", RememberMe::Off)
            .await
            .is_err()
    );
    h.service
        .login(&email("a@x.com"), "N3wPassword", "", RememberMe::Off)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_password_unknown_email() {
    let h = Harness::new();
    let err = h
        .service
        .change_password(&email("nobody@x.com"), "N3wPassword", "", "")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_change_email_moves_session_and_clears_cache() {
    let h = Harness::new();
    let old = h.register("old@x.com").await;
    assert!(!h.service.email_verified(&email("old@x.com")).await.unwrap());

    let fresh = h
        .service
        .change_email(&email("old@x.com"), &email("new@x.com"), old.token.as_str())
        .await
        .unwrap();

    assert_eq!(h.service.get_user_email(old.token.as_str()).await, None);
    assert_eq!(
        h.service.get_user_email(fresh.token.as_str()).await,
        Some(email("new@x.com"))
    );
    assert_eq!(h.cache.get("emailVerified:old@x.com").await.unwrap(), None);
    assert!(h.users.get_user(&email("old@x.com")).await.is_err());
    assert!(!h.service.email_verified(&email("new@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_change_email_to_taken_address() {
    let h = Harness::new();
    h.register("a@x.com").await;
    h.register("b@x.com").await;

    let err = h
        .service
        .change_email(&email("a@x.com"), &email("b@x.com"), "")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserExists));
}

#[tokio::test]
async fn test_change_email_unknown_address() {
    let h = Harness::new();
    let err = h
        .service
        .change_email(&email("nobody@x.com"), &email("b@x.com"), "")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

// =============================================================================
// Verification
// =============================================================================

#[tokio::test]
async fn test_verify_then_read_with_cold_cache() {
    let users = Arc::new(MemoryUserStore::new());
    let warm = Harness::over(users.clone(), Arc::new(MemoryCache::new(100)));
    warm.register("a@x.com").await;
    warm.service.email_verify(&email("a@x.com")).await.unwrap();

    let cold = Harness::over(users, Arc::new(MemoryCache::new(100)));
    assert!(cold.service.email_verified(&email("a@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_verify_overwrites_cached_false() {
    let h = Harness::new();
    h.register("a@x.com").await;
    assert!(!h.service.email_verified(&email("a@x.com")).await.unwrap());

    h.service.email_verify(&email("a@x.com")).await.unwrap();
    assert!(h.service.email_verified(&email("a@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_verify_unknown_email() {
    let h = Harness::new();
    assert!(matches!(
        h.service.email_verify(&email("nobody@x.com")).await,
        Err(AuthError::NotFound)
    ));
    assert!(matches!(
        h.service.email_verified(&email("nobody@x.com")).await,
        Err(AuthError::NotFound)
    ));
}

// =============================================================================
// Versioned updates
// =============================================================================

/// Memory store that rejects the first `stale` full-record updates.
struct Contended {
    inner: MemoryUserStore,
    stale: AtomicU32,
}

#[async_trait]
impl UserStore for Contended {
    async fn create_user(
        &self,
        email: &Email,
        ip: &str,
        hash: &[u8],
        verified: bool,
    ) -> Result<User, RepositoryError> {
        self.inner.create_user(email, ip, hash, verified).await
    }
    async fn get_user(&self, email: &Email) -> Result<User, RepositoryError> {
        self.inner.get_user(email).await
    }
    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        if self
            .stale
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RepositoryError::VersionMismatch {
                id: user.id,
                expected: user.version,
            });
        }
        self.inner.update_user(user).await
    }
    async fn record_login(
        &self,
        id: UserId,
        ip: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.inner.record_login(id, ip, at).await
    }
    async fn email_verified(&self, email: &Email) -> Result<bool, RepositoryError> {
        self.inner.email_verified(email).await
    }
    async fn email_verify(&self, email: &Email) -> Result<(), RepositoryError> {
        self.inner.email_verify(email).await
    }
    async fn delete_user(&self, email: &Email) -> Result<bool, RepositoryError> {
        self.inner.delete_user(email).await
    }
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

async fn contended_service(stale: u32) -> AuthService {
    let inner = MemoryUserStore::new();
    inner
        .create_user(&email("a@x.com"), "", b"", false)
        .await
        .unwrap();
    let users = Arc::new(Contended {
        inner,
        stale: AtomicU32::new(stale),
    });
    AuthService::new(
        users.clone(),
        Arc::new(MemoryCache::new(100)),
        hasher(),
        LastLoginRecorder::sync(users),
        ttl(),
    )
}

#[tokio::test]
async fn test_update_retries_after_version_mismatch() {
    let service = contended_service(UPDATE_ATTEMPTS - 1).await;
    service
        .change_password(&email("a@x.com"), "N3wPassword", "", "")
        .await
        .unwrap();
    service
        .login(&email("a@x.com"), "N3wPassword", "", RememberMe::Off)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_gives_up_after_repeated_mismatch() {
    let service = contended_service(UPDATE_ATTEMPTS).await;
    let err = service
        .change_password(&email("a@x.com"), "N3wPassword", "", "")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::Repository(RepositoryError::VersionMismatch { .. })
    ));
}

/// A narrow write another request slips in between a read and its update.
#[derive(Clone, Copy)]
enum NarrowWrite {
    Verify,
    Login,
}

/// Memory store that runs one narrow write right after the first read.
struct Interleaved {
    inner: MemoryUserStore,
    write: NarrowWrite,
    fired: AtomicBool,
}

#[async_trait]
impl UserStore for Interleaved {
    async fn create_user(
        &self,
        email: &Email,
        ip: &str,
        hash: &[u8],
        verified: bool,
    ) -> Result<User, RepositoryError> {
        self.inner.create_user(email, ip, hash, verified).await
    }
    async fn get_user(&self, email: &Email) -> Result<User, RepositoryError> {
        let user = self.inner.get_user(email).await?;
        if !self.fired.swap(true, Ordering::SeqCst) {
            match self.write {
                NarrowWrite::Verify => self.inner.email_verify(email).await?,
                NarrowWrite::Login => {
                    self.inner
                        .record_login(user.id, "192.0.2.9", Utc::now())
                        .await?;
                }
            }
        }
        Ok(user)
    }
    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        self.inner.update_user(user).await
    }
    async fn record_login(
        &self,
        id: UserId,
        ip: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.inner.record_login(id, ip, at).await
    }
    async fn email_verified(&self, email: &Email) -> Result<bool, RepositoryError> {
        self.inner.email_verified(email).await
    }
    async fn email_verify(&self, email: &Email) -> Result<(), RepositoryError> {
        self.inner.email_verify(email).await
    }
    async fn delete_user(&self, email: &Email) -> Result<bool, RepositoryError> {
        self.inner.delete_user(email).await
    }
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

async fn interleaved(write: NarrowWrite) -> (AuthService, Arc<Interleaved>) {
    let inner = MemoryUserStore::new();
    inner
        .create_user(&email("a@x.com"), "10.0.0.1", b"", false)
        .await
        .unwrap();
    let users = Arc::new(Interleaved {
        inner,
        write,
        fired: AtomicBool::new(false),
    });
    let service = AuthService::new(
        users.clone(),
        Arc::new(MemoryCache::new(100)),
        hasher(),
        LastLoginRecorder::sync(users.clone()),
        ttl(),
    );
    (service, users)
}

#[tokio::test]
async fn test_change_password_keeps_concurrent_verification() {
    let (service, users) = interleaved(NarrowWrite::Verify).await;

    service
        .change_password(&email("a@x.com"), "N3wPassword", "10.0.0.2", "")
        .await
        .unwrap();

    assert!(users.inner.email_verified(&email("a@x.com")).await.unwrap());
    assert!(service.email_verified(&email("a@x.com")).await.unwrap());
    service
        .login(&email("a@x.com"), "N3wPassword", "", RememberMe::Off)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_email_keeps_concurrent_verification() {
    let (service, users) = interleaved(NarrowWrite::Verify).await;

    service
        .change_email(&email("a@x.com"), &email("b@x.com"), "")
        .await
        .unwrap();

    assert!(users.inner.email_verified(&email("b@x.com")).await.unwrap());
    assert!(service.email_verified(&email("b@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_change_email_keeps_concurrent_login() {
    let (service, users) = interleaved(NarrowWrite::Login).await;

    service
        .change_email(&email("a@x.com"), &email("b@x.com"), "")
        .await
        .unwrap();

    let user = users.inner.get_user(&email("b@x.com")).await.unwrap();
    assert_eq!(user.last_login_ip, "192.0.2.9");
}

// =============================================================================
// Best-effort cache writes
// =============================================================================

/// Memory cache whose unconditional writes fail. Token minting
/// (`set_if_absent`) and deletes still work.
struct WriteFails {
    inner: MemoryCache,
    set_calls: AtomicUsize,
}

#[async_trait]
impl SessionCache for WriteFails {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }
    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("write refused".into()))
    }
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.inner.set_if_absent(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.inner.ttl(key).await
    }
    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

fn write_fails_service() -> (AuthService, Arc<WriteFails>) {
    let users = Arc::new(MemoryUserStore::new());
    let cache = Arc::new(WriteFails {
        inner: MemoryCache::new(100),
        set_calls: AtomicUsize::new(0),
    });
    let service = AuthService::new(
        users.clone(),
        cache.clone(),
        hasher(),
        LastLoginRecorder::sync(users),
        ttl(),
    );
    (service, cache)
}

#[tokio::test]
async fn test_email_verify_survives_failed_cache_write() {
    let (service, cache) = write_fails_service();
    service
        .register(&email("a@x.com"), PASSWORD, "", RememberMe::Off)
        .await
        .unwrap();
    cache
        .inner
        .set("emailVerified:a@x.com", "false", Duration::from_secs(60))
        .await
        .unwrap();

    service.email_verify(&email("a@x.com")).await.unwrap();

    assert!(cache.set_calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(cache.inner.get("emailVerified:a@x.com").await.unwrap(), None);
    assert!(service.email_verified(&email("a@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_register_survives_failed_cache_write() {
    let (service, cache) = write_fails_service();

    let issued = service
        .register(&email("a@x.com"), PASSWORD, "", RememberMe::Off)
        .await
        .unwrap();

    assert_eq!(cache.set_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        service.get_user_email(issued.token.as_str()).await,
        Some(email("a@x.com"))
    );
    assert!(!service.email_verified(&email("a@x.com")).await.unwrap());
}

#[tokio::test]
async fn test_oauth_survives_failed_cache_write() {
    let (service, cache) = write_fails_service();

    let issued = service.oauth(&email("o@x.com"), "").await.unwrap();

    assert_eq!(cache.set_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        service.get_user_email(issued.token.as_str()).await,
        Some(email("o@x.com"))
    );
    assert!(service.email_verified(&email("o@x.com")).await.unwrap());
}
