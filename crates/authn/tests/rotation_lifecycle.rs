//! End-to-end signing-key lifecycle: scheduled rotation, post-response cache
//! refresh, token verification across the grace period, and pruning.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use sigil_authn::{
    AuthConfig, AuthenticationGate, CacheRefreshCoordinator, CacheRefreshInterceptor, Credentials,
    InterceptorChain, RotationTrigger, TriggerStatus, assert_auth_error,
    testutil::{SequentialKeyNameGenerator, StaticCredentialVerifier, StaticIdentityVerifier},
};
use sigil_storage::{SigningKeyRepository, testutil::InstrumentedRepository};
use tokio_util::sync::CancellationToken;

const AGENT: &str = "Google-Cloud-Scheduler";
const PRINCIPAL: &str = "scheduler@project.iam.gserviceaccount.com";

struct Service {
    repo: Arc<InstrumentedRepository>,
    coordinator: Arc<CacheRefreshCoordinator>,
    trigger: RotationTrigger,
    interceptors: InterceptorChain,
    gate: AuthenticationGate,
}

impl Service {
    fn new(max_backups: usize) -> Self {
        let repo = Arc::new(InstrumentedRepository::new());
        let dyn_repo: Arc<dyn SigningKeyRepository> = Arc::clone(&repo) as _;
        let config = AuthConfig::builder()
            .max_backups(max_backups)
            .refresh_interval(Duration::from_secs(60))
            .allowed_principals(vec![PRINCIPAL.to_owned()])
            .build()
            .unwrap();

        let cache = Arc::new(sigil_authn::KeyCache::new(Arc::clone(&dyn_repo)));
        let coordinator = Arc::new(
            CacheRefreshCoordinator::builder()
                .repository(dyn_repo)
                .cache(Arc::clone(&cache))
                .identity_verifier(Arc::new(
                    StaticIdentityVerifier::new().with_token("id-token", PRINCIPAL),
                ))
                .name_generator(Arc::new(SequentialKeyNameGenerator::new("key")))
                .config(&config)
                .build(),
        );

        let mut interceptors = InterceptorChain::new();
        interceptors.register(Arc::new(CacheRefreshInterceptor::new(Arc::clone(&coordinator))));

        let gate = AuthenticationGate::builder()
            .cache(cache)
            .credential_verifier(Arc::new(
                StaticCredentialVerifier::new().with_user("alice", "hunter2", "user-1"),
            ))
            .config(&config)
            .build();

        let trigger = RotationTrigger::new(Arc::clone(&coordinator), &config);
        Self { repo, coordinator, trigger, interceptors, gate }
    }

    async fn scheduled_rotation(&self) {
        let status =
            self.trigger.handle(Some(AGENT), Some("Bearer id-token"), &CancellationToken::new()).await;
        assert_eq!(status, TriggerStatus::NoContent);
    }

    async fn login(&self) -> String {
        self.gate
            .login(&Credentials::new("alice", "hunter2"), Utc::now())
            .await
            .expect("login should succeed")
            .token
    }

    fn current_key(&self) -> String {
        self.coordinator.cache().get_private().expect("a cached key").name().to_owned()
    }
}

#[tokio::test(start_paused = true)]
async fn test_tokens_survive_rotation_until_key_is_pruned() {
    let service = Service::new(2);

    service.scheduled_rotation().await;
    service.interceptors.run_after_response(&CancellationToken::new()).await;
    assert_eq!(service.current_key(), "key-0001");
    let first_token = service.login().await;

    // Rotation alone does not change what the cache serves.
    service.scheduled_rotation().await;
    assert_eq!(service.current_key(), "key-0001");

    // Inside the debounce window the hook does not list.
    let lists = service.repo.list_count();
    service.interceptors.run_after_response(&CancellationToken::new()).await;
    assert_eq!(service.repo.list_count(), lists);

    tokio::time::advance(Duration::from_secs(61)).await;
    service.interceptors.run_after_response(&CancellationToken::new()).await;
    assert_eq!(service.current_key(), "key-0002");

    // key-0001 is a backup: old tokens verify, new ones use key-0002.
    service.gate.force_authentication(&first_token, Utc::now()).expect("grace period");
    let second_token = service.login().await;
    assert_ne!(first_token, second_token);

    service.scheduled_rotation().await;
    assert_eq!(service.repo.deleted(), ["key-0001"]);
    assert_eq!(service.repo.inner.names(), ["key-0003", "key-0002"]);

    // The cache still holds key-0001 until the next refresh.
    service.gate.force_authentication(&first_token, Utc::now()).expect("stale snapshot");

    tokio::time::advance(Duration::from_secs(61)).await;
    service.interceptors.run_after_response(&CancellationToken::new()).await;

    assert_eq!(service.coordinator.cache().snapshot().names(), ["key-0003", "key-0002"]);
    let pruned = service.gate.force_authentication(&first_token, Utc::now());
    assert_auth_error!(pruned, InvalidCredentials);
    service.gate.force_authentication(&second_token, Utc::now()).expect("key-0002 retained");
    assert_eq!(service.coordinator.rotation_count(), 3);
}

#[tokio::test]
async fn test_renewal_signs_with_newest_key() {
    let service = Service::new(3);
    service.scheduled_rotation().await;
    service.coordinator.force_refresh(&CancellationToken::new()).await.unwrap();
    let token = service.login().await;

    service.scheduled_rotation().await;
    service.coordinator.force_refresh(&CancellationToken::new()).await.unwrap();

    // Two minutes before expiry the token is due for renewal.
    let late = Utc::now() + chrono::Duration::hours(24) - chrono::Duration::minutes(2);
    let outcome = service.gate.authenticate(&token, true, late).expect("still valid");

    assert!(outcome.renewed);
    assert_eq!(outcome.claims.user_id(), "user-1");
    let header = jsonwebtoken::decode_header(&outcome.token).unwrap();
    assert_eq!(header.kid.as_deref(), Some("key-0002"));
}

#[tokio::test]
async fn test_cache_is_empty_until_first_refresh() {
    let service = Service::new(2);
    service.scheduled_rotation().await;

    assert!(service.coordinator.cache().is_empty());
    let result = service.gate.login(&Credentials::new("alice", "hunter2"), Utc::now()).await;
    assert_auth_error!(result, Validation);

    service.coordinator.force_refresh(&CancellationToken::new()).await.unwrap();
    service.login().await;
}

#[tokio::test]
async fn test_rotation_converges_to_bound() {
    let service = Service::new(3);

    for _ in 0..6 {
        service.scheduled_rotation().await;
    }

    assert_eq!(service.repo.inner.names(), ["key-0006", "key-0005", "key-0004"]);
    assert_eq!(service.repo.deleted(), ["key-0001", "key-0002", "key-0003"]);
}
