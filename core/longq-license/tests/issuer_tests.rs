mod common;

use common::{ProbeStore, RacingStore, fingerprint, issuer_with, store_with, test_signer};
use longq_license::{
    IssueRequest, IssuerConfig, Keyring, KvStore, License, LicenseError, LicenseIssuer,
    LicensePayload, email_hash, verify_signature,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::Ordering;

const ALICE: &str = "alice@example.com";

// ── Happy path ───────────────────────────────────────────────────

#[tokio::test]
async fn issues_signed_license() {
    let (issuer, _) = issuer_with(&[(ALICE, 1)]).await;
    let fp = fingerprint("laptop");

    let issued = issuer.issue(&IssueRequest::new(ALICE, &fp)).await.unwrap();
    assert!(!issued.replayed);

    let lic = &issued.license.payload;
    assert!(lic.license_id.starts_with("LIC-"));
    assert_eq!(lic.product, "app");
    assert_eq!(lic.email_hash, email_hash(ALICE));
    assert_eq!(lic.fingerprint_sha256, fp);
    assert_eq!(lic.issued_at, lic.not_before);
    assert!(lic.issued_at.ends_with('Z'));
    assert_eq!(lic.issued_at.len(), "2024-01-01T00:00:00Z".len());
    assert!(lic.never_expires);
    assert_eq!(lic.features, vec!["core".to_string()]);
    assert_eq!(lic.key_version, 1);
    assert_eq!(issued.license.signature.len(), 128);

    let ring = Keyring::single(1, test_signer().verifying_key());
    verify_signature(&issued.license, &ring).unwrap();
}

#[tokio::test]
async fn persists_license_and_seat() {
    let (issuer, store) = issuer_with(&[(ALICE, 1)]).await;
    let fp = fingerprint("laptop");
    let issued = issuer.issue(&IssueRequest::new(ALICE, &fp)).await.unwrap();
    let id = issued.license.license_id().to_string();

    let idx = store
        .get(&format!("idx:{}:{}", email_hash(ALICE), fp))
        .await
        .unwrap();
    assert_eq!(idx.as_deref(), Some(id.as_str()));

    let raw = store.get(&format!("lic:{id}")).await.unwrap().unwrap();
    let stored: License = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored, issued.license);
}

#[tokio::test]
async fn email_is_normalized_before_lookup() {
    let (issuer, _) = issuer_with(&[(ALICE, 1)]).await;
    let issued = issuer
        .issue(&IssueRequest::new("  Alice@Example.com ", fingerprint("laptop")))
        .await
        .unwrap();
    assert_eq!(issued.license.payload.email_hash, email_hash(ALICE));
}

#[tokio::test]
async fn custom_product_is_recorded() {
    let (issuer, _) = issuer_with(&[(ALICE, 1)]).await;
    let issued = issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("laptop")).with_product("quantum_qi"))
        .await
        .unwrap();
    assert_eq!(issued.license.product(), "quantum_qi");
}

// ── Idempotence ──────────────────────────────────────────────────

#[tokio::test]
async fn repeated_requests_return_identical_license() {
    let (issuer, store) = issuer_with(&[(ALICE, 1)]).await;
    let req = IssueRequest::new(ALICE, fingerprint("laptop"));

    let first = issuer.issue(&req).await.unwrap();
    let keys_after_first = store.len().await;

    for _ in 0..5 {
        let again = issuer.issue(&req).await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.license.license_id(), first.license.license_id());
        assert_eq!(again.license.signature, first.license.signature);
        assert_eq!(again.license, first.license);
    }
    assert_eq!(store.len().await, keys_after_first);
}

#[tokio::test]
async fn replay_does_not_need_signing_key() {
    let store = store_with(&[(ALICE, 1)]).await;
    let req = IssueRequest::new(ALICE, fingerprint("laptop"));
    let signing = LicenseIssuer::new(Arc::new(store.clone()), test_signer());
    let first = signing.issue(&req).await.unwrap();

    let unsigned = LicenseIssuer::from_config(Arc::new(store), &IssuerConfig::default());
    let again = unsigned.issue(&req).await.unwrap();
    assert!(again.replayed);
    assert_eq!(again.license, first.license);
}

// ── Seat quota ───────────────────────────────────────────────────

#[tokio::test]
async fn single_seat_boundary() {
    let (issuer, _) = issuer_with(&[(ALICE, 1)]).await;
    let a = IssueRequest::new(ALICE, fingerprint("A"));
    let b = IssueRequest::new(ALICE, fingerprint("B"));

    let first = issuer.issue(&a).await.unwrap();

    let err = issuer.issue(&b).await.unwrap_err();
    assert_eq!(err.code(), "seat_limit_reached");
    assert!(matches!(err, LicenseError::SeatLimitReached { max_seats: 1 }));

    let again = issuer.issue(&a).await.unwrap();
    assert!(again.replayed);
    assert_eq!(again.license.license_id(), first.license.license_id());
}

#[tokio::test]
async fn multi_seat_quota_fills_up() {
    let (issuer, _) = issuer_with(&[(ALICE, 3)]).await;
    let mut ids = Vec::new();
    for device in ["A", "B", "C"] {
        let issued = issuer
            .issue(&IssueRequest::new(ALICE, fingerprint(device)))
            .await
            .unwrap();
        assert!(!issued.replayed);
        ids.push(issued.license.license_id().to_string());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);

    let err = issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("D")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "seat_limit_reached");
}

#[tokio::test]
async fn seats_are_per_email() {
    let (issuer, _) = issuer_with(&[(ALICE, 1), ("bob@example.com", 1)]).await;
    issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("shared")))
        .await
        .unwrap();
    let bob = issuer
        .issue(&IssueRequest::new("bob@example.com", fingerprint("shared")))
        .await
        .unwrap();
    assert!(!bob.replayed);
}

#[tokio::test]
async fn missing_quota_defaults_to_one_seat() {
    let store = store_with(&[]).await;
    store
        .put(&format!("allow:{}", email_hash(ALICE)), "{}")
        .await
        .unwrap();
    let issuer = LicenseIssuer::new(Arc::new(store), test_signer());
    issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("A")))
        .await
        .unwrap();
    let err = issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("B")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "seat_limit_reached");
}

// ── Rejections ───────────────────────────────────────────────────

#[tokio::test]
async fn unknown_email_rejected_before_signing() {
    let store = ProbeStore::new(store_with(&[(ALICE, 1)]).await);
    let issuer = LicenseIssuer::from_config(Arc::new(store.clone()), &IssuerConfig::default());

    let err = issuer
        .issue(&IssueRequest::new("mallory@example.com", fingerprint("A")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "email_not_allowed");
    // Only the allowlist read happened.
    assert_eq!(store.calls(), 1);
    assert_eq!(store.inner.len().await, 1);
}

#[tokio::test]
async fn missing_fields_are_invalid_request() {
    let (issuer, store) = issuer_with(&[(ALICE, 1)]).await;
    for req in [
        IssueRequest::new("", fingerprint("A")),
        IssueRequest::new("   ", fingerprint("A")),
        IssueRequest::new(ALICE, ""),
    ] {
        let err = issuer.issue(&req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn missing_seed_is_server_misconfig() {
    let store = store_with(&[(ALICE, 1)]).await;
    let issuer = LicenseIssuer::from_config(Arc::new(store.clone()), &IssuerConfig::default());
    assert!(!issuer.can_sign());
    assert!(issuer.public_key_hex().is_none());

    let err = issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("A")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "server_misconfig");
    assert!(err.is_server_fault());
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn malformed_seed_is_server_misconfig() {
    let store = store_with(&[(ALICE, 1)]).await;
    let config = IssuerConfig {
        signing_seed: Some("not-hex".to_string()),
        key_version: None,
    };
    let issuer = LicenseIssuer::from_config(Arc::new(store), &config);
    let err = issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("A")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "server_misconfig");
}

#[tokio::test]
async fn seat_check_precedes_seed_check() {
    let store = store_with(&[(ALICE, 1)]).await;
    LicenseIssuer::new(Arc::new(store.clone()), test_signer())
        .issue(&IssueRequest::new(ALICE, fingerprint("A")))
        .await
        .unwrap();

    let unsigned = LicenseIssuer::from_config(Arc::new(store), &IssuerConfig::default());
    let err = unsigned
        .issue(&IssueRequest::new(ALICE, fingerprint("B")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "seat_limit_reached");
}

#[tokio::test]
async fn configured_key_version_is_stamped() {
    let store = store_with(&[(ALICE, 1)]).await;
    let config = IssuerConfig {
        signing_seed: Some(common::TEST_SEED_HEX.to_string()),
        key_version: Some(2),
    };
    let issuer = LicenseIssuer::from_config(Arc::new(store), &config);
    let issued = issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("A")))
        .await
        .unwrap();
    assert_eq!(issued.license.key_version(), 2);

    let ring = Keyring::single(2, test_signer().verifying_key());
    verify_signature(&issued.license, &ring).unwrap();
}

// ── Store faults and races ───────────────────────────────────────

#[tokio::test]
async fn corrupt_allowlist_entry_is_server_error() {
    let store = store_with(&[]).await;
    store
        .put(&format!("allow:{}", email_hash(ALICE)), "not json")
        .await
        .unwrap();
    let issuer = LicenseIssuer::new(Arc::new(store), test_signer());
    let err = issuer
        .issue(&IssueRequest::new(ALICE, fingerprint("A")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "server_error");
}

#[tokio::test]
async fn dangling_seat_entry_is_server_error() {
    let (issuer, store) = issuer_with(&[(ALICE, 1)]).await;
    let fp = fingerprint("A");
    store
        .put(&format!("idx:{}:{}", email_hash(ALICE), fp), "LIC-gone")
        .await
        .unwrap();
    let err = issuer.issue(&IssueRequest::new(ALICE, &fp)).await.unwrap_err();
    assert_eq!(err.code(), "server_error");
}

#[tokio::test]
async fn failed_seat_write_leaves_orphan_and_retry_reissues() {
    let probe = ProbeStore::new(store_with(&[(ALICE, 1)]).await);
    let issuer = LicenseIssuer::new(Arc::new(probe.clone()), test_signer());
    let req = IssueRequest::new(ALICE, fingerprint("A"));

    probe.fail_index_writes.store(true, Ordering::SeqCst);
    let err = issuer.issue(&req).await.unwrap_err();
    assert_eq!(err.code(), "server_error");

    let orphans: Vec<String> = probe
        .inner
        .keys()
        .await
        .into_iter()
        .filter(|k| k.starts_with("lic:"))
        .collect();
    assert_eq!(orphans.len(), 1);

    probe.fail_index_writes.store(false, Ordering::SeqCst);
    let issued = issuer.issue(&req).await.unwrap();
    assert!(!issued.replayed);
    assert_ne!(format!("lic:{}", issued.license.license_id()), orphans[0]);
}

#[tokio::test]
async fn concurrent_same_device_converges_on_winner() {
    let inner = store_with(&[(ALICE, 1)]).await;
    let fp = fingerprint("A");

    let signer = test_signer();
    let payload = LicensePayload::new(
        "LIC-winner".to_string(),
        "app".to_string(),
        email_hash(ALICE),
        fp.clone(),
        1,
        chrono::Utc::now(),
    );
    let signature = signer.sign(&payload.canonical_bytes().unwrap());
    let winner = License::new(payload, signature);

    let racing = RacingStore {
        inner: inner.clone(),
        competitor_license_id: "LIC-winner".to_string(),
        competitor_license_json: serde_json::to_string(&winner).unwrap(),
    };
    let issuer = LicenseIssuer::new(Arc::new(racing), signer);

    let issued = issuer.issue(&IssueRequest::new(ALICE, &fp)).await.unwrap();
    assert!(issued.replayed);
    assert_eq!(issued.license, winner);

    let seat = inner
        .get(&format!("idx:{}:{}", email_hash(ALICE), fp))
        .await
        .unwrap();
    assert_eq!(seat.as_deref(), Some("LIC-winner"));
}

#[tokio::test]
async fn parallel_requests_for_one_device_share_a_license() {
    let (issuer, _) = issuer_with(&[(ALICE, 5)]).await;
    let issuer = Arc::new(issuer);
    let fp = fingerprint("A");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let issuer = Arc::clone(&issuer);
        let req = IssueRequest::new(ALICE, fp.clone());
        handles.push(tokio::spawn(async move { issuer.issue(&req).await }));
    }

    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap().unwrap().license.license_id().to_string());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}
