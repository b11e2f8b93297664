//! Sign-in and registration through the session pipeline.

use std::sync::Arc;

use anyhow::Result;
use eerc_prover::session::WalletSigner;
use eerc_prover::{Field, Phase, ProverError};
use integration_tests::helpers::EchoProver;
use integration_tests::ledger::InMemoryLedger;
use integration_tests::{TEST_CHAIN_ID, test_accounts, test_session};
use tracing::info;

/// Test: Same wallet, two independent sessions, same identity
#[test_log::test(tokio::test)]
async fn test_sign_in_is_deterministic() -> Result<()> {
    let alice = test_accounts::alice();

    let mut first = test_session(1);
    let mut second = test_session(2);
    let pk1 = first.sign_in(&alice).await?;
    let pk2 = second.sign_in(&alice).await?;

    assert_eq!(pk1, pk2);
    assert_eq!(pk1, alice.expected_keys()?.public);
    assert_eq!(first.phase(), Phase::DerivingKey);
    assert_eq!(alice.signatures(), 2);

    let bob_pk = test_session(1).sign_in(&test_accounts::bob()).await?;
    assert_ne!(pk1, bob_pk);
    Ok(())
}

/// Test: Full registration, from signature to ledger state
#[test_log::test(tokio::test)]
async fn test_registration_end_to_end() -> Result<()> {
    info!("Starting registration test");
    let alice = test_accounts::alice();
    let ledger = InMemoryLedger::new();
    let prover = Arc::new(EchoProver::new());

    let mut session = test_session(3);
    session.sign_in(&alice).await?;
    let proof = session.prove_registration(&prover).await?;
    assert_eq!(session.phase(), Phase::Ready);
    assert_eq!(proof.public_signals.len(), 5);
    assert_eq!(proof.public_signals[3], Field::from(TEST_CHAIN_ID));

    let receipt = session.submit_registration(&ledger, &proof).await?;
    assert!(!receipt.is_empty());
    assert_eq!(session.phase(), Phase::Confirmed);
    assert!(ledger.is_registered(&alice.address())?);
    assert_eq!(prover.calls(), 1);

    info!("Registration confirmed");
    Ok(())
}

/// Test: The wallet on the wrong chain never gets asked to sign
#[test_log::test(tokio::test)]
async fn test_wrong_chain_is_rejected() -> Result<()> {
    let wallet = test_accounts::alice().on_chain(1);
    let mut session = test_session(4);

    let err = session.sign_in(&wallet).await.expect_err("wrong chain");
    assert!(matches!(
        err,
        ProverError::WrongChain {
            expected: TEST_CHAIN_ID,
            actual: 1
        }
    ));
    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(wallet.signatures(), 0);
    assert!(session.keys().is_none());

    // Back on the right chain, sign in then drop the key again.
    let mut session = test_session(4);
    session.sign_in(&test_accounts::alice()).await?;
    assert!(session.keys().is_some());
    session.reset();
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.keys().is_none());
    assert!(session.address().is_none());
    Ok(())
}

/// Test: A rejected signature fails the session; signing again recovers it
#[test_log::test(tokio::test)]
async fn test_signature_rejection_then_retry() -> Result<()> {
    let alice = test_accounts::alice();
    let prover = Arc::new(EchoProver::new());
    let mut session = test_session(5);

    alice.refuse_next();
    let err = session.sign_in(&alice).await.expect_err("refused");
    assert!(matches!(err, ProverError::SigningFailed(_)));
    assert_eq!(session.phase(), Phase::Failed);
    assert!(session.last_error().is_some());

    // No key is held, so proving cannot resume from here.
    let err = session
        .prove_registration(&prover)
        .await
        .expect_err("no key");
    assert!(matches!(err, ProverError::InvalidPhase { .. }));
    assert_eq!(prover.calls(), 0);

    session.sign_in(&alice).await?;
    session.prove_registration(&prover).await?;
    assert_eq!(session.phase(), Phase::Ready);
    Ok(())
}

/// Test: A ledger rejection is passed through and the proof can be rebuilt
#[test_log::test(tokio::test)]
async fn test_submission_failure_passes_through() -> Result<()> {
    let alice = test_accounts::alice();
    let ledger = InMemoryLedger::new();
    let prover = Arc::new(EchoProver::new());
    let mut session = test_session(6);

    session.sign_in(&alice).await?;
    let proof = session.prove_registration(&prover).await?;

    ledger.reject_next_submission("execution reverted: UserAlreadyRegistered")?;
    let err = session
        .submit_registration(&ledger, &proof)
        .await
        .expect_err("rejected");
    match err {
        ProverError::LedgerSubmissionFailed(msg) => assert!(msg.contains("UserAlreadyRegistered")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.phase(), Phase::Failed);

    // Submitting again without a fresh proof is out of order.
    assert!(matches!(
        session.submit_registration(&ledger, &proof).await,
        Err(ProverError::InvalidPhase { .. })
    ));

    // The key is still held: rebuild from BuildingInput without re-signing.
    let proof = session.prove_registration(&prover).await?;
    session.submit_registration(&ledger, &proof).await?;
    assert_eq!(session.phase(), Phase::Confirmed);
    assert_eq!(alice.signatures(), 1);
    Ok(())
}

/// Test: A prover emitting the wrong number of signals is a builder error
#[test_log::test(tokio::test)]
async fn test_registration_signal_count_enforced() -> Result<()> {
    let alice = test_accounts::alice();
    let prover = Arc::new(EchoProver::new().with_signal_count(6));
    let mut session = test_session(7);

    session.sign_in(&alice).await?;
    let err = session
        .prove_registration(&prover)
        .await
        .expect_err("six signals");
    assert!(matches!(
        err,
        ProverError::UnexpectedSignalCount {
            expected: 5,
            got: 6
        }
    ));
    assert_eq!(session.phase(), Phase::Failed);
    Ok(())
}
