//! Confidential transfers through the session pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use eerc_prover::session::WalletSigner;
use eerc_prover::{Address, Field, PCT_LEN, Phase, ProverError, Session, pct};
use integration_tests::helpers::{EchoProver, TestWallet};
use integration_tests::ledger::InMemoryLedger;
use integration_tests::{test_accounts, test_session, test_token};
use tracing::info;

const TOKEN_ID: u64 = 1;

struct Fixture {
    ledger: Arc<InMemoryLedger>,
    alice: TestWallet,
    bob: TestWallet,
    carol: TestWallet,
}

/// Alice and Bob registered, Carol's key installed as auditor when `auditor`.
fn fixture(auditor: bool) -> Result<Fixture> {
    let ledger = Arc::new(InMemoryLedger::new());
    let alice = test_accounts::alice();
    let bob = test_accounts::bob();
    let carol = test_accounts::carol();

    ledger.add_token(test_token(), TOKEN_ID)?;
    ledger.register_key(alice.address(), alice.expected_keys()?.public)?;
    ledger.register_key(bob.address(), bob.expected_keys()?.public)?;
    if auditor {
        ledger.set_auditor(carol.expected_keys()?.public)?;
    }
    Ok(Fixture {
        ledger,
        alice,
        bob,
        carol,
    })
}

async fn signed_in(wallet: &TestWallet, seed: u8) -> Result<Session> {
    let mut session = test_session(seed);
    session.sign_in(wallet).await?;
    Ok(session)
}

/// Test: Deposits show up as pending until the ledger settles them
#[test_log::test(tokio::test)]
async fn test_pending_then_settled_balance() -> Result<()> {
    let fx = fixture(true)?;
    let mut session = signed_in(&fx.alice, 10).await?;

    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 10_000)?;
    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 250)?;
    let report = session.read_balance(fx.ledger.as_ref()).await?;
    assert_eq!(report.settled, 0);
    assert_eq!(report.pending, 10_250);
    assert!(report.has_balance);
    assert_eq!(report.display_pending(), "102.50");

    // Transfers spend the settled balance only.
    let prover = Arc::new(EchoProver::new());
    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 100)
        .await
        .expect_err("nothing settled");
    assert!(matches!(err, ProverError::EmptyBalance));
    assert_eq!(prover.calls(), 0);

    fx.ledger.settle(fx.alice.address(), TOKEN_ID)?;
    let report = session.read_balance(fx.ledger.as_ref()).await?;
    assert_eq!(report.settled, 10_250);
    assert_eq!(report.pending, 0);
    assert_eq!(report.total(), 10_250);
    Ok(())
}

/// Test: Full transfer, checked from sender, receiver and auditor views
#[test_log::test(tokio::test)]
async fn test_transfer_end_to_end() -> Result<()> {
    info!("Starting transfer test");
    let fx = fixture(true)?;
    let prover = Arc::new(EchoProver::new());
    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 10_000)?;
    fx.ledger.settle(fx.alice.address(), TOKEN_ID)?;

    let mut alice = signed_in(&fx.alice, 11).await?;
    let prepared = alice
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 2_550)
        .await?;
    assert_eq!(alice.phase(), Phase::Ready);
    assert_eq!(prepared.token_id, TOKEN_ID);
    assert_eq!(prepared.proof.public_signals.len(), 32);

    // The auditor recovers the amount from the auditor PCT.
    let mut auditor_pct = [Field::from(0u64); PCT_LEN];
    auditor_pct.copy_from_slice(&prepared.proof.public_signals[14..21]);
    let audited = pct::decrypt_pct(&fx.carol.expected_keys()?.private, &auditor_pct)?;
    assert_eq!(audited, Field::from(2_550u64));

    alice.submit_transfer(fx.ledger.as_ref(), &prepared).await?;
    assert_eq!(alice.phase(), Phase::Confirmed);

    let sender = alice.read_balance(fx.ledger.as_ref()).await?;
    assert_eq!(sender.settled, 7_450);
    assert_eq!(sender.balance_pct_hint, Some(7_450));
    assert_eq!(sender.display_settled(), "74.50");

    let bob = signed_in(&fx.bob, 12).await?;
    let received = bob.read_balance(fx.ledger.as_ref()).await?;
    assert_eq!(received.pending, 2_550);
    assert_eq!(received.settled, 0);

    fx.ledger.settle(fx.bob.address(), TOKEN_ID)?;
    let received = bob.read_balance(fx.ledger.as_ref()).await?;
    assert_eq!(received.settled, 2_550);
    assert_eq!(received.pending, 0);

    info!("Transfer confirmed");
    Ok(())
}

/// Test: Overspending is caught before the prover is called
#[test_log::test(tokio::test)]
async fn test_insufficient_balance_skips_prover() -> Result<()> {
    let fx = fixture(true)?;
    let prover = Arc::new(EchoProver::new());
    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 100)?;
    fx.ledger.settle(fx.alice.address(), TOKEN_ID)?;

    let mut session = signed_in(&fx.alice, 13).await?;
    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 150)
        .await
        .expect_err("overspend");
    assert!(matches!(
        err,
        ProverError::InsufficientBalance {
            requested: 150,
            available: 100
        }
    ));
    assert_eq!(prover.calls(), 0);
    assert_eq!(session.phase(), Phase::Failed);

    // Still holding the key, a smaller transfer goes through.
    session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 100)
        .await?;
    assert_eq!(session.phase(), Phase::Ready);
    Ok(())
}

/// Test: Bad counterparties and amounts are rejected up front
#[test_log::test(tokio::test)]
async fn test_counterparty_checks() -> Result<()> {
    let fx = fixture(false)?;
    let prover = Arc::new(EchoProver::new());
    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 500)?;
    fx.ledger.settle(fx.alice.address(), TOKEN_ID)?;
    let mut session = signed_in(&fx.alice, 14).await?;

    let stranger = Address([0xDD; 20]);
    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, stranger, 10)
        .await
        .expect_err("unregistered recipient");
    assert!(matches!(err, ProverError::RecipientNotRegistered(a) if a == stranger));

    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 10)
        .await
        .expect_err("no auditor");
    assert!(matches!(err, ProverError::AuditorNotSet));

    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 0)
        .await
        .expect_err("zero amount");
    assert!(matches!(err, ProverError::InvalidAmount(_)));

    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, Address([0u8; 20]), 10)
        .await
        .expect_err("zero address");
    assert!(matches!(err, ProverError::InvalidAddress(_)));

    assert_eq!(prover.calls(), 0);
    Ok(())
}

/// Test: A balance change while proving discards the proof
#[test_log::test(tokio::test)]
async fn test_stale_balance_discards_proof() -> Result<()> {
    let fx = fixture(true)?;
    let alice_addr = fx.alice.address();
    fx.ledger.deposit(alice_addr, TOKEN_ID, 1_000)?;
    fx.ledger.settle(alice_addr, TOKEN_ID)?;

    let ledger = Arc::clone(&fx.ledger);
    let prover = Arc::new(EchoProver::new().with_hook(move || {
        ledger.deposit(alice_addr, TOKEN_ID, 5).expect("deposit while proving");
        ledger.settle(alice_addr, TOKEN_ID).expect("settle while proving");
    }));

    let mut session = signed_in(&fx.alice, 15).await?;
    let reads_before = fx.ledger.balance_reads();
    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 300)
        .await
        .expect_err("stale");
    assert!(matches!(err, ProverError::StaleBalance));
    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(prover.calls(), 1);
    // One read to build, one to check after proving.
    assert_eq!(fx.ledger.balance_reads() - reads_before, 2);

    let report = session.read_balance(fx.ledger.as_ref()).await?;
    assert_eq!(report.settled, 1_005);
    Ok(())
}

/// Test: Cancelling abandons proof generation without reaching Ready
#[test_log::test(tokio::test)]
async fn test_cancel_during_proof_generation() -> Result<()> {
    let fx = fixture(true)?;
    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 1_000)?;
    fx.ledger.settle(fx.alice.address(), TOKEN_ID)?;

    let slow = Arc::new(EchoProver::new().with_delay(Duration::from_millis(800)));
    let mut session = signed_in(&fx.alice, 16).await?;

    let handle = session.cancel_handle();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let err = session
        .prove_transfer(fx.ledger.as_ref(), &slow, fx.bob.address(), 10)
        .await
        .expect_err("cancelled");
    canceller.await?;
    assert!(matches!(err, ProverError::Cancelled));
    assert_eq!(session.phase(), Phase::Failed);

    // The next proof starts with a cleared cancellation flag.
    let prover = Arc::new(EchoProver::new());
    session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 10)
        .await?;
    assert_eq!(session.phase(), Phase::Ready);
    Ok(())
}

/// Test: A prover failure is retried from BuildingInput without re-signing
#[test_log::test(tokio::test)]
async fn test_prover_failure_then_retry() -> Result<()> {
    let fx = fixture(true)?;
    let prover = Arc::new(EchoProver::new());
    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 1_000)?;
    fx.ledger.settle(fx.alice.address(), TOKEN_ID)?;
    let mut session = signed_in(&fx.alice, 17).await?;

    prover.fail_next("witness generation failed");
    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 400)
        .await
        .expect_err("prover failed");
    match err {
        ProverError::ProofGenerationFailed(msg) => assert!(msg.contains("witness")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(session.last_error().is_some());

    let prepared = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 400)
        .await?;
    session.submit_transfer(fx.ledger.as_ref(), &prepared).await?;
    assert_eq!(session.phase(), Phase::Confirmed);
    assert_eq!(fx.alice.signatures(), 1);
    assert_eq!(prover.calls(), 2);

    let report = session.read_balance(fx.ledger.as_ref()).await?;
    assert_eq!(report.settled, 600);
    Ok(())
}

/// Test: The transfer statement must carry exactly 32 public signals
#[test_log::test(tokio::test)]
async fn test_transfer_signal_count_enforced() -> Result<()> {
    let fx = fixture(true)?;
    fx.ledger.deposit(fx.alice.address(), TOKEN_ID, 1_000)?;
    fx.ledger.settle(fx.alice.address(), TOKEN_ID)?;
    let prover = Arc::new(EchoProver::new().with_signal_count(31));
    let mut session = signed_in(&fx.alice, 18).await?;

    let err = session
        .prove_transfer(fx.ledger.as_ref(), &prover, fx.bob.address(), 10)
        .await
        .expect_err("31 signals");
    assert!(matches!(
        err,
        ProverError::UnexpectedSignalCount {
            expected: 32,
            got: 31
        }
    ));
    Ok(())
}
