mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gate::{AttemptError, BackendError, Classifier, ErrorClass, Gateway, GatewayConfig, GatewayError};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use common::{FakeBackend, init_tracing, jwt_expired, signed_in, signed_out, unpaced};

#[tokio::test(start_paused = true)]
async fn active_operations_never_exceed_the_limit() {
	init_tracing();
	let gateway = Gateway::builder(signed_out(&FakeBackend::new())).config(GatewayConfig::default()).build();
	let active = Arc::new(AtomicUsize::new(0));
	let peak = Arc::new(AtomicUsize::new(0));

	let handles: Vec<_> = (0..10)
		.map(|_| {
			let active = active.clone();
			let peak = peak.clone();
			gateway.submit(move || {
				let active = active.clone();
				let peak = peak.clone();
				async move {
					let now = active.fetch_add(1, Ordering::SeqCst) + 1;
					peak.fetch_max(now, Ordering::SeqCst);
					tokio::time::sleep(Duration::from_millis(100)).await;
					active.fetch_sub(1, Ordering::SeqCst);
					Ok::<_, BackendError>(())
				}
			})
		})
		.collect();

	for handle in handles {
		handle.await.expect("operation should succeed");
	}
	assert!(peak.load(Ordering::SeqCst) <= 3, "peak concurrency {}", peak.load(Ordering::SeqCst));
	assert_eq!(peak.load(Ordering::SeqCst), 3);
	assert_eq!(gateway.snapshot().active, 0);
}

#[tokio::test(start_paused = true)]
async fn timing_out_operation_exhausts_after_max_retries() {
	let gateway = Gateway::builder(signed_out(&FakeBackend::new())).build();
	let calls = Arc::new(AtomicUsize::new(0));

	let started = Instant::now();
	let result = gateway
		.submit({
			let calls = calls.clone();
			move || {
				calls.fetch_add(1, Ordering::SeqCst);
				async {
					tokio::time::sleep(Duration::from_secs(3600)).await;
					Ok::<_, BackendError>(())
				}
			}
		})
		.await;

	let err = result.expect_err("operation should time out");
	assert_eq!(
		err,
		GatewayError::Exhausted {
			attempts: 3,
			last: AttemptError::Timeout(Duration::from_secs(15)),
		}
	);
	assert_eq!(calls.load(Ordering::SeqCst), 3);
	// Three 15s deadlines plus 1s and 2s of backoff.
	assert!(started.elapsed() >= Duration::from_secs(48), "elapsed {:?}", started.elapsed());
	assert_eq!(gateway.classify(&err), Some(ErrorClass::Timeout));
}

#[tokio::test(start_paused = true)]
async fn expired_credential_is_recovered_without_consuming_a_retry() {
	let backend = FakeBackend::new();
	let authority = signed_in(&backend);
	let gateway = Gateway::builder(authority.clone()).config(unpaced(3, 1)).build();
	let calls = Arc::new(AtomicUsize::new(0));

	let value = gateway
		.submit({
			let calls = calls.clone();
			move || {
				let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
				async move { if first { Err(jwt_expired()) } else { Ok("rows") } }
			}
		})
		.await
		.expect("operation should recover after refresh");

	assert_eq!(value, "rows");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(backend.refresh_count(), 1);
	assert_eq!(authority.current_session().expect("session should remain").access_token, "refreshed-1");
}

#[tokio::test(start_paused = true)]
async fn credential_error_without_session_is_transient() {
	let backend = FakeBackend::new();
	let gateway = Gateway::builder(signed_out(&backend)).config(unpaced(3, 1)).build();

	let err = gateway
		.submit(|| async { Err::<(), _>(jwt_expired()) })
		.await
		.expect_err("no session means no recovery");

	assert!(matches!(err, GatewayError::Exhausted { attempts: 1, .. }), "{err}");
	assert_eq!(backend.refresh_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn credential_recovery_happens_once_per_operation() {
	let backend = FakeBackend::new();
	let gateway = Gateway::builder(signed_in(&backend)).config(unpaced(3, 2)).build();
	let calls = Arc::new(AtomicUsize::new(0));

	let err = gateway
		.submit({
			let calls = calls.clone();
			move || {
				calls.fetch_add(1, Ordering::SeqCst);
				async { Err::<(), _>(jwt_expired()) }
			}
		})
		.await
		.expect_err("credential keeps failing");

	assert!(matches!(err, GatewayError::Exhausted { attempts: 2, .. }), "{err}");
	assert_eq!(calls.load(Ordering::SeqCst), 3, "one free re-attempt plus two counted attempts");
	assert_eq!(backend.refresh_count(), 1);
	assert_eq!(err.backend().and_then(|e| e.status), Some(401));
}

#[tokio::test(start_paused = true)]
async fn failed_recovery_signs_out_and_counts_the_attempt() {
	let backend = FakeBackend::new();
	backend.fail_refresh(true);
	let authority = signed_in(&backend);
	let gateway = Gateway::builder(authority.clone()).config(unpaced(3, 1)).build();

	let err = gateway
		.submit(|| async { Err::<(), _>(jwt_expired()) })
		.await
		.expect_err("refresh failure cannot recover the operation");

	assert!(matches!(err, GatewayError::Exhausted { attempts: 1, .. }), "{err}");
	assert_eq!(authority.current_session(), None);
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried() {
	let classifier = Classifier::default().with_permanent(|err| err.status == Some(400));
	let gateway = Gateway::new(unpaced(3, 3), signed_out(&FakeBackend::new()), classifier);
	let calls = Arc::new(AtomicUsize::new(0));

	let err = gateway
		.submit({
			let calls = calls.clone();
			move || {
				calls.fetch_add(1, Ordering::SeqCst);
				async { Err::<(), _>(BackendError::new("duplicate key value").with_status(400)) }
			}
		})
		.await
		.expect_err("permanent failure");

	assert!(matches!(err, GatewayError::Rejected(_)), "{err}");
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_operation_settles_and_frees_its_slot() {
	let gateway = Gateway::builder(signed_out(&FakeBackend::new())).config(unpaced(1, 3)).build();

	let err = gateway
		.submit(|| async {
			if true {
				panic!("boom");
			}
			Ok::<(), BackendError>(())
		})
		.await
		.expect_err("panic is a failure");
	assert!(matches!(err, GatewayError::Rejected(AttemptError::Panicked(_))), "{err}");

	let next = gateway.submit(|| async { Ok::<_, BackendError>(7) }).await;
	assert_eq!(next, Ok(7));
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_queued_operations_only() {
	let gateway = Gateway::builder(signed_out(&FakeBackend::new())).config(unpaced(1, 3)).build();
	let gate = Arc::new(Semaphore::new(0));

	let running = gateway.submit({
		let gate = gate.clone();
		move || {
			let gate = gate.clone();
			async move {
				gate.acquire().await.expect("semaphore open").forget();
				Ok::<_, BackendError>("done")
			}
		}
	});
	let queued_a = gateway.submit(|| async { Ok::<_, BackendError>("a") });
	let queued_b = gateway.submit(|| async { Ok::<_, BackendError>("b") });

	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(gateway.snapshot().queued, 2);
	assert_eq!(gateway.reset(), 2);

	assert_eq!(queued_a.await, Err(GatewayError::Cancelled));
	assert_eq!(queued_b.await, Err(GatewayError::Cancelled));

	gate.add_permits(1);
	assert_eq!(running.await, Ok("done"));
	assert_eq!(gateway.snapshot().active, 0);
}

#[tokio::test(start_paused = true)]
async fn excess_submissions_wait_for_a_settlement() {
	let gateway = Gateway::builder(signed_out(&FakeBackend::new())).build();
	let gate = Arc::new(Semaphore::new(0));
	let started = Arc::new(Mutex::new(Vec::new()));

	let handles: Vec<_> = (1..=5)
		.map(|n| {
			let gate = gate.clone();
			let started = started.clone();
			gateway.submit(move || {
				let gate = gate.clone();
				started.lock().push(n);
				async move {
					gate.acquire().await.expect("semaphore open").forget();
					Ok::<_, BackendError>(n)
				}
			})
		})
		.collect();

	let started_sorted = || {
		let mut seen = started.lock().clone();
		seen.sort_unstable();
		seen
	};

	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(started_sorted(), vec![1, 2, 3]);
	assert_eq!(gateway.snapshot().queued, 2);

	gate.add_permits(1);
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(started.lock().len(), 3, "dispatch is paced after a settlement");

	tokio::time::sleep(Duration::from_millis(150)).await;
	assert_eq!(started_sorted(), vec![1, 2, 3, 4]);

	gate.add_permits(4);
	let mut settled = Vec::new();
	for handle in handles {
		settled.push(handle.await.expect("operation should succeed"));
	}
	assert_eq!(settled, vec![1, 2, 3, 4, 5]);
	assert_eq!(started_sorted(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn submission_records_activity() {
	let tracker = gate::LivenessTracker::new(Duration::from_secs(300));
	let gateway = Gateway::builder(signed_out(&FakeBackend::new())).liveness(tracker.clone()).build();
	let before = tracker.state().last_active_at;

	tokio::time::sleep(Duration::from_millis(5)).await;
	gateway.submit(|| async { Ok::<_, BackendError>(()) }).await.expect("noop");
	assert!(tracker.state().last_active_at > before);
}
