mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gate::{
	BackendError, Gateway, GatewayError, HealthConfig, HealthError, HealthMonitor, LivenessTracker, SessionAuthority,
	probe_fn,
};
use tokio::sync::Semaphore;

use common::{FakeBackend, jwt_expired, signed_in, signed_out, unpaced};

struct Harness {
	monitor: HealthMonitor,
	gateway: Gateway,
	liveness: LivenessTracker,
	checks: Arc<AtomicUsize>,
}

fn harness(authority: SessionAuthority, max_concurrent: usize, result: fn() -> Result<(), BackendError>) -> Harness {
	let liveness = LivenessTracker::new(Duration::from_secs(300));
	let gateway = Gateway::builder(authority)
		.config(unpaced(max_concurrent, 3))
		.liveness(liveness.clone())
		.build();
	let checks = Arc::new(AtomicUsize::new(0));
	let check = probe_fn({
		let checks = checks.clone();
		move |_session| {
			checks.fetch_add(1, Ordering::SeqCst);
			async move { result() }
		}
	});
	let config = HealthConfig {
		check_interval_ms: 1_000,
		probe_retries: 1,
	};
	let monitor = HealthMonitor::new(gateway.clone(), liveness.clone(), check, config);
	Harness {
		monitor,
		gateway,
		liveness,
		checks,
	}
}

fn healthy() -> Result<(), BackendError> {
	Ok(())
}

fn expired() -> Result<(), BackendError> {
	Err(jwt_expired())
}

fn unreachable_backend() -> Result<(), BackendError> {
	Err(BackendError::new("error sending request").with_status(503))
}

#[tokio::test(start_paused = true)]
async fn passing_check_reports_ok() {
	let h = harness(signed_in(&FakeBackend::new()), 3, healthy);

	let report = h.monitor.check_now().await;
	assert!(report.ok);
	assert_eq!(report.error, None);
	assert_eq!(h.monitor.last_report(), Some(report));
	assert_eq!(h.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_check_is_reported_after_one_attempt() {
	let h = harness(signed_in(&FakeBackend::new()), 3, unreachable_backend);

	let report = h.monitor.check_now().await;
	assert!(!report.ok);
	assert!(matches!(report.error, Some(HealthError::Probe(GatewayError::Exhausted { attempts: 1, .. }))));
	assert_eq!(h.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn credential_failure_with_session_passes_after_refresh() {
	let backend = FakeBackend::new();
	let h = harness(signed_in(&backend), 3, expired);

	let report = h.monitor.check_now().await;
	assert!(report.ok, "{report:?}");
	assert_eq!(backend.refresh_count(), 1, "one check refreshes once");
	assert_eq!(h.checks.load(Ordering::SeqCst), 1, "the check itself owns credential recovery");
}

#[tokio::test(start_paused = true)]
async fn credential_failure_without_session_fails() {
	let backend = FakeBackend::new();
	let h = harness(signed_out(&backend), 3, expired);

	let report = h.monitor.check_now().await;
	assert!(!report.ok);
	assert!(matches!(report.error, Some(HealthError::Probe(_))));
	assert_eq!(backend.refresh_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn credential_failure_with_rejected_refresh_fails() {
	let backend = FakeBackend::new();
	backend.fail_refresh(true);
	let h = harness(signed_in(&backend), 3, expired);

	let report = h.monitor.check_now().await;
	assert!(!report.ok);
	assert!(matches!(report.error, Some(HealthError::Refresh(_))));
	assert!(h.gateway.authority().current_session().is_none());
	assert_eq!(backend.refresh_count(), 1);
	assert_eq!(h.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_checks_are_idempotent_and_stoppable() {
	let h = harness(signed_in(&FakeBackend::new()), 3, healthy);

	assert!(h.monitor.start_periodic(Duration::from_secs(1)));
	assert!(!h.monitor.start_periodic(Duration::from_secs(1)));
	assert!(h.monitor.is_running());

	tokio::time::sleep(Duration::from_millis(3_500)).await;
	assert_eq!(h.checks.load(Ordering::SeqCst), 3);

	h.monitor.stop();
	assert!(!h.monitor.is_running());
	tokio::time::sleep(Duration::from_secs(5)).await;
	assert_eq!(h.checks.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn periodic_checks_skip_inactive_or_signed_out_clients() {
	let backend = FakeBackend::new();
	let h = harness(signed_in(&backend), 3, healthy);
	h.liveness.set_foreground(false);

	h.monitor.start_periodic(Duration::from_secs(1));
	tokio::time::sleep(Duration::from_millis(2_500)).await;
	assert_eq!(h.checks.load(Ordering::SeqCst), 0, "background client must not be checked");

	h.liveness.set_foreground(true);
	tokio::time::sleep(Duration::from_secs(1)).await;
	assert_eq!(h.checks.load(Ordering::SeqCst), 1);

	h.gateway.authority().sign_out().await.expect("sign-out");
	tokio::time::sleep(Duration::from_secs(3)).await;
	assert_eq!(h.checks.load(Ordering::SeqCst), 1, "signed-out client must not be checked");
}

#[tokio::test(start_paused = true)]
async fn start_only_schedules_after_a_passing_check() {
	let failing = harness(signed_in(&FakeBackend::new()), 3, unreachable_backend);
	assert!(!failing.monitor.start().await.ok);
	assert!(!failing.monitor.is_running());

	let passing = harness(signed_in(&FakeBackend::new()), 3, healthy);
	assert!(passing.monitor.start().await.ok);
	assert!(passing.monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn foreground_refreshes_resets_and_resumes() {
	let backend = FakeBackend::new();
	let h = harness(signed_in(&backend), 2, healthy);
	let gate = Arc::new(Semaphore::new(0));

	let blockers: Vec<_> = (0..2)
		.map(|_| {
			let gate = gate.clone();
			h.gateway.submit(move || {
				let gate = gate.clone();
				async move {
					gate.acquire().await.expect("semaphore open").forget();
					Ok::<_, BackendError>(())
				}
			})
		})
		.collect();
	let stale = h.gateway.submit(|| async { Ok::<_, BackendError>(()) });
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(h.gateway.snapshot().queued, 1);

	let monitor = h.monitor.clone();
	let reconnect = tokio::spawn(async move { monitor.on_foreground().await });

	assert_eq!(stale.await, Err(GatewayError::Cancelled));
	gate.add_permits(2);
	for blocker in blockers {
		blocker.await.expect("in-flight work settles normally");
	}

	let report = reconnect.await.expect("foreground task");
	assert!(report.ok);
	assert_eq!(backend.refresh_count(), 1);
	assert!(h.monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn visibility_changes_trigger_reconnect() {
	let h = harness(signed_in(&FakeBackend::new()), 3, healthy);
	let _watch = h.monitor.watch_foreground();

	h.liveness.set_foreground(false);
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(h.monitor.last_report(), None);

	h.liveness.set_foreground(true);
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(h.monitor.last_report().is_some_and(|report| report.ok));
	assert!(h.monitor.is_running());
}
