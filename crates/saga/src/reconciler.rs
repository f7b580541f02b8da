//! Periodic recovery of sagas whose children never confirmed.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use saga_store::{SagaInstance, SagaRepository, SagaRepositoryExt};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::backoff::Backoff;
use crate::coordinator::{DispatchReport, FailureCause, SagaCoordinator};
use crate::error::Result;
use crate::services::{AuthService, LearnerService, OrderService};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub retried: usize,
    pub exhausted: usize,
    /// Another writer changed the saga between our read and our write.
    pub contended: usize,
    pub dispatches: Vec<DispatchReport>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.retried == 0 && self.exhausted == 0 && self.contended == 0
    }
}

enum Claim {
    Retry(SagaInstance),
    Exhausted,
    Contended,
}

/// Re-dispatches pending children of overdue sagas and gives up on sagas that
/// hit the attempt ceiling.
///
/// Several reconcilers may run against one store. Every claim is a
/// conditional write, so a saga is retried or failed by one of them only.
pub struct Reconciler<R, A, L, O> {
    coordinator: SagaCoordinator<R, A, L, O>,
    backoff: Backoff,
}

impl<R, A, L, O> Reconciler<R, A, L, O>
where
    R: SagaRepository + 'static,
    A: AuthService,
    L: LearnerService,
    O: OrderService,
{
    pub fn new(coordinator: SagaCoordinator<R, A, L, O>) -> Self {
        let config = coordinator.config();
        let backoff = config.backoff();
        Self {
            coordinator,
            backoff,
        }
    }

    /// Runs one reconciliation pass as of `now`.
    ///
    /// Re-dispatches started by the tick are joined before it returns.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let batch_size = self.coordinator.config().batch_size;
        let due = self
            .coordinator
            .repository()
            .find_due(now, batch_size)
            .await?;

        let mut report = TickReport {
            scanned: due.len(),
            ..TickReport::default()
        };
        let mut claimed = Vec::new();

        for saga in due {
            match self.claim(saga, now).await {
                Ok(Claim::Retry(saga)) => {
                    report.retried += 1;
                    claimed.push(saga);
                }
                Ok(Claim::Exhausted) => report.exhausted += 1,
                Ok(Claim::Contended) => report.contended += 1,
                Err(error) => tracing::error!(%error, "saga claim failed"),
            }
        }

        report.dispatches = join_all(claimed.iter().map(|saga| {
            let children = saga.pending_children();
            async move { self.coordinator.dispatch(saga, &children).await }
        }))
        .await;

        Ok(report)
    }

    async fn claim(&self, mut saga: SagaInstance, now: DateTime<Utc>) -> Result<Claim> {
        let max_attempts = self.coordinator.config().max_attempts;
        let exhausted = saga.attempt_count >= max_attempts;
        let cause = FailureCause::RetryExhausted {
            attempts: saga.attempt_count,
        };

        if exhausted {
            saga.fail(cause.to_string());
        } else {
            let retry_at = self
                .backoff
                .retry_at(saga.attempt_count.saturating_add(1), now);
            saga.record_attempt(now, retry_at)?;
        }

        match self.coordinator.repository().save(&mut saga).await {
            Ok(()) => {}
            Err(error) if error.is_conflict() => {
                tracing::debug!(correlation_id = %saga.correlation_id, "saga claimed elsewhere");
                return Ok(Claim::Contended);
            }
            Err(error) => return Err(error.into()),
        }

        if exhausted {
            self.coordinator.saga_failed(&saga, &cause).await;
            return Ok(Claim::Exhausted);
        }

        metrics::counter!("saga_retries_total", "saga_type" => saga.saga_type.as_str())
            .increment(1);
        tracing::info!(
            correlation_id = %saga.correlation_id,
            attempt = saga.attempt_count,
            pending = ?saga.pending_children(),
            "retrying saga"
        );
        Ok(Claim::Retry(saga))
    }

    /// Ticks on the configured interval until `shutdown` flips to true or
    /// its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.coordinator.config().reconcile_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("reconciler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(report) if report.is_idle() => {}
                        Ok(report) => tracing::info!(
                            scanned = report.scanned,
                            retried = report.retried,
                            exhausted = report.exhausted,
                            contended = report.contended,
                            "reconciler tick"
                        ),
                        Err(error) => tracing::error!(%error, "reconciler tick failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::CorrelationId;
    use common::messages::CreateUser;
    use saga_store::{ChildKind, InMemorySagaRepository, SagaState};

    use super::*;
    use crate::config::SagaConfig;
    use crate::services::{Behaviour, ScriptedServices};

    type TestReconciler =
        Reconciler<InMemorySagaRepository, ScriptedServices, ScriptedServices, ScriptedServices>;

    fn config() -> SagaConfig {
        SagaConfig {
            call_timeout: Duration::from_millis(100),
            stale_after: Duration::from_secs(10),
            backoff_max: Duration::from_secs(300),
            max_attempts: 3,
            ..SagaConfig::default()
        }
    }

    fn setup() -> (TestReconciler, InMemorySagaRepository, ScriptedServices) {
        let repository = InMemorySagaRepository::new();
        let services = ScriptedServices::new();
        let coordinator = SagaCoordinator::new(
            repository.clone(),
            services.clone(),
            services.clone(),
            services.clone(),
            config(),
        );
        (Reconciler::new(coordinator), repository, services)
    }

    fn john() -> CreateUser {
        CreateUser {
            correlation_id: CorrelationId::new(),
            first_name: "John".to_string(),
            last_name: "Test".to_string(),
            email: "me@test.com".to_string(),
            password: "p".to_string(),
        }
    }

    fn later(seconds: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(seconds)
    }

    #[tokio::test]
    async fn fresh_saga_is_not_scanned() {
        let (reconciler, _, services) = setup();
        services.set_behaviour(ChildKind::AuthUser, Behaviour::Drop).await;
        reconciler.coordinator.start_user_saga(john()).await.unwrap();
        reconciler.coordinator.wait_for_dispatches().await;

        let report = reconciler.tick(Utc::now()).await.unwrap();

        assert_eq!(report.scanned, 0);
        assert!(report.is_idle());
    }

    #[tokio::test]
    async fn retry_sends_only_pending_children() {
        let (reconciler, repository, services) = setup();
        services.script(ChildKind::OrderUser, [Behaviour::Drop]).await;
        let started = reconciler.coordinator.start_user_saga(john()).await.unwrap();
        reconciler.coordinator.wait_for_dispatches().await;

        let report = reconciler.tick(later(11)).await.unwrap();

        assert_eq!(report.retried, 1);
        assert_eq!(report.dispatches[0].confirmed, vec![ChildKind::OrderUser]);
        assert_eq!(services.call_count(ChildKind::AuthUser).await, 1);
        assert_eq!(services.call_count(ChildKind::OrderUser).await, 2);
        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.state, SagaState::Completed);
        assert_eq!(saga.attempt_count, 2);
    }

    #[tokio::test]
    async fn backoff_doubles_between_retries() {
        let (reconciler, _, services) = setup();
        services.set_behaviour(ChildKind::AuthUser, Behaviour::Drop).await;
        reconciler.coordinator.start_user_saga(john()).await.unwrap();
        reconciler.coordinator.wait_for_dispatches().await;

        let first = reconciler.tick(later(11)).await.unwrap();
        assert_eq!(first.retried, 1);

        // second retry waits 20s after the first retry
        let early = reconciler.tick(later(11 + 15)).await.unwrap();
        assert_eq!(early.scanned, 0);
        let due = reconciler.tick(later(11 + 21)).await.unwrap();
        assert_eq!(due.retried, 1);
    }

    #[tokio::test]
    async fn ceiling_fails_saga_once() {
        let (reconciler, repository, services) = setup();
        for kind in [ChildKind::AuthUser, ChildKind::LearnerUser, ChildKind::OrderUser] {
            services.set_behaviour(kind, Behaviour::Drop).await;
        }
        let started = reconciler.coordinator.start_user_saga(john()).await.unwrap();
        reconciler.coordinator.wait_for_dispatches().await;

        // attempts 2 and 3, then the ceiling of 3 is hit
        assert_eq!(reconciler.tick(later(11)).await.unwrap().retried, 1);
        assert_eq!(reconciler.tick(later(40)).await.unwrap().retried, 1);
        let last = reconciler.tick(later(200)).await.unwrap();
        assert_eq!(last.exhausted, 1);

        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.state, SagaState::Failed);
        assert!(saga.failure_reason.unwrap().contains("exhausted"));

        let after = reconciler.tick(later(1000)).await.unwrap();
        assert_eq!(after.scanned, 0);
        assert_eq!(services.call_count(ChildKind::AuthUser).await, 3);
    }

    #[tokio::test]
    async fn two_reconcilers_fail_a_saga_exactly_once() {
        let (first, repository, services) = setup();
        for kind in [ChildKind::AuthUser, ChildKind::LearnerUser, ChildKind::OrderUser] {
            services.set_behaviour(kind, Behaviour::Drop).await;
        }
        let second = Reconciler::new(first.coordinator.clone());

        let now = Utc::now();
        let mut saga = SagaInstance::start(
            CorrelationId::new(),
            crate::commands::user_payload(&john()).unwrap(),
            now,
        );
        saga.begin_awaiting(now, now).unwrap();
        saga.attempt_count = 3;
        repository.insert_new(&mut saga).await.unwrap();

        let at = later(1000);
        let (a, b) = tokio::join!(first.tick(at), second.tick(at));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.exhausted + b.exhausted, 1);
        assert_eq!(a.retried + b.retried, 0);
        let stored = repository.get(saga.correlation_id).await.unwrap().unwrap();
        assert_eq!(stored.state, SagaState::Failed);
        assert_eq!(stored.attempt_count, 3);
    }

    #[tokio::test]
    async fn due_saga_is_not_starved_by_backing_off_sagas() {
        let repository = InMemorySagaRepository::new();
        let services = ScriptedServices::new();
        let coordinator = SagaCoordinator::new(
            repository.clone(),
            services.clone(),
            services.clone(),
            services.clone(),
            SagaConfig {
                batch_size: 1,
                max_attempts: 5,
                ..config()
            },
        );
        let reconciler = Reconciler::new(coordinator);
        let now = Utc::now();
        let ago = |seconds| now - chrono::Duration::seconds(seconds);

        // older attempt, but its next round is still 30s away
        let mut backing_off = SagaInstance::start(
            CorrelationId::new(),
            crate::commands::user_payload(&john()).unwrap(),
            ago(60),
        );
        backing_off.begin_awaiting(ago(60), ago(50)).unwrap();
        backing_off
            .record_attempt(ago(45), now + chrono::Duration::seconds(30))
            .unwrap();
        repository.insert_new(&mut backing_off).await.unwrap();

        let mut due = SagaInstance::start(
            CorrelationId::new(),
            crate::commands::user_payload(&john()).unwrap(),
            ago(20),
        );
        due.begin_awaiting(ago(20), ago(10)).unwrap();
        repository.insert_new(&mut due).await.unwrap();

        let report = reconciler.tick(now).await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.retried, 1);
        let retried = repository.get(due.correlation_id).await.unwrap().unwrap();
        assert_eq!(retried.attempt_count, 2);
        assert_eq!(retried.state, SagaState::Completed);
        let untouched = repository
            .get(backing_off.correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.attempt_count, 2);
        assert_eq!(untouched.version, backing_off.version);
    }

    #[tokio::test]
    async fn retry_schedules_next_round_from_attempt_count() {
        let (reconciler, repository, services) = setup();
        services.set_behaviour(ChildKind::AuthUser, Behaviour::Drop).await;
        let started = reconciler.coordinator.start_user_saga(john()).await.unwrap();
        reconciler.coordinator.wait_for_dispatches().await;

        let at = later(11);
        reconciler.tick(at).await.unwrap();

        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.attempt_count, 2);
        assert_eq!(saga.last_attempt_at, at);
        assert_eq!(saga.next_attempt_at, at + chrono::Duration::seconds(20));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (reconciler, _, _) = setup();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(reconciler.run(rx));
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
