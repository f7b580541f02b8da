//! Saga coordinator for user and course creation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::messages::{
    CreateCourse, CreateCourseSagaStarted, CreateUser, CreateUserSagaStarted,
    SendOrchestratorStatus,
};
use common::{AggregateId, CorrelationId, ServiceStatus};
use futures_util::future::join_all;
use saga_store::{
    ChildKind, Confirmation, SagaInstance, SagaPayload, SagaRepository, SagaRepositoryExt,
    StoreError,
};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};

use crate::commands::{self, ChildCommand};
use crate::config::SagaConfig;
use crate::error::{ChildCallError, Result, SagaError};
use crate::services::{AuthService, LearnerService, OrderService};

/// Bound on the orchestrator's own store check.
const STATUS_CHECK_BOUND: Duration = Duration::from_secs(2);

/// Why a saga was moved to Failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// A service refused one of the children.
    Rejected { child: ChildKind, reason: String },
    /// The attempt ceiling was reached with children still pending.
    RetryExhausted { attempts: u32 },
}

impl FailureCause {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            FailureCause::Rejected { .. } => "rejected",
            FailureCause::RetryExhausted { .. } => "retry_exhausted",
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Rejected { child, reason } => write!(f, "{child} rejected: {reason}"),
            FailureCause::RetryExhausted { attempts } => {
                write!(f, "retry limit of {attempts} attempts exhausted")
            }
        }
    }
}

/// Runs once for every saga that reaches Failed.
///
/// Children that already confirmed are not rolled back automatically. A hook
/// is where compensation would be plugged in.
#[async_trait]
pub trait FailureHook: Send + Sync + 'static {
    async fn saga_failed(&self, saga: &SagaInstance, cause: &FailureCause);
}

/// What one dispatch round achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub correlation_id: CorrelationId,
    pub confirmed: Vec<ChildKind>,
    /// Timed out or undeliverable. Left for the reconciler.
    pub pending: Vec<ChildKind>,
    pub rejected: Vec<ChildKind>,
    /// Replied, but the saga could not be updated.
    pub errors: Vec<ChildKind>,
}

impl DispatchReport {
    fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            confirmed: Vec::new(),
            pending: Vec::new(),
            rejected: Vec::new(),
            errors: Vec::new(),
        }
    }
}

enum ChildOutcome {
    Confirmed,
    Pending,
    Rejected,
    Error,
}

/// Opens sagas, fans their child commands out and records the replies.
///
/// Saga state is never guarded by an in-process lock. Every mutation is a
/// conditional write on the row version, re-read and re-applied on conflict.
/// Dispatches run detached from the caller but are owned by the coordinator's
/// join set.
pub struct SagaCoordinator<R, A, L, O> {
    repository: Arc<R>,
    auth: Arc<A>,
    learner: Arc<L>,
    order: Arc<O>,
    config: SagaConfig,
    failure_hook: Option<Arc<dyn FailureHook>>,
    dispatches: Arc<Mutex<JoinSet<DispatchReport>>>,
}

impl<R, A, L, O> Clone for SagaCoordinator<R, A, L, O> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            auth: Arc::clone(&self.auth),
            learner: Arc::clone(&self.learner),
            order: Arc::clone(&self.order),
            config: self.config.clone(),
            failure_hook: self.failure_hook.clone(),
            dispatches: Arc::clone(&self.dispatches),
        }
    }
}

impl<R, A, L, O> SagaCoordinator<R, A, L, O>
where
    R: SagaRepository + 'static,
    A: AuthService,
    L: LearnerService,
    O: OrderService,
{
    /// Creates a new saga coordinator.
    pub fn new(repository: R, auth: A, learner: L, order: O, config: SagaConfig) -> Self {
        Self {
            repository: Arc::new(repository),
            auth: Arc::new(auth),
            learner: Arc::new(learner),
            order: Arc::new(order),
            config,
            failure_hook: None,
            dispatches: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn with_failure_hook(mut self, hook: Arc<dyn FailureHook>) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Opens a CreateUser saga and acknowledges it without waiting for children.
    ///
    /// Redelivering the same request returns the acknowledgment of the saga it
    /// opened the first time.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.correlation_id))]
    pub async fn start_user_saga(&self, request: CreateUser) -> Result<CreateUserSagaStarted> {
        let payload = commands::user_payload(&request)?;
        let saga = self.open(request.correlation_id, payload).await?;
        commands::user_started(&saga)
    }

    /// Opens a CreateCourse saga. The request's leading id is its request key.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.aggregate_id))]
    pub async fn start_course_saga(
        &self,
        request: CreateCourse,
    ) -> Result<CreateCourseSagaStarted> {
        let payload = commands::course_payload(&request)?;
        let saga = self
            .open(commands::course_request_id(&request), payload)
            .await?;
        commands::course_started(&saga)
    }

    async fn open(&self, request_id: CorrelationId, payload: SagaPayload) -> Result<SagaInstance> {
        if let Some(existing) = self.repository.find_by_request(request_id).await? {
            tracing::info!(
                correlation_id = %existing.correlation_id,
                state = existing.state.as_str(),
                "duplicate request, returning existing saga"
            );
            return Ok(existing);
        }

        let now = Utc::now();
        let mut saga = SagaInstance::start(request_id, payload, now);
        saga.begin_awaiting(now, self.config.backoff().retry_at(1, now))?;

        match self.repository.insert_new(&mut saga).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(constraint)) => {
                // A concurrent delivery of the same request won the insert.
                return match self.repository.find_by_request(request_id).await? {
                    Some(existing) => Ok(existing),
                    None => Err(StoreError::Duplicate(constraint).into()),
                };
            }
            Err(error) => return Err(error.into()),
        }

        metrics::counter!("saga_started_total", "saga_type" => saga.saga_type.as_str())
            .increment(1);
        tracing::info!(
            correlation_id = %saga.correlation_id,
            aggregate_id = %saga.aggregate_id,
            saga_type = saga.saga_type.as_str(),
            "saga started"
        );

        self.spawn_dispatch(saga.clone()).await;
        Ok(saga)
    }

    async fn spawn_dispatch(&self, saga: SagaInstance) {
        let this = self.clone();
        let mut dispatches = self.dispatches.lock().await;
        while let Some(finished) = dispatches.try_join_next() {
            log_finished(finished);
        }
        dispatches.spawn(async move {
            let children = saga.pending_children();
            this.dispatch(&saga, &children).await
        });
    }

    /// Waits for every dispatch started so far and returns their reports.
    pub async fn wait_for_dispatches(&self) -> Vec<DispatchReport> {
        let mut dispatches = std::mem::take(&mut *self.dispatches.lock().await);
        let mut reports = Vec::with_capacity(dispatches.len());
        while let Some(finished) = dispatches.join_next().await {
            if let Some(report) = log_finished(finished) {
                reports.push(report);
            }
        }
        reports
    }

    /// Sends one command per child in parallel and records each reply.
    ///
    /// Returns once every call has replied or timed out.
    #[tracing::instrument(
        skip(self, saga, children),
        fields(correlation_id = %saga.correlation_id, attempt = saga.attempt_count)
    )]
    pub async fn dispatch(&self, saga: &SagaInstance, children: &[ChildKind]) -> DispatchReport {
        let outcomes = join_all(
            children
                .iter()
                .map(|&child| async move { (child, self.settle_child(saga, child).await) }),
        )
        .await;

        let mut report = DispatchReport::new(saga.correlation_id);
        for (child, outcome) in outcomes {
            match outcome {
                ChildOutcome::Confirmed => report.confirmed.push(child),
                ChildOutcome::Pending => report.pending.push(child),
                ChildOutcome::Rejected => report.rejected.push(child),
                ChildOutcome::Error => report.errors.push(child),
            }
        }
        report
    }

    async fn settle_child(&self, saga: &SagaInstance, child: ChildKind) -> ChildOutcome {
        let command = match ChildCommand::build(saga, child) {
            Ok(command) => command,
            Err(error) => {
                tracing::error!(%error, child = child.as_str(), "cannot build child command");
                return ChildOutcome::Error;
            }
        };

        match self.call_child(command).await {
            Ok(()) => match self.apply_confirmation(saga.correlation_id, child).await {
                Ok(_) => ChildOutcome::Confirmed,
                Err(error) => {
                    tracing::error!(%error, child = child.as_str(), "confirmation not recorded");
                    ChildOutcome::Error
                }
            },
            Err(ChildCallError::Rejected(reason)) => {
                let cause = FailureCause::Rejected { child, reason };
                match self.fail_saga(saga.correlation_id, cause).await {
                    Ok(_) => ChildOutcome::Rejected,
                    Err(error) => {
                        tracing::error!(%error, child = child.as_str(), "rejection not recorded");
                        ChildOutcome::Error
                    }
                }
            }
            Err(error) => {
                if matches!(error, ChildCallError::TimedOut(_)) {
                    metrics::counter!("saga_child_timeouts_total", "child" => child.as_str())
                        .increment(1);
                }
                tracing::warn!(%error, child = child.as_str(), "child left pending");
                ChildOutcome::Pending
            }
        }
    }

    async fn call_child(&self, command: ChildCommand) -> std::result::Result<(), ChildCallError> {
        let timeout = self.config.call_timeout;
        tokio::time::timeout(timeout, self.send(command))
            .await
            .unwrap_or(Err(ChildCallError::TimedOut(timeout)))
    }

    async fn send(&self, command: ChildCommand) -> std::result::Result<(), ChildCallError> {
        match command {
            ChildCommand::AuthUser(command) => {
                let expected = command.correlation_id;
                let reply = self.auth.create_user(command).await?;
                check_reply(expected, reply.correlation_id)
            }
            ChildCommand::LearnerUser(command) => {
                let expected = command.correlation_id;
                let reply = self.learner.create_user(command).await?;
                check_reply(expected, reply.correlation_id)
            }
            ChildCommand::OrderUser(command) => {
                let expected = command.correlation_id;
                let reply = self.order.create_user(command).await?;
                check_reply(expected, reply.correlation_id)
            }
            ChildCommand::LearnerCourse(command) => {
                let (expected, aggregate_id) = (command.correlation_id, command.aggregate_id);
                let reply = self.learner.create_course(command).await?;
                check_reply(expected, reply.correlation_id)?;
                check_aggregate(aggregate_id, reply.aggregate_id)
            }
            ChildCommand::OrderCourse(command) => {
                let (expected, aggregate_id) = (command.correlation_id, command.aggregate_id);
                let reply = self.order.create_course(command).await?;
                check_reply(expected, reply.correlation_id)?;
                check_aggregate(aggregate_id, reply.aggregate_id)
            }
        }
    }

    /// Records a child's confirmation. Completes the saga on the last one.
    ///
    /// Confirmations for terminal sagas and repeated confirmations are
    /// accepted and change nothing.
    #[tracing::instrument(skip(self), fields(child = child.as_str()))]
    pub async fn apply_confirmation(
        &self,
        correlation_id: CorrelationId,
        child: ChildKind,
    ) -> Result<Confirmation> {
        let (confirmation, saga) = self
            .modify(correlation_id, |saga| {
                let confirmation = saga.confirm(child)?;
                Ok((confirmation, confirmation.is_change()))
            })
            .await?;

        match confirmation {
            Confirmation::Recorded => {
                metrics::counter!("saga_confirmations_total", "child" => child.as_str())
                    .increment(1);
                tracing::debug!("confirmation recorded");
            }
            Confirmation::Completed => {
                metrics::counter!("saga_confirmations_total", "child" => child.as_str())
                    .increment(1);
                metrics::counter!("saga_completed_total", "saga_type" => saga.saga_type.as_str())
                    .increment(1);
                metrics::histogram!("saga_duration_seconds").record(elapsed_seconds(&saga));
                tracing::info!(
                    aggregate_id = %saga.aggregate_id,
                    attempts = saga.attempt_count,
                    "saga completed"
                );
            }
            Confirmation::Duplicate | Confirmation::Discarded => {
                tracing::debug!(?confirmation, "confirmation ignored");
            }
        }
        Ok(confirmation)
    }

    /// Moves a saga to Failed. Returns false if it was already terminal.
    #[tracing::instrument(skip(self, cause), fields(cause = cause.label()))]
    pub async fn fail_saga(&self, correlation_id: CorrelationId, cause: FailureCause) -> Result<bool> {
        let reason = cause.to_string();
        let (failed, saga) = self
            .modify(correlation_id, |saga| {
                let failed = saga.fail(reason.as_str());
                Ok((failed, failed))
            })
            .await?;

        if failed {
            self.saga_failed(&saga, &cause).await;
        }
        Ok(failed)
    }

    /// Bookkeeping after a Failed transition has been written.
    pub(crate) async fn saga_failed(&self, saga: &SagaInstance, cause: &FailureCause) {
        metrics::counter!("saga_failed_total", "reason" => cause.label()).increment(1);
        metrics::histogram!("saga_duration_seconds").record(elapsed_seconds(saga));

        if saga.confirmed_children.is_empty() {
            tracing::warn!(correlation_id = %saga.correlation_id, %cause, "saga failed");
        } else {
            let confirmed: Vec<&str> = saga.confirmed_children.iter().map(|c| c.as_str()).collect();
            tracing::warn!(
                correlation_id = %saga.correlation_id,
                aggregate_id = %saga.aggregate_id,
                %cause,
                ?confirmed,
                "saga failed with confirmed children; they are not rolled back"
            );
        }

        if let Some(hook) = &self.failure_hook {
            hook.saga_failed(saga, cause).await;
        }
    }

    /// Reads, changes and conditionally writes a saga, re-reading on conflict.
    ///
    /// `change` returns its outcome and whether anything needs writing.
    async fn modify<T, F>(&self, correlation_id: CorrelationId, mut change: F) -> Result<(T, SagaInstance)>
    where
        T: Send,
        F: FnMut(&mut SagaInstance) -> Result<(T, bool)> + Send,
    {
        let attempts = self.config.max_update_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let mut saga = self
                .repository
                .get(correlation_id)
                .await?
                .ok_or(SagaError::NotFound(correlation_id))?;

            let (outcome, changed) = change(&mut saga)?;
            if !changed {
                return Ok((outcome, saga));
            }

            match self.repository.save(&mut saga).await {
                Ok(()) => return Ok((outcome, saga)),
                Err(error) if error.is_conflict() => {
                    tracing::debug!(attempt, "version conflict, re-reading saga");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(SagaError::ContentionExhausted {
            correlation_id,
            attempts,
        })
    }

    pub async fn get_saga(&self, correlation_id: CorrelationId) -> Result<Option<SagaInstance>> {
        Ok(self.repository.get(correlation_id).await?)
    }

    pub async fn get_saga_by_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<SagaInstance>> {
        Ok(self.repository.find_by_aggregate(aggregate_id).await?)
    }

    /// RUNNING when the saga store answers within its bound, DEGRADED otherwise.
    pub async fn orchestrator_status(&self, correlation_id: CorrelationId) -> SendOrchestratorStatus {
        let status = match tokio::time::timeout(STATUS_CHECK_BOUND, self.repository.ping()).await {
            Ok(Ok(())) => ServiceStatus::Running,
            Ok(Err(error)) => {
                tracing::warn!(%error, "saga store check failed");
                ServiceStatus::Degraded
            }
            Err(_) => {
                tracing::warn!(bound = ?STATUS_CHECK_BOUND, "saga store check timed out");
                ServiceStatus::Degraded
            }
        };

        SendOrchestratorStatus {
            correlation_id,
            status,
        }
    }
}

fn check_reply(
    expected: CorrelationId,
    actual: CorrelationId,
) -> std::result::Result<(), ChildCallError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ChildCallError::Transport(format!(
            "reply correlation {actual} does not match {expected}"
        )))
    }
}

fn check_aggregate(
    expected: AggregateId,
    actual: AggregateId,
) -> std::result::Result<(), ChildCallError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ChildCallError::Transport(format!(
            "reply aggregate {actual} does not match {expected}"
        )))
    }
}

fn elapsed_seconds(saga: &SagaInstance) -> f64 {
    (Utc::now() - saga.created_at)
        .to_std()
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

fn log_finished(
    finished: std::result::Result<DispatchReport, JoinError>,
) -> Option<DispatchReport> {
    match finished {
        Ok(report) => {
            tracing::debug!(
                correlation_id = %report.correlation_id,
                confirmed = report.confirmed.len(),
                pending = report.pending.len(),
                "dispatch finished"
            );
            Some(report)
        }
        Err(error) => {
            tracing::error!(%error, "dispatch task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use saga_store::{InMemorySagaRepository, SagaState};

    use super::*;
    use crate::services::{Behaviour, ScriptedServices};

    type TestCoordinator = SagaCoordinator<
        InMemorySagaRepository,
        ScriptedServices,
        ScriptedServices,
        ScriptedServices,
    >;

    fn config() -> SagaConfig {
        SagaConfig {
            call_timeout: Duration::from_millis(200),
            ..SagaConfig::default()
        }
    }

    fn coordinator() -> (TestCoordinator, InMemorySagaRepository, ScriptedServices) {
        let repository = InMemorySagaRepository::new();
        let services = ScriptedServices::new();
        let coordinator = SagaCoordinator::new(
            repository.clone(),
            services.clone(),
            services.clone(),
            services.clone(),
            config(),
        );
        (coordinator, repository, services)
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

    fn course() -> CreateCourse {
        CreateCourse {
            aggregate_id: AggregateId::new(),
            title: "Rust".to_string(),
            description: "Ownership".to_string(),
            price: 100,
        }
    }

    /// Persists a saga without dispatching it.
    async fn seeded(repository: &InMemorySagaRepository) -> SagaInstance {
        let now = Utc::now();
        let mut saga = SagaInstance::start(
            CorrelationId::new(),
            commands::user_payload(&john()).unwrap(),
            now,
        );
        saga.begin_awaiting(now, now + chrono::Duration::seconds(10))
            .unwrap();
        repository.insert_new(&mut saga).await.unwrap();
        saga
    }

    #[tokio::test]
    async fn saga_is_persisted_before_acknowledgment() {
        let (coordinator, repository, services) = coordinator();
        services.set_behaviour(ChildKind::AuthUser, Behaviour::Hang).await;

        let started = coordinator.start_user_saga(john()).await.unwrap();

        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.aggregate_id, started.aggregate_id);
        assert_eq!(saga.attempt_count, 1);
        assert_eq!(
            saga.next_attempt_at - saga.last_attempt_at,
            chrono::Duration::seconds(10)
        );
        assert!(!saga.is_terminal());
    }

    #[tokio::test]
    async fn invalid_request_persists_nothing() {
        let (coordinator, repository, services) = coordinator();
        let mut request = john();
        request.email = "nobody".to_string();

        let result = coordinator.start_user_saga(request).await;

        assert!(matches!(result, Err(SagaError::Validation(_))));
        assert_eq!(repository.saga_count().await, 0);
        assert!(services.calls().await.is_empty());
    }

    #[tokio::test]
    async fn user_saga_completes_when_all_children_confirm() {
        let (coordinator, repository, services) = coordinator();

        let started = coordinator.start_user_saga(john()).await.unwrap();
        let reports = coordinator.wait_for_dispatches().await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].confirmed.len(), 3);
        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.state, SagaState::Completed);

        for call in services.calls().await {
            assert_eq!(call.correlation_id, started.correlation_id);
            assert_eq!(call.aggregate_id, started.aggregate_id);
        }
    }

    #[tokio::test]
    async fn each_saga_gets_its_own_aggregate_id() {
        let (coordinator, _repository, services) = coordinator();
        let other = CreateUser {
            correlation_id: CorrelationId::new(),
            email: "jane@test.com".to_string(),
            ..john()
        };

        let first = coordinator.start_user_saga(john()).await.unwrap();
        let second = coordinator.start_user_saga(other).await.unwrap();
        coordinator.wait_for_dispatches().await;

        assert_ne!(first.aggregate_id, second.aggregate_id);
        for started in [&first, &second] {
            let calls: Vec<_> = services
                .calls()
                .await
                .into_iter()
                .filter(|call| call.correlation_id == started.correlation_id)
                .collect();
            assert_eq!(calls.len(), 3);
            assert!(calls.iter().all(|call| call.aggregate_id == started.aggregate_id));
        }
    }

    #[tokio::test]
    async fn course_saga_dispatches_two_children() {
        let (coordinator, _repository, services) = coordinator();
        let request = course();

        let started = coordinator.start_course_saga(request.clone()).await.unwrap();
        coordinator.wait_for_dispatches().await;

        assert_ne!(started.aggregate_id, request.aggregate_id);
        assert_eq!(services.call_count(ChildKind::LearnerCourse).await, 1);
        assert_eq!(services.call_count(ChildKind::OrderCourse).await, 1);
        let saga = coordinator
            .get_saga_by_aggregate(started.aggregate_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saga.state, SagaState::Completed);
    }

    #[tokio::test]
    async fn redelivered_request_returns_same_saga() {
        let (coordinator, repository, services) = coordinator();
        let request = john();

        let first = coordinator.start_user_saga(request.clone()).await.unwrap();
        let second = coordinator.start_user_saga(request).await.unwrap();
        coordinator.wait_for_dispatches().await;

        assert_eq!(first, second);
        assert_eq!(repository.saga_count().await, 1);
        assert_eq!(services.call_count(ChildKind::AuthUser).await, 1);
    }

    #[tokio::test]
    async fn rejection_fails_saga() {
        let (coordinator, repository, services) = coordinator();
        services.set_behaviour(ChildKind::AuthUser, Behaviour::Reject).await;

        let started = coordinator.start_user_saga(john()).await.unwrap();
        let reports = coordinator.wait_for_dispatches().await;

        assert_eq!(reports[0].rejected, vec![ChildKind::AuthUser]);
        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.state, SagaState::Failed);
        assert!(saga.failure_reason.unwrap().contains("AuthUser"));
    }

    #[tokio::test]
    async fn timeout_leaves_child_pending() {
        let (coordinator, repository, services) = coordinator();
        services.set_behaviour(ChildKind::OrderUser, Behaviour::Hang).await;

        let started = coordinator.start_user_saga(john()).await.unwrap();
        let reports = coordinator.wait_for_dispatches().await;

        assert_eq!(reports[0].pending, vec![ChildKind::OrderUser]);
        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.state, SagaState::AwaitingChildren);
        assert_eq!(saga.pending_children(), vec![ChildKind::OrderUser]);
    }

    #[tokio::test]
    async fn mismatched_reply_counts_as_transport_failure() {
        let (coordinator, repository, services) = coordinator();
        services
            .set_behaviour(ChildKind::LearnerUser, Behaviour::Misreply)
            .await;

        let started = coordinator.start_user_saga(john()).await.unwrap();
        let reports = coordinator.wait_for_dispatches().await;

        assert_eq!(reports[0].pending, vec![ChildKind::LearnerUser]);
        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert!(!saga.confirmed_children.contains(&ChildKind::LearnerUser));
    }

    #[tokio::test]
    async fn completion_is_independent_of_arrival_order() {
        let orders = [
            [ChildKind::AuthUser, ChildKind::LearnerUser, ChildKind::OrderUser],
            [ChildKind::AuthUser, ChildKind::OrderUser, ChildKind::LearnerUser],
            [ChildKind::LearnerUser, ChildKind::AuthUser, ChildKind::OrderUser],
            [ChildKind::LearnerUser, ChildKind::OrderUser, ChildKind::AuthUser],
            [ChildKind::OrderUser, ChildKind::AuthUser, ChildKind::LearnerUser],
            [ChildKind::OrderUser, ChildKind::LearnerUser, ChildKind::AuthUser],
        ];

        for order in orders {
            let (coordinator, repository, _) = coordinator();
            let saga = seeded(&repository).await;

            for (i, child) in order.into_iter().enumerate() {
                let confirmation = coordinator
                    .apply_confirmation(saga.correlation_id, child)
                    .await
                    .unwrap();
                let expected = if i == 2 {
                    Confirmation::Completed
                } else {
                    Confirmation::Recorded
                };
                assert_eq!(confirmation, expected, "order {order:?}");
            }
        }
    }

    #[tokio::test]
    async fn repeated_confirmation_changes_state_once() {
        let (coordinator, repository, _) = coordinator();
        let saga = seeded(&repository).await;

        let first = coordinator
            .apply_confirmation(saga.correlation_id, ChildKind::AuthUser)
            .await
            .unwrap();
        let version = repository.get(saga.correlation_id).await.unwrap().unwrap().version;
        let second = coordinator
            .apply_confirmation(saga.correlation_id, ChildKind::AuthUser)
            .await
            .unwrap();

        assert_eq!(first, Confirmation::Recorded);
        assert_eq!(second, Confirmation::Duplicate);
        let stored = repository.get(saga.correlation_id).await.unwrap().unwrap();
        assert_eq!(stored.version, version);
        assert_eq!(stored.confirmed_children.len(), 1);
    }

    #[tokio::test]
    async fn confirmation_after_failure_is_discarded() {
        let (coordinator, repository, _) = coordinator();
        let saga = seeded(&repository).await;
        coordinator
            .fail_saga(saga.correlation_id, FailureCause::RetryExhausted { attempts: 5 })
            .await
            .unwrap();

        let confirmation = coordinator
            .apply_confirmation(saga.correlation_id, ChildKind::AuthUser)
            .await
            .unwrap();

        assert_eq!(confirmation, Confirmation::Discarded);
        let stored = repository.get(saga.correlation_id).await.unwrap().unwrap();
        assert_eq!(stored.state, SagaState::Failed);
        assert!(stored.confirmed_children.is_empty());
    }

    #[tokio::test]
    async fn unexpected_child_is_an_error() {
        let (coordinator, repository, _) = coordinator();
        let saga = seeded(&repository).await;

        let result = coordinator
            .apply_confirmation(saga.correlation_id, ChildKind::LearnerCourse)
            .await;

        assert!(matches!(result, Err(SagaError::Instance(_))));
    }

    #[tokio::test]
    async fn concurrent_confirmations_all_land() {
        let (coordinator, repository, _) = coordinator();
        let saga = seeded(&repository).await;

        let mut tasks = JoinSet::new();
        for child in saga.pending_children() {
            let coordinator = coordinator.clone();
            let id = saga.correlation_id;
            tasks.spawn(async move { coordinator.apply_confirmation(id, child).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        let stored = repository.get(saga.correlation_id).await.unwrap().unwrap();
        assert_eq!(stored.state, SagaState::Completed);
    }

    #[tokio::test]
    async fn failing_twice_reports_once() {
        struct Counting(AtomicUsize);

        #[async_trait]
        impl FailureHook for Counting {
            async fn saga_failed(&self, _saga: &SagaInstance, _cause: &FailureCause) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (coordinator, repository, _) = coordinator();
        let hook = Arc::new(Counting(AtomicUsize::new(0)));
        let coordinator = coordinator.with_failure_hook(hook.clone());
        let saga = seeded(&repository).await;
        let cause = FailureCause::RetryExhausted { attempts: 5 };

        assert!(coordinator.fail_saga(saga.correlation_id, cause.clone()).await.unwrap());
        assert!(!coordinator.fail_saga(saga.correlation_id, cause).await.unwrap());
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_saga_is_not_found() {
        let (coordinator, _, _) = coordinator();
        let id = CorrelationId::new();

        let result = coordinator.apply_confirmation(id, ChildKind::AuthUser).await;

        assert!(matches!(result, Err(SagaError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn orchestrator_status_follows_store() {
        let (coordinator, repository, _) = coordinator();
        let id = CorrelationId::new();

        let status = coordinator.orchestrator_status(id).await;
        assert_eq!(status.correlation_id, id);
        assert_eq!(status.status, ServiceStatus::Running);

        repository.set_unavailable(true);
        let status = coordinator.orchestrator_status(id).await;
        assert_eq!(status.status, ServiceStatus::Degraded);
    }

    #[test]
    fn failure_cause_reads_well() {
        let cause = FailureCause::Rejected {
            child: ChildKind::AuthUser,
            reason: "email taken".to_string(),
        };
        assert_eq!(cause.to_string(), "AuthUser rejected: email taken");
        assert_eq!(
            FailureCause::RetryExhausted { attempts: 5 }.to_string(),
            "retry limit of 5 attempts exhausted"
        );
    }
}
