//! Pipeline harness and fake integrations for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use order_fulfillment::{
    app_state::AppState,
    db::{InMemoryOrderRepository, OrderAccess, OrderRepository},
    handlers::HandlerRegistry,
    models::job::{AnalyticsPayload, Job, PaymentPayload, TaskType},
    services::{
        integrations::{
            AnalyticsSink, InMemoryInventory, IntegrationError, Integrations, PaymentGateway,
            SequentialTrackingNumbers, SimulatedLatency,
        },
        order_service::OrderService,
        producer::TaskProducer,
        queue::{Broker, InMemoryBroker},
        retry::RetryPolicy,
        worker::{JobOutcome, WorkerPool},
    },
};

/// Gateway that declines every charge and counts the attempts.
#[derive(Default)]
pub struct DecliningGateway {
    pub attempts: AtomicU32,
}

#[async_trait]
impl PaymentGateway for DecliningGateway {
    async fn charge(&self, _payment: &PaymentPayload) -> Result<String, IntegrationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(IntegrationError::Unavailable("card declined".to_string()))
    }
}

/// Analytics sink that is always down.
pub struct BrokenAnalytics;

#[async_trait]
impl AnalyticsSink for BrokenAnalytics {
    async fn track(&self, _event: &AnalyticsPayload) -> Result<(), IntegrationError> {
        Err(IntegrationError::Unavailable("collector offline".to_string()))
    }
}

/// Everything needed to drive orders through the pipeline in-process.
pub struct Pipeline {
    pub repository: Arc<dyn OrderRepository>,
    pub broker: Arc<InMemoryBroker>,
    pub inventory: Arc<InMemoryInventory>,
    pub service: OrderService,
    pub pool: WorkerPool,
}

pub struct PipelineBuilder {
    integrations: Integrations,
    inventory: Arc<InMemoryInventory>,
    concurrency: usize,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        let mut integrations = Integrations::simulated(SimulatedLatency::none());
        let inventory = Arc::new(InMemoryInventory::new(Duration::ZERO));
        integrations.inventory = inventory.clone();
        integrations.tracking = Arc::new(SequentialTrackingNumbers::new());
        Self {
            integrations,
            inventory,
            concurrency: 4,
        }
    }

    pub fn payments(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.integrations.payments = gateway;
        self
    }

    pub fn analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.integrations.analytics = sink;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn build(self) -> Pipeline {
        let repository: Arc<dyn OrderRepository> = Arc::new(InMemoryOrderRepository::new());
        let broker = Arc::new(InMemoryBroker::default());
        let service = OrderService::new(repository.clone(), TaskProducer::new(broker.clone()));
        let pool = WorkerPool::new(
            broker.clone(),
            HandlerRegistry::standard(&self.integrations),
            OrderAccess::new(repository.clone()),
            RetryPolicy::default().without_jitter(),
            self.concurrency,
        );
        Pipeline {
            repository,
            broker,
            inventory: self.inventory,
            service,
            pool,
        }
    }
}

impl Pipeline {
    pub fn app_state(&self) -> AppState {
        AppState::new(self.repository.clone(), self.broker.clone())
    }

    /// Take jobs one at a time and process them until the broker is empty,
    /// returning every `(task_type, outcome)` in execution order. Delayed
    /// retries are waited for, so run under paused time.
    pub async fn drain(&self) -> Vec<(String, JobOutcome)> {
        let mut outcomes = Vec::new();
        while self.broker.pending().await.unwrap_or(0) > 0 {
            let job = self.broker.take().await;
            let task_type = job.task_type.clone();
            outcomes.push((task_type, self.pool.process(job).await));
        }
        outcomes
    }

    /// Process only the jobs of `task_type`, leaving the rest queued.
    pub async fn drain_only(&self, task_type: TaskType) -> Vec<JobOutcome> {
        let mut kept: Vec<Job> = Vec::new();
        let mut outcomes = Vec::new();
        while self.broker.pending().await.unwrap_or(0) > 0 {
            let job = self.broker.take().await;
            if job.task_type == task_type.to_string() {
                outcomes.push(self.pool.process(job).await);
            } else {
                kept.push(job);
            }
        }
        for job in kept {
            self.broker
                .submit(job, Duration::ZERO)
                .await
                .expect("in-memory submit cannot fail");
        }
        outcomes
    }
}

impl Pipeline {
    /// Take jobs until one of `task_type` turns up, process just that one and
    /// put the others back.
    pub async fn process_next(&self, task_type: TaskType) -> JobOutcome {
        let mut kept: Vec<Job> = Vec::new();
        let job = loop {
            let job = self.broker.take().await;
            if job.task_type == task_type.to_string() {
                break job;
            }
            kept.push(job);
        };
        let outcome = self.pool.process(job).await;
        for job in kept {
            self.broker
                .submit(job, Duration::ZERO)
                .await
                .expect("in-memory submit cannot fail");
        }
        outcome
    }
}

pub fn outcomes_for(outcomes: &[(String, JobOutcome)], task_type: TaskType) -> Vec<JobOutcome> {
    let tag = task_type.to_string();
    outcomes
        .iter()
        .filter(|(t, _)| *t == tag)
        .map(|(_, o)| o.clone())
        .collect()
}
