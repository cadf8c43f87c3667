#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use hopper::{
    BoxError, Capabilities, InMemoryProvider, LogContext, Logger, Message, Options,
    OptionsResolver, Processor,
};
use serde_json::Value;

/// Queue name used by every test provider
pub const QUEUE_NAME: &str = "test-queue";

/// Build an in-memory provider holding `count` messages named `message-{i}`
pub fn provider_with(count: usize) -> InMemoryProvider {
    let provider = InMemoryProvider::new(QUEUE_NAME);
    for i in 0..count {
        provider.publish(Message::new(format!("message-{i}")));
    }
    provider
}

/// Every hook call made on a [`RecordingProcessor`], with the options it received
#[derive(Debug, Default)]
pub struct Journal {
    pub events: Vec<String>,
    pub options: Vec<Options>,
}

/// A processor that records its calls into a shared journal and replays scripted results
#[derive(Default)]
pub struct RecordingProcessor {
    journal: Arc<Mutex<Journal>>,
    capabilities: Capabilities,
    process_results: VecDeque<Result<bool, String>>,
    sleep_results: VecDeque<Result<bool, String>>,
    initialize_error: Option<String>,
    terminate_error: Option<String>,
    defaults: Vec<(String, Value)>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_process_results(
        mut self,
        results: impl IntoIterator<Item = Result<bool, &'static str>>,
    ) -> Self {
        self.process_results = results.into_iter().map(|r| r.map_err(str::to_string)).collect();
        self
    }

    pub fn with_sleep_results(
        mut self,
        results: impl IntoIterator<Item = Result<bool, &'static str>>,
    ) -> Self {
        self.sleep_results = results.into_iter().map(|r| r.map_err(str::to_string)).collect();
        self
    }

    pub fn failing_initialize(mut self, reason: &str) -> Self {
        self.initialize_error = Some(reason.to_string());
        self
    }

    pub fn failing_terminate(mut self, reason: &str) -> Self {
        self.terminate_error = Some(reason.to_string());
        self
    }

    pub fn with_default(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.defaults.push((key.to_string(), value.into()));
        self
    }

    pub fn journal(&self) -> Arc<Mutex<Journal>> {
        Arc::clone(&self.journal)
    }

    fn record(&self, event: String, options: &Options) {
        let mut journal = self.journal.lock().unwrap();
        journal.events.push(event);
        journal.options.push(options.clone());
    }
}

fn scripted(results: &mut VecDeque<Result<bool, String>>) -> Result<bool, BoxError> {
    match results.pop_front() {
        Some(Ok(keep_going)) => Ok(keep_going),
        Some(Err(reason)) => Err(reason.into()),
        None => Ok(true),
    }
}

impl Processor for RecordingProcessor {
    async fn process(&mut self, message: &Message, options: &Options) -> Result<bool, BoxError> {
        self.record(format!("process:{}", message.body_lossy()), options);
        scripted(&mut self.process_results)
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn configure(&self, resolver: &mut OptionsResolver) {
        for (key, value) in &self.defaults {
            resolver.set_default(key.clone(), value.clone());
        }
    }

    async fn initialize(&mut self, options: &Options) -> Result<(), BoxError> {
        self.record("initialize".to_string(), options);
        match &self.initialize_error {
            Some(reason) => Err(reason.clone().into()),
            None => Ok(()),
        }
    }

    async fn sleep(&mut self, options: &Options) -> Result<bool, BoxError> {
        self.record("sleep".to_string(), options);
        scripted(&mut self.sleep_results)
    }

    async fn terminate(&mut self, options: &Options) -> Result<(), BoxError> {
        self.record("terminate".to_string(), options);
        match &self.terminate_error {
            Some(reason) => Err(reason.clone().into()),
            None => Ok(()),
        }
    }
}

pub fn events(journal: &Arc<Mutex<Journal>>) -> Vec<String> {
    journal.lock().unwrap().events.clone()
}

pub fn count(journal: &Arc<Mutex<Journal>>, prefix: &str) -> usize {
    journal
        .lock()
        .unwrap()
        .events
        .iter()
        .filter(|event| event.starts_with(prefix))
        .count()
}

/// A captured log event
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub message: String,
    pub context: Value,
}

/// A logger that keeps every event for assertions
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|record| record.message).collect()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, _level: tracing::Level, message: &str, context: LogContext<'_>) {
        let context = Value::Object(
            context
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone()))
                .collect(),
        );
        self.records.lock().unwrap().push(LogRecord {
            message: message.to_string(),
            context,
        });
    }
}
