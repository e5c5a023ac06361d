//! Worker thread body.
//!
//! Each worker owns its parser and handles one request at a time, in arrival
//! order. Every request gets exactly one response; parse errors, decode
//! errors and panics all become [`DecodeOutcome::Failure`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::error::Result;
use crate::message::{
    DecodeOutcome, DecodeRequest, DecodeResponse, WorkerEvent, WorkerMessage, WorkerRequest,
};
use crate::parser::{ParserFactory, TileParser};
use crate::pipeline::decode_tile;

/// Channels and flags one worker thread runs with.
pub(crate) struct WorkerContext {
    pub slot: usize,
    pub factory: Arc<dyn ParserFactory>,
    pub inbox: async_channel::Receiver<WorkerRequest>,
    pub events: async_channel::Sender<WorkerEvent>,
    /// Set by the pool on release; queued requests are abandoned.
    pub terminated: Arc<AtomicBool>,
}

pub(crate) fn spawn(name: String, context: WorkerContext) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || run(context))?;
    Ok(handle)
}

fn run(context: WorkerContext) {
    let WorkerContext {
        slot,
        factory,
        inbox,
        events,
        terminated,
    } = context;

    let emit = |message: WorkerMessage| events.send_blocking(WorkerEvent { slot, message }).is_ok();

    let mut parser = match boot(factory.as_ref()) {
        Ok(parser) => parser,
        Err(message) => {
            tracing::error!("Worker {} failed to boot: {}", slot, message);
            emit(WorkerMessage::BootFailed { error: message });
            return;
        }
    };

    tracing::info!("Worker {} ready", slot);
    if !emit(WorkerMessage::Ready) {
        return;
    }

    while let Ok(request) = inbox.recv_blocking() {
        if terminated.load(Ordering::Acquire) {
            break;
        }
        match request {
            WorkerRequest::DecodeTile(request) => {
                let response = handle(parser.as_mut(), request);
                if let DecodeOutcome::Failure(message) = &response.outcome {
                    tracing::warn!(
                        "Worker {} failed request {} from client {}: {}",
                        slot,
                        response.request_id,
                        response.client_id,
                        message
                    );
                }
                if !emit(WorkerMessage::Response(response)) {
                    break;
                }
            }
        }
    }

    tracing::debug!("Worker {} stopped", slot);
}

fn boot(factory: &dyn ParserFactory) -> std::result::Result<Box<dyn TileParser>, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| factory.boot())) {
        Ok(Ok(parser)) => Ok(parser),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn handle(parser: &mut dyn TileParser, request: DecodeRequest) -> DecodeResponse {
    let DecodeRequest {
        request_id,
        client_id,
        buffer,
        source_path,
    } = request;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        parser.parse(buffer, &source_path).and_then(decode_tile)
    }));

    let outcome = match result {
        Ok(Ok(tile)) => DecodeOutcome::Success(tile),
        Ok(Err(e)) => DecodeOutcome::Failure(e.to_string()),
        Err(payload) => DecodeOutcome::Failure(panic_message(payload.as_ref())),
    };

    DecodeResponse {
        request_id,
        client_id,
        outcome,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("decoder panicked: {detail}")
}
