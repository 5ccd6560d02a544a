use crate::model::InfernumModel;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

// Type alias to simplify complex types
type EngineReply<M> = Result<
    InfernumEngineResponse<
        <<M as InfernumModel>::Request as RequestMetadata>::Metadata,
        <M as InfernumModel>::Response,
    >,
    InfernumEngineError<<M as InfernumModel>::Error>,
>;

/// Represents the current state of the inference engine.
#[derive(Clone, Debug, PartialEq)]
pub enum InfernumEngineState {
    /// The engine is waiting for the next request.
    Idle,
    /// The engine is running the model on a request.
    Processing,
}

impl InfernumEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfernumEngineState::Idle => "idle",
            InfernumEngineState::Processing => "processing",
        }
    }
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// The engine keeps the metadata for telemetry once the request itself has been
/// moved into the model, so heavy payloads such as image bytes are never cloned.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    fn metadata(&self) -> Self::Metadata;
}

/// Errors returned by [`InfernumEngine::infer`].
#[derive(thiserror::Error, Debug)]
pub enum InfernumEngineError<E> {
    /// The worker thread is gone and no longer accepts requests.
    #[error("inference engine is not running")]
    Stopped,

    /// The model panicked while handling this request.
    #[error("inference panicked: {0}")]
    Panicked(String),

    /// The model returned an error for this request.
    #[error(transparent)]
    Model(E),
}

struct InfernumEngineRequest<M: InfernumModel>
where
    M::Request: RequestMetadata,
{
    id: u64,
    request: M::Request,
    reply_tx: oneshot::Sender<EngineReply<M>>,
}

/// Response returned by the engine with the model's response and telemetry data.
#[derive(Debug)]
pub struct InfernumEngineResponse<Metadata, Res> {
    /// Identifier assigned to the request when it was submitted.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time spent inside the model.
    pub duration: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Metadata,
    /// The actual response from the model.
    pub response: Res,
}

/// Inference engine that owns a model on a dedicated worker thread.
///
/// Requests are handed to the worker over a channel and answered one at a time, so the
/// model can keep mutable runtime state (kv-cache, scratch buffers) without any locking
/// on the request path. Every caller awaits its own reply.
pub struct InfernumEngine<M: InfernumModel + Send + 'static>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    processing: Arc<AtomicBool>,
    req_tx: Option<mpsc::Sender<InfernumEngineRequest<M>>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl<M: InfernumModel + Send + 'static> InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine and moves `model` onto its worker thread.
    pub fn new(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<InfernumEngineRequest<M>>();
        let processing = Arc::new(AtomicBool::new(false));

        let inference_handle = std::thread::spawn({
            let processing = processing.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Running inference {}", req.id);

                    let request_metadata = req.request.metadata();

                    processing.store(true, Ordering::SeqCst);
                    let start_time = Instant::now();

                    let result = panic::catch_unwind(AssertUnwindSafe(|| model.run(req.request)));

                    let duration = start_time.elapsed();
                    processing.store(false, Ordering::SeqCst);

                    let reply = match result {
                        Ok(Ok(response)) => {
                            log::info!("Inference {} completed in {:?}", req.id, duration);
                            Ok(InfernumEngineResponse {
                                id: req.id,
                                start_time,
                                duration,
                                request_metadata,
                                response,
                            })
                        }
                        Ok(Err(e)) => {
                            log::warn!("Inference {} failed: {e}", req.id);
                            Err(InfernumEngineError::Model(e))
                        }
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            log::error!("Inference {} panicked: {message}", req.id);
                            Err(InfernumEngineError::Panicked(message))
                        }
                    };

                    if req.reply_tx.send(reply).is_err() {
                        log::debug!("Requester of inference {} went away", req.id);
                    }
                }
                log::debug!("Inference worker shutting down");
            }
        });

        Self {
            processing,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> InfernumEngineState {
        if self.processing.load(Ordering::SeqCst) {
            InfernumEngineState::Processing
        } else {
            InfernumEngineState::Idle
        }
    }

    /// Submits a request to the worker and waits for its response.
    ///
    /// Requests submitted while the model is busy wait in the channel and are served in
    /// arrival order.
    pub async fn infer(&self, request: M::Request) -> EngineReply<M> {
        let Some(tx) = &self.req_tx else {
            return Err(InfernumEngineError::Stopped);
        };

        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(InfernumEngineRequest {
            id,
            request,
            reply_tx,
        })
        .map_err(|_| InfernumEngineError::Stopped)?;

        reply_rx.await.map_err(|_| InfernumEngineError::Stopped)?
    }

    /// Stops the inference engine and shuts down the worker thread.
    ///
    /// Requests already queued are still served before the thread exits.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<M: InfernumModel + Send + 'static> Drop for InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    struct DoublerRequest(i64);

    impl RequestMetadata for DoublerRequest {
        type Metadata = i64;

        fn metadata(&self) -> Self::Metadata {
            self.0
        }
    }

    #[derive(thiserror::Error, Debug)]
    #[error("negative input: {0}")]
    struct NegativeInput(i64);

    impl InfernumModel for Doubler {
        type Request = DoublerRequest;
        type Response = i64;
        type Error = NegativeInput;

        fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
            match request.0 {
                n if n < 0 => Err(NegativeInput(n)),
                0 => panic!("zero is not allowed"),
                n => Ok(n * 2),
            }
        }
    }

    #[tokio::test]
    async fn infer_returns_model_response() {
        let engine = InfernumEngine::new(Doubler);

        let reply = engine.infer(DoublerRequest(21)).await.unwrap();
        assert_eq!(reply.response, 42);
        assert_eq!(reply.request_metadata, 21);
        assert_eq!(reply.id, 0);

        let reply = engine.infer(DoublerRequest(2)).await.unwrap();
        assert_eq!(reply.id, 1);
    }

    #[tokio::test]
    async fn model_error_does_not_stop_the_worker() {
        let engine = InfernumEngine::new(Doubler);

        let err = engine.infer(DoublerRequest(-3)).await.unwrap_err();
        assert!(matches!(err, InfernumEngineError::Model(NegativeInput(-3))));
        assert_eq!(err.to_string(), "negative input: -3");

        let reply = engine.infer(DoublerRequest(5)).await.unwrap();
        assert_eq!(reply.response, 10);
    }

    #[tokio::test]
    async fn panic_is_reported_and_worker_survives() {
        let engine = InfernumEngine::new(Doubler);

        let err = engine.infer(DoublerRequest(0)).await.unwrap_err();
        match err {
            InfernumEngineError::Panicked(msg) => assert_eq!(msg, "zero is not allowed"),
            other => panic!("unexpected error: {other}"),
        }

        let reply = engine.infer(DoublerRequest(1)).await.unwrap();
        assert_eq!(reply.response, 2);
        assert_eq!(engine.state(), InfernumEngineState::Idle);
    }

    #[tokio::test]
    async fn stopped_engine_rejects_requests() {
        let mut engine = InfernumEngine::new(Doubler);
        engine.stop();

        let err = engine.infer(DoublerRequest(1)).await.unwrap_err();
        assert!(matches!(err, InfernumEngineError::Stopped));
    }

    #[tokio::test]
    async fn concurrent_requests_are_all_served() {
        let engine = Arc::new(InfernumEngine::new(Doubler));

        let handles = (1..=8)
            .map(|n| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.infer(DoublerRequest(n)).await })
            })
            .collect::<Vec<_>>();

        let mut answers = Vec::new();
        for handle in handles {
            answers.push(handle.await.unwrap().unwrap().response);
        }
        answers.sort();
        assert_eq!(answers, vec![2, 4, 6, 8, 10, 12, 14, 16]);
    }

    #[test]
    fn state_strings() {
        assert_eq!(InfernumEngineState::Idle.as_str(), "idle");
        assert_eq!(InfernumEngineState::Processing.as_str(), "processing");
    }
}
