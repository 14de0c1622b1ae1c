use std::io;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::client::{ChatError, CompletionBackend, CompletionRequest};

type CompletionResult = Result<String, ChatError>;

/// Runs completion calls on a background thread so the caller's loop never
/// blocks on the network. Results come back in dispatch order.
pub struct ChatDispatcher {
    requests: Option<Sender<CompletionRequest>>,
    results: Receiver<CompletionResult>,
    worker: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl ChatDispatcher {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<CompletionRequest>();
        let (result_tx, result_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("guide-chat".to_string())
            .spawn(move || {
                for request in request_rx {
                    let result = backend.complete(&request);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                debug!("chat_worker_stopped");
            })?;

        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            worker: Some(worker),
            in_flight: 0,
        })
    }

    pub fn dispatch(&mut self, request: CompletionRequest) -> Result<(), ChatError> {
        let sender = self.requests.as_ref().ok_or(ChatError::WorkerGone)?;
        sender.send(request).map_err(|_| ChatError::WorkerGone)?;
        self.in_flight += 1;
        Ok(())
    }

    /// Non-blocking. A worker that died with calls outstanding reports
    /// `WorkerGone` once per lost call.
    pub fn poll(&mut self) -> Option<CompletionResult> {
        if self.in_flight == 0 {
            return None;
        }
        match self.results.try_recv() {
            Ok(result) => {
                self.in_flight -= 1;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight -= 1;
                warn!("chat_worker_disconnected");
                Some(Err(ChatError::WorkerGone))
            }
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for ChatDispatcher {
    fn drop(&mut self) {
        self.requests.take();
        // In-flight calls are not cancelled; the worker is left detached.
        if self.in_flight == 0 {
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() {
                    warn!("chat_worker_panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionBody;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    struct ScriptedBackend {
        replies: Mutex<Vec<CompletionResult>>,
    }

    impl CompletionBackend for ScriptedBackend {
        fn complete(&self, _request: &CompletionRequest) -> CompletionResult {
            let mut replies = self.replies.lock().expect("lock");
            if replies.is_empty() {
                Ok(String::new())
            } else {
                replies.remove(0)
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            endpoint: "http://127.0.0.1:9/".to_string(),
            api_key: "k".to_string(),
            body: CompletionBody {
                model: "m".to_string(),
                messages: Vec::new(),
                temperature: 0.7,
            },
        }
    }

    fn poll_until_ready(dispatcher: &mut ChatDispatcher) -> CompletionResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = dispatcher.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "timed out waiting for result");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn poll_without_dispatch_returns_none() {
        let backend = Arc::new(ScriptedBackend {
            replies: Mutex::new(Vec::new()),
        });
        let mut dispatcher = ChatDispatcher::new(backend).expect("dispatcher");
        assert!(dispatcher.poll().is_none());
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn results_arrive_in_dispatch_order() {
        let backend = Arc::new(ScriptedBackend {
            replies: Mutex::new(vec![
                Ok("first".to_string()),
                Err(ChatError::Status {
                    status: 502,
                    body: String::new(),
                }),
            ]),
        });
        let mut dispatcher = ChatDispatcher::new(backend).expect("dispatcher");
        dispatcher.dispatch(request()).expect("dispatch");
        dispatcher.dispatch(request()).expect("dispatch");
        assert_eq!(dispatcher.in_flight(), 2);

        assert_eq!(poll_until_ready(&mut dispatcher).expect("ok"), "first");
        assert!(matches!(
            poll_until_ready(&mut dispatcher),
            Err(ChatError::Status { status: 502, .. })
        ));
        assert_eq!(dispatcher.in_flight(), 0);
    }

    struct PanickingBackend;

    impl CompletionBackend for PanickingBackend {
        fn complete(&self, _request: &CompletionRequest) -> CompletionResult {
            panic!("backend exploded");
        }
    }

    #[test]
    fn panicked_worker_reports_worker_gone_and_drops_cleanly() {
        let mut dispatcher = ChatDispatcher::new(Arc::new(PanickingBackend)).expect("dispatcher");
        dispatcher.dispatch(request()).expect("dispatch");

        assert!(matches!(
            poll_until_ready(&mut dispatcher),
            Err(ChatError::WorkerGone)
        ));
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(matches!(
            dispatcher.dispatch(request()),
            Err(ChatError::WorkerGone)
        ));
        drop(dispatcher);
    }
}
