//! Fakes for the transport, sink and observer ports.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::time::Instant;
use url::Url;

use crate::features::bulk_download::aggregator::StatusMessage;
use crate::features::bulk_download::models::{DownloadItem, DownloadTaskState};
use crate::features::bulk_download::observer::JobObserver;
use crate::shared::{
    errors::FetchError,
    fs::ArtifactSink,
    network::{DataTransport, TransportResponse},
};

#[derive(Clone, Debug)]
enum Outcome {
    Body(Bytes),
    Status(u16),
    NetworkError(String),
    Hang,
}

/// Scripted reply for one request.
#[derive(Clone, Debug)]
pub struct Reply {
    delay: Duration,
    outcome: Outcome,
}

impl Reply {
    pub fn ok() -> Self {
        Self::ok_after(Duration::ZERO)
    }

    pub fn ok_after(delay: Duration) -> Self {
        Self { delay, outcome: Outcome::Body(Bytes::from_static(b"\xff\xd8\xff\xe0jpeg")) }
    }

    pub fn status(code: u16) -> Self {
        Self { delay: Duration::ZERO, outcome: Outcome::Status(code) }
    }

    pub fn network_error(message: &str) -> Self {
        Self { delay: Duration::ZERO, outcome: Outcome::NetworkError(message.to_string()) }
    }

    /// Never answers; only a timeout or cancellation ends the request.
    pub fn hang() -> Self {
        Self { delay: Duration::ZERO, outcome: Outcome::Hang }
    }
}

/// One request seen by [`FakeTransport`], with the paused-clock instant it started.
#[derive(Clone, Debug)]
pub struct Request {
    pub url: Url,
    pub at: Instant,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport answering from per-URL scripts; the last reply of a script repeats.
/// URLs without a script succeed immediately.
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, Vec<Reply>>>,
    requests: Mutex<Vec<Request>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reply(&self, url: &str, reply: Reply) {
        self.set_replies(url, vec![reply]);
    }

    pub fn set_replies(&self, url: &str, replies: Vec<Reply>) {
        let url = Url::parse(url).expect("valid test url");
        self.scripts.lock().unwrap().insert(key(&url), replies);
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect()
    }

    pub fn timed_requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, url: &Url) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| key(&r.url) == key(url))
            .cloned()
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &Url) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&key(url)) {
            Some(replies) if replies.len() > 1 => replies.remove(0),
            Some(replies) => replies[0].clone(),
            None => Reply::ok(),
        }
    }
}

#[async_trait]
impl DataTransport for FakeTransport {
    async fn open(&self, source: &Url) -> Result<TransportResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push(Request { url: source.clone(), at: Instant::now() });
        let reply = self.next_reply(source);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        tokio::time::sleep(reply.delay).await;
        match reply.outcome {
            Outcome::Body(bytes) => {
                let len = bytes.len() as u64;
                let body = stream::iter(vec![Ok(bytes)]);
                Ok(TransportResponse::new(200, Some(len), Box::pin(body)))
            }
            Outcome::Status(code) => {
                Ok(TransportResponse::new(code, None, Box::pin(stream::empty())))
            }
            Outcome::NetworkError(message) => Err(FetchError::Network(message)),
            Outcome::Hang => {
                futures::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
        }
    }
}

/// Sink that can be told to reject deliveries.
#[derive(Default)]
pub struct FlakySink {
    delivered: Mutex<Vec<String>>,
    reject: bool,
}

impl FlakySink {
    pub fn rejecting() -> Self {
        Self { delivered: Mutex::new(Vec::new()), reject: true }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactSink for FlakySink {
    async fn deliver(&self, _bytes: Bytes, destination_name: &str) -> Result<(), FetchError> {
        if self.reject {
            return Err(FetchError::Storage("disk full".into()));
        }
        self.delivered.lock().unwrap().push(destination_name.to_string());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Start(Vec<String>),
    Progress(DownloadTaskState),
    Complete(usize),
    Error(String, Option<String>),
    Cancel,
    Status(StatusMessage),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Every progress snapshot published for one item, in order.
    pub fn progress_of(&self, item_id: &str) -> Vec<DownloadTaskState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Progress(state) if state.item_id == item_id => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<StatusMessage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Status(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| wanted(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl JobObserver for RecordingObserver {
    fn on_start(&self, item_ids: &[String]) {
        self.push(Event::Start(item_ids.to_vec()));
    }

    fn on_progress(&self, task: &DownloadTaskState) {
        self.push(Event::Progress(task.clone()));
    }

    fn on_complete(&self, tasks: &[DownloadTaskState]) {
        self.push(Event::Complete(tasks.len()));
    }

    fn on_error(&self, message: &str, item_id: Option<&str>) {
        self.push(Event::Error(message.to_string(), item_id.map(str::to_string)));
    }

    fn on_cancel(&self) {
        self.push(Event::Cancel);
    }

    fn on_status(&self, message: &StatusMessage) {
        self.push(Event::Status(message.clone()));
    }
}

pub fn url_for(n: usize) -> String {
    format!("https://cdn.studio.example/gallery/IMG_{n:04}.jpg")
}

/// Items `1..=count`, ids `item-<n>`, names `IMG_<n>.jpg`.
pub fn items(count: usize) -> Vec<DownloadItem> {
    (1..=count)
        .map(|n| {
            DownloadItem::new(
                format!("item-{n}"),
                Url::parse(&url_for(n)).unwrap(),
                format!("IMG_{n:04}.jpg"),
            )
        })
        .collect()
}
