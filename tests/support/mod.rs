//! Shared fakes for the behaviour tests. Nothing here touches the network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tickwatch_core::http_client::HttpFuture;
use tickwatch_core::notification::{ChannelError, ChannelFuture};
use tickwatch_core::{
    HttpClient, HttpError, HttpRequest, HttpResponse, Kline, Notification, Notifier, UtcDateTime,
};

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync;

/// In-memory exchange: every request is answered by `respond` and recorded.
pub struct ScriptedHttpClient {
    respond: Box<Responder>,
    requests: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedHttpClient {
    pub fn new(
        respond: impl Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|(_, request)| request.url.clone())
            .collect()
    }

    pub fn sent_at(&self) -> Vec<Instant> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let outcome = (self.respond)(&request);
        self.requests
            .lock()
            .expect("requests lock")
            .push((Instant::now(), request));
        Box::pin(async move { outcome })
    }
}

/// Raw value of `name` in `url`'s query string.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

pub fn ts(input: &str) -> UtcDateTime {
    UtcDateTime::parse(input).expect("valid timestamp")
}

/// Daily bar opening at `open` with the given close and volume.
pub fn daily(symbol: &str, open: &str, close: f64, volume: f64) -> Kline {
    let open_time = ts(open);
    let close_time = open_time.saturating_add(time::Duration::days(1) - time::Duration::milliseconds(1));
    Kline::new(symbol, open_time, close_time, close, close + 1.0, close - 1.0, close, volume)
        .expect("valid kline")
}

/// Channel that records deliveries and can be told to fail.
pub struct RecordingNotifier {
    name: String,
    fail: bool,
    enabled: AtomicBool,
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn ok(name: &str) -> Arc<Self> {
        Self::build(name, false)
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::build(name, true)
    }

    fn build(name: &str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            fail,
            enabled: AtomicBool::new(true),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().expect("received lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> ChannelFuture<'a> {
        Box::pin(async move {
            if self.fail {
                return Err(ChannelError::new(format!("{} unreachable", self.name)));
            }
            self.received
                .lock()
                .expect("received lock")
                .push(notification.clone());
            Ok(())
        })
    }

    fn close<'a>(&'a self) -> ChannelFuture<'a> {
        Box::pin(async move {
            self.enabled.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}
