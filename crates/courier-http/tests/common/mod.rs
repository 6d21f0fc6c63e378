use courier_http::{AttemptFailure, HttpClient, HttpClientConfig, RetryDelay};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every retry the client reports.
#[derive(Clone, Default)]
pub struct RetryLog {
    entries: Arc<Mutex<Vec<(u32, Option<u16>)>>>,
}

impl RetryLog {
    pub fn observer(&self) -> impl Fn(u32, &AttemptFailure) + Send + Sync + 'static {
        let entries = Arc::clone(&self.entries);
        move |attempt, failure| entries.lock().push((attempt, failure.status()))
    }

    pub fn attempts(&self) -> Vec<u32> {
        self.entries.lock().iter().map(|(attempt, _)| *attempt).collect()
    }

    pub fn statuses(&self) -> Vec<Option<u16>> {
        self.entries.lock().iter().map(|(_, status)| *status).collect()
    }
}

/// A client against `base_url` with immediate retries and an attached log.
pub fn client_with_log(base_url: &str, retries: u32) -> (HttpClient, RetryLog) {
    let log = RetryLog::default();
    let config = HttpClientConfig::new(base_url)
        .retries(retries)
        .retry_delay(RetryDelay::None)
        .on_retry(log.observer());
    (HttpClient::new(config).expect("valid config"), log)
}

/// A base URL nothing is listening on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}
