//! Scripted transport for unit tests
//!
//! Replies are handed out in FIFO order and every request is recorded.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use crate::error::DriveError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, StreamingResponse};

enum Reply {
    Buffered(Result<HttpResponse, DriveError>),
    Streamed {
        status: u16,
        content_length: Option<u64>,
        chunks: Vec<Result<Bytes, DriveError>>,
    },
}

#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, response: HttpResponse) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Buffered(Ok(response)));
        self
    }

    pub(crate) fn reply_json(self, status: u16, body: serde_json::Value) -> Self {
        self.reply(HttpResponse::new(status, body.to_string()))
    }

    pub(crate) fn fail(self, error: DriveError) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Buffered(Err(error)));
        self
    }

    pub(crate) fn reply_stream(
        self,
        status: u16,
        content_length: Option<u64>,
        chunks: Vec<Result<Bytes, DriveError>>,
    ) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Streamed {
            status,
            content_length,
            chunks,
        });
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: Method, url_fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.contains(url_fragment))
            .count()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn next(&self, request: HttpRequest) -> Option<Reply> {
        self.requests.lock().unwrap().push(request);
        self.replies.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, DriveError> {
        let url = request.url.clone();
        match self.next(request) {
            Some(Reply::Buffered(result)) => result,
            Some(Reply::Streamed { .. }) => panic!("streamed reply scripted for buffered request to {}", url),
            None => Err(DriveError::transfer_error(format!("mock: no reply scripted for {}", url))),
        }
    }

    async fn stream(&self, request: HttpRequest) -> Result<StreamingResponse, DriveError> {
        let url = request.url.clone();
        match self.next(request) {
            Some(Reply::Streamed {
                status,
                content_length,
                chunks,
            }) => Ok(StreamingResponse {
                status,
                content_length,
                body: Box::pin(stream::iter(chunks)),
            }),
            Some(Reply::Buffered(Ok(response))) => Ok(StreamingResponse {
                status: response.status,
                content_length: Some(response.body.len() as u64),
                body: Box::pin(stream::iter(vec![Ok(response.body)])),
            }),
            Some(Reply::Buffered(Err(e))) => Err(e),
            None => Err(DriveError::transfer_error(format!("mock: no reply scripted for {}", url))),
        }
    }
}
