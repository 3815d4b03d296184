//! 测试用的进程内 Messages API 模拟服务

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 模拟服务的应答
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 响应，按 (延迟毫秒, 字节) 逐块发送
    Chunks(Vec<(u64, Vec<u8>)>),
    /// 发送若干块后中断连接
    Broken(Vec<Vec<u8>>),
    /// 指定状态码和响应体
    Status(u16, String),
}

impl MockReply {
    /// 整个字符串作为一个块立即发送
    pub fn body(text: impl Into<String>) -> Self {
        MockReply::Chunks(vec![(0, text.into().into_bytes())])
    }

    /// 每个事件一个块，块之间间隔 `delay_ms`
    pub fn sse(events: Vec<String>, delay_ms: u64) -> Self {
        MockReply::Chunks(
            events
                .into_iter()
                .map(|e| (delay_ms, e.into_bytes()))
                .collect(),
        )
    }
}

/// 收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: Value,
}

struct MockState {
    hits: AtomicUsize,
    streaming: MockReply,
    non_streaming: MockReply,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockBackend {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    /// 启动服务；`stream: true` 的请求得到 `streaming`，否则得到 `non_streaming`
    pub async fn start(streaming: MockReply, non_streaming: MockReply) -> Self {
        let state = Arc::new(MockState {
            hits: AtomicUsize::new(0),
            streaming,
            non_streaming,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/v1/messages", post(handle))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}/", addr),
            state,
        }
    }

    /// 只配置流式应答，非流式请求得到 500
    pub async fn streaming(reply: MockReply) -> Self {
        Self::start(reply, MockReply::Status(500, "unexpected".to_string())).await
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let stream = body["stream"].as_bool().unwrap_or(false);
    state.requests.lock().push(RecordedRequest { headers, body });

    let reply = if stream {
        state.streaming.clone()
    } else {
        state.non_streaming.clone()
    };
    let content_type = if stream {
        "text/event-stream"
    } else {
        "application/json"
    };

    match reply {
        MockReply::Status(code, text) => Response::builder()
            .status(StatusCode::from_u16(code).unwrap())
            .body(Body::from(text))
            .unwrap(),
        MockReply::Chunks(chunks) => {
            let body = async_stream::stream! {
                for (delay, chunk) in chunks {
                    if delay > 0 {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    yield Ok::<Bytes, std::io::Error>(Bytes::from(chunk));
                }
            };
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", content_type)
                .body(Body::from_stream(body))
                .unwrap()
        }
        MockReply::Broken(chunks) => {
            let body = async_stream::stream! {
                for chunk in chunks {
                    yield Ok::<Bytes, std::io::Error>(Bytes::from(chunk));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                yield Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "mock abort"));
            };
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", content_type)
                .body(Body::from_stream(body))
                .unwrap()
        }
    }
}

/// Anthropic 风格的完整 SSE 流
pub fn anthropic_stream(deltas: &[&str], stop_reason: &str) -> Vec<String> {
    let mut events = vec![
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"role\":\"assistant\",\"content\":[],\"model\":\"mock\",\"stop_reason\":null}}\n\n".to_string(),
        "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n".to_string(),
    ];
    for delta in deltas {
        events.push(format!(
            "event: content_block_delta\ndata: {}\n\n",
            serde_json::json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": delta}
            })
        ));
    }
    events.push("event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n".to_string());
    events.push(format!(
        "event: message_delta\ndata: {{\"type\":\"message_delta\",\"delta\":{{\"stop_reason\":\"{}\"}}}}\n\n",
        stop_reason
    ));
    events.push("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_string());
    events
}

/// 测试用 HTTP 客户端，忽略环境中的代理设置
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
