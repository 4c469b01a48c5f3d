//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时所有记录函数都是空操作。

use std::net::SocketAddr;
use std::sync::OnceLock;

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册通知相关指标的描述
pub fn describe_metrics() {
    metrics::describe_counter!(
        "notifications_sent_total",
        "Total number of notification send attempts by channel and outcome"
    );
    metrics::describe_histogram!(
        "notification_send_duration_seconds",
        "Notification send duration in seconds"
    );
    metrics::describe_counter!(
        "notification_bulk_items_total",
        "Total number of bulk send items by channel and outcome"
    );
    metrics::describe_counter!(
        "provider_health_checks_total",
        "Total number of provider health checks by channel and result"
    );
    metrics::describe_counter!("sms_segments_total", "Total number of SMS segments sent");
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一次发送
#[inline]
pub fn record_send(channel: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "notifications_sent_total",
        "channel" => channel.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "notification_send_duration_seconds",
        "channel" => channel.to_string()
    )
    .record(duration_secs);
}

/// 记录批量发送中的单项结果
#[inline]
pub fn record_bulk_item(channel: &str, success: bool) {
    metrics::counter!(
        "notification_bulk_items_total",
        "channel" => channel.to_string(),
        "outcome" => if success { "sent" } else { "failed" }
    )
    .increment(1);
}

/// 记录提供方健康检查结果
#[inline]
pub fn record_health_check(channel: &str, healthy: bool) {
    metrics::counter!(
        "provider_health_checks_total",
        "channel" => channel.to_string(),
        "healthy" => healthy.to_string()
    )
    .increment(1);
}

/// 记录发送的短信分段数
#[inline]
pub fn record_sms_segments(country_code: &str, segments: u32) {
    metrics::counter!(
        "sms_segments_total",
        "country" => country_code.to_string()
    )
    .increment(u64::from(segments));
}
