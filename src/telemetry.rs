//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志与链路追踪的初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// 默认日志过滤规则
pub const DEFAULT_FILTER: &str = "info";

/// 初始化 tracing
///
/// 组合控制台日志、`EnvFilter` 与 OpenTelemetry 层。`RUST_LOG` 优先于 `filter` 参数。
/// 全局 subscriber 只能设置一次，重复调用会被忽略。
///
/// # 参数
///
/// * `service_name` - 服务名称，作为 tracer 名称
/// * `filter` - 过滤规则，例如 "oxdata=debug"
///
/// # 返回值
///
/// 是否由本次调用完成了全局 subscriber 的设置
pub fn init_tracing(service_name: &str, filter: Option<&str>) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));

    // 未配置导出器时 provider 不导出任何 span
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
