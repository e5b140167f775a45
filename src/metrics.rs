//! 拦截引擎监控指标

use prometheus::{IntCounter, IntGauge, Registry};

/// 拦截监控指标
#[derive(Clone)]
pub struct InterceptMetrics {
    /// 放行的入站消息数
    pub inbound_allowed: IntCounter,
    /// 否决的入站消息数
    pub inbound_denied: IntCounter,
    /// 未进入策略直接透传的入站消息数
    pub inbound_bypassed: IntCounter,
    /// 放行的出站消息数
    pub outbound_allowed: IntCounter,
    /// 否决的出站消息数
    pub outbound_denied: IntCounter,
    /// 静默发送数
    pub silent_sends: IntCounter,
    /// 调度表缺口命中数
    pub dispatch_gaps: IntCounter,
    /// 绑定失败数
    pub bind_failures: IntCounter,
    /// 注册表重试次数
    pub registry_retries: IntCounter,
    /// 注册表放弃次数
    pub registry_abandons: IntCounter,
    /// 安装后被替换次数
    pub displacements: IntCounter,
    /// 当前生效的挂钩数
    pub active_hooks: IntGauge,
}

impl InterceptMetrics {
    /// 创建并注册全部指标
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let inbound_allowed = IntCounter::new(
            "intercept_inbound_allowed",
            "Inbound messages allowed by the policy",
        )?;
        let inbound_denied = IntCounter::new(
            "intercept_inbound_denied",
            "Inbound messages denied and discarded",
        )?;
        let inbound_bypassed = IntCounter::new(
            "intercept_inbound_bypassed",
            "Inbound messages forwarded without consulting the policy",
        )?;
        let outbound_allowed = IntCounter::new(
            "intercept_outbound_allowed",
            "Outbound messages allowed by the policy",
        )?;
        let outbound_denied = IntCounter::new(
            "intercept_outbound_denied",
            "Outbound messages denied and dropped",
        )?;
        let silent_sends = IntCounter::new(
            "intercept_silent_sends",
            "Outbound messages sent through the silent bypass",
        )?;
        let dispatch_gaps = IntCounter::new(
            "intercept_dispatch_gaps",
            "Inbound messages whose kind has no dispatch entry",
        )?;
        let bind_failures = IntCounter::new(
            "intercept_bind_failures",
            "Per-session bind attempts aborted",
        )?;
        let registry_retries = IntCounter::new(
            "intercept_registry_retries",
            "Registry registrations retried on the next cycle",
        )?;
        let registry_abandons = IntCounter::new(
            "intercept_registry_abandons",
            "Registry registrations abandoned after the retry",
        )?;
        let displacements = IntCounter::new(
            "intercept_displacements",
            "Installed hooks found displaced by the health check",
        )?;
        let active_hooks = IntGauge::new(
            "intercept_active_hooks",
            "Currently installed hooked connections",
        )?;

        registry.register(Box::new(inbound_allowed.clone()))?;
        registry.register(Box::new(inbound_denied.clone()))?;
        registry.register(Box::new(inbound_bypassed.clone()))?;
        registry.register(Box::new(outbound_allowed.clone()))?;
        registry.register(Box::new(outbound_denied.clone()))?;
        registry.register(Box::new(silent_sends.clone()))?;
        registry.register(Box::new(dispatch_gaps.clone()))?;
        registry.register(Box::new(bind_failures.clone()))?;
        registry.register(Box::new(registry_retries.clone()))?;
        registry.register(Box::new(registry_abandons.clone()))?;
        registry.register(Box::new(displacements.clone()))?;
        registry.register(Box::new(active_hooks.clone()))?;

        Ok(Self {
            inbound_allowed,
            inbound_denied,
            inbound_bypassed,
            outbound_allowed,
            outbound_denied,
            silent_sends,
            dispatch_gaps,
            bind_failures,
            registry_retries,
            registry_abandons,
            displacements,
            active_hooks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let registry = Registry::new();
        let metrics = InterceptMetrics::new(&registry).unwrap();
        metrics.inbound_allowed.inc();
        assert_eq!(metrics.inbound_allowed.get(), 1);

        // 同一 Registry 上重复注册应失败
        assert!(InterceptMetrics::new(&registry).is_err());
    }
}
