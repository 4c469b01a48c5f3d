//! 测试环境
//!
//! 三个渠道服务共用一个 RecordingLogger，提供方保留句柄以便检查审计记录与切换健康状态。

use std::sync::Arc;

use notification_dispatch::provider::{
    FixedDelivery, MockEmailProvider, MockPushProvider, MockSmsProvider,
};
use notification_dispatch::test_utils::RecordingLogger;
use notification_dispatch::{EmailService, PushService, SmsService};
use notify_shared::config::ChannelConfig;

pub struct TestEnvironment {
    pub logger: RecordingLogger,
    pub email_provider: Arc<MockEmailProvider>,
    pub sms_provider: Arc<MockSmsProvider>,
    pub push_provider: Arc<MockPushProvider>,
    pub email: EmailService,
    pub sms: SmsService,
    pub push: PushService,
}

impl TestEnvironment {
    /// 投递结果固定为“未投递”，使审计记录可预期
    pub fn setup() -> Self {
        let logger = RecordingLogger::new();
        let config = ChannelConfig::default();

        let email_provider = Arc::new(MockEmailProvider::new(config.clone()));
        let sms_provider = Arc::new(MockSmsProvider::with_delivery_oracle(
            config.clone(),
            Arc::new(FixedDelivery::undelivered()),
        ));
        let push_provider = Arc::new(MockPushProvider::with_delivery_oracle(
            config.clone(),
            Arc::new(FixedDelivery::undelivered()),
        ));

        Self {
            email: EmailService::with_provider(
                config,
                email_provider.clone(),
                Arc::new(logger.clone()),
            ),
            sms: SmsService::with_provider(sms_provider.clone(), Arc::new(logger.clone())),
            push: PushService::with_provider(push_provider.clone(), Arc::new(logger.clone())),
            logger,
            email_provider,
            sms_provider,
            push_provider,
        }
    }
}
