//! Heartbeat sender.
//!
//! Sends `GET /session/keepalive` every `period` while the activation is
//! live. Failures are logged and never touch session state.

use std::sync::Arc;
use std::time::Duration;

use clipflow_client::SessionApi;
use tokio_util::sync::CancellationToken;

use crate::logging::SessionLogger;

pub(crate) struct KeepAliveSender {
    api: Arc<dyn SessionApi>,
    period: Duration,
    token: CancellationToken,
    logger: SessionLogger,
}

impl KeepAliveSender {
    pub fn new(
        api: Arc<dyn SessionApi>,
        period: Duration,
        token: CancellationToken,
        logger: SessionLogger,
    ) -> Self {
        Self {
            api,
            period,
            token,
            logger,
        }
    }

    pub async fn run(self) {
        let mut sent: u64 = 0;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }

            let result = tokio::select! {
                _ = self.token.cancelled() => break,
                result = self.api.keepalive() => result,
            };

            match result {
                Ok(()) => {
                    sent += 1;
                    self.logger.log_progress("Heartbeat sent");
                }
                Err(e) => self.logger.log_warning(&format!("Heartbeat failed: {}", e)),
            }
        }

        self.logger
            .log_stop(&format!("heartbeat after {} successful beats", sent));
    }
}
