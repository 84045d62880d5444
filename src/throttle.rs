use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::context::RequestContext;

/// Gate in front of an outgoing call.
///
/// `wait` may suspend until the call is permitted, or return immediately when
/// it already is. Implementations must watch `ctx` while suspended and fail
/// with [`crate::Error::Cancelled`] or [`crate::Error::DeadlineExceeded`] when
/// it fires. A single instance may be shared by concurrent calls, so any
/// permission state has to be safe for concurrent use.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn wait(&self, ctx: &RequestContext) -> Result<()>;
}

#[async_trait]
impl<T> Throttle for Arc<T>
where
    T: Throttle + ?Sized,
{
    async fn wait(&self, ctx: &RequestContext) -> Result<()> {
        (**self).wait(ctx).await
    }
}

/// Grants every call immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopThrottle;

#[async_trait]
impl Throttle for NoopThrottle {
    async fn wait(&self, ctx: &RequestContext) -> Result<()> {
        match ctx.err() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_throttle_grants_immediately() {
        let throttle = NoopThrottle;
        let ctx = RequestContext::background();
        for _ in 0..100 {
            throttle.wait(&ctx).await.expect("noop throttle should grant");
        }
    }

    #[tokio::test]
    async fn noop_throttle_reports_cancelled_context() {
        let ctx = RequestContext::background();
        ctx.cancel();
        let error = NoopThrottle
            .wait(&ctx)
            .await
            .expect_err("cancelled context should fail");
        assert!(error.is_cancelled());
    }

    #[tokio::test]
    async fn shared_throttle_delegates_through_arc() {
        let shared: Arc<dyn Throttle> = Arc::new(NoopThrottle);
        let ctx = RequestContext::background();
        shared.wait(&ctx).await.expect("arc throttle should grant");
    }
}
