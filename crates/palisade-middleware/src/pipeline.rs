//! The assembled pipeline.

use std::sync::Arc;

use crate::context::StageContext;
use crate::stage::{Endpoint, Next, Stage};
use crate::types::{Request, Response};

/// A fixed, ordered sequence of stages in front of an endpoint.
///
/// Built once at server startup and shared by every connection. The stage
/// order cannot change after construction.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = Pipeline::new(vec![
///     Arc::new(MeteringStage::new(&context)),
///     Arc::new(CorsStage::new(cors_config)),
///     Arc::new(RateLimitStage::new(rate_limiter)),
/// ]);
/// let response = pipeline.process(&mut ctx, request, &dispatcher).await;
/// ```
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Creates a pipeline over the given stages, outermost first.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Runs a request through every stage and into the endpoint.
    pub async fn process(
        &self,
        ctx: &mut StageContext,
        request: Request,
        endpoint: &dyn Endpoint,
    ) -> Response {
        Next::new(&self.stages, endpoint).run(ctx, request).await
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` when the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
