//! Request and response-code metering.
//!
//! The outermost stage: ticks the `requests` meter for every request that
//! reaches the pipeline, regardless of outcome, and increments exactly one
//! response-code meter for every response written. Recognized status codes
//! get named meters (`responseCodes.ok`, `responseCodes.notFound`, ...);
//! everything else lands in `responseCodes.other`.

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use palisade_core::BoxFuture;
use palisade_telemetry::{Meter, MetricRegistry};

use crate::context::StageContext;
use crate::stage::{Next, Stage};
use crate::types::{Request, Response};

/// Status codes with dedicated meters, and their meter name suffixes.
const NAMED_CODES: [(StatusCode, &str); 10] = [
    (StatusCode::OK, "ok"),
    (StatusCode::CREATED, "created"),
    (StatusCode::ACCEPTED, "accepted"),
    (StatusCode::NO_CONTENT, "noContent"),
    (StatusCode::BAD_REQUEST, "badRequest"),
    (StatusCode::UNAUTHORIZED, "unauthorized"),
    (StatusCode::FORBIDDEN, "forbidden"),
    (StatusCode::NOT_FOUND, "notFound"),
    (StatusCode::TOO_MANY_REQUESTS, "tooManyRequests"),
    (StatusCode::INTERNAL_SERVER_ERROR, "serverError"),
];

/// The metering stage.
#[derive(Debug)]
pub struct MeteringStage {
    requests: Arc<Meter>,
    by_status: HashMap<StatusCode, Arc<Meter>>,
    other: Arc<Meter>,
    latency: Arc<palisade_telemetry::Timer>,
}

impl MeteringStage {
    /// Creates the stage, registering the `requests` meter, one meter per
    /// recognized status code, the `responseCodes.other` catch-all, and a
    /// request-latency timer.
    #[must_use]
    pub fn new(registry: &MetricRegistry) -> Self {
        let by_status = NAMED_CODES
            .iter()
            .map(|(code, name)| (*code, registry.meter(&format!("responseCodes.{name}"))))
            .collect();

        Self {
            requests: registry.meter("requests"),
            by_status,
            other: registry.meter("responseCodes.other"),
            latency: registry.timer("requests.latency"),
        }
    }

    fn meter_for(&self, status: StatusCode) -> &Meter {
        match self.by_status.get(&status) {
            Some(meter) => meter,
            None => &self.other,
        }
    }
}

impl Stage for MeteringStage {
    fn name(&self) -> &'static str {
        "metering"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut StageContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            self.requests.mark();
            let started = ctx.started_at();

            let response = next.run(ctx, request).await;

            self.meter_for(response.status()).mark();
            self.latency.record(started.elapsed());
            response
        })
    }
}
