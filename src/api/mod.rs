//! REST API for the code-assist backend.
//!
//! An Axum router in front of [`crate::assist::CodeAssistant`]. Handlers only
//! decode bodies and map errors; all behaviour lives in the library.
//!
//! # Endpoints
//!
//! - `POST /api/extract` - screenshot → `{ problemInfo, language }`
//! - `POST /api/generate` - problem → `{ code }`
//! - `GET /health` - health check
//!
//! Every successful response carries two headers describing the invocation:
//! `x-assist-attempts` (pipeline runs) and `x-assist-completion`
//! (`succeeded`, or `degraded:<reason>`).
//!
//! # cURL Examples
//!
//! ```bash
//! curl -X POST http://localhost:3000/api/extract \
//!      -H 'content-type: application/json' \
//!      -d "{\"imageDataList\": [\"$(base64 -w0 problem.png)\"], \"language\": \"rust\"}"
//!
//! curl -X POST http://localhost:3000/api/generate \
//!      -H 'content-type: application/json' \
//!      -d '{"problemInfo": "Two Sum: indices adding up to target", "language": "python"}'
//! ```

mod error;
mod handlers;
mod server;
mod types;

pub use error::ApiError;
pub use server::{create_router, create_router_with_limits, serve};
pub use types::{ApiLimits, ApiState, ErrorResponse, HealthResponse};
