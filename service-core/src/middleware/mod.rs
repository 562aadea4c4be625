pub mod metrics;
pub mod request_id;

pub use metrics::metrics_middleware;
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
