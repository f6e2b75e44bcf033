//! Request router for dispatching between the health check and the editor

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, Response};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use tracing::trace;

use crate::constants::HEALTHCHECK_PATH;
use crate::request_handler::RequestHandler;
use crate::sniff::TEXT_PLAIN_UTF_8;
use crate::web::respond_404;

/// Routes requests to the editor when the path is its base path
pub async fn route_request<B>(
    req: Request<B>,
    remote_addr: SocketAddr,
    handler: Arc<RequestHandler>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let path = req.uri().path();

    if path == HEALTHCHECK_PATH && matches!(*req.method(), Method::GET | Method::HEAD) {
        let mut response = Response::new(Full::new(Bytes::from_static(b"OK")));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF_8));
        return Ok(response);
    }

    let base_path = handler.config().base_path.as_str();
    // "/edit" and "/edit/" are the same mount point
    let is_editor_path = path == base_path || path == base_path.trim_end_matches('/');
    if !is_editor_path {
        trace!(path = %path, remote_addr = %remote_addr, "No route");
        return Ok(respond_404());
    }
    handler.handle_request(req, remote_addr).await
}
