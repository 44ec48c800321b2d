use crate::request::RequestInfo;
use std::fmt;
use std::sync::Arc;

/// Receives upload progress notifications while a request body is written.
///
/// `percent` is in `0..=100`. `0` is reported when the transport starts
/// sending the body and `100` once every byte has been handed to the
/// connection. A request that never reaches the wire reports nothing.
pub trait UploadProgressListener: Send + Sync {
    fn on_upload_progress(&self, request: &RequestInfo, percent: u8);
}

impl<F> UploadProgressListener for F
where
    F: Fn(&RequestInfo, u8) + Send + Sync,
{
    fn on_upload_progress(&self, request: &RequestInfo, percent: u8) {
        self(request, percent);
    }
}

/// A listener bound to the request it reports for.
///
/// Carried on a [`TransportRequest`](crate::TransportRequest) so the
/// transport can report progress while the body actually goes out.
#[derive(Clone)]
pub struct UploadProgress {
    request: RequestInfo,
    listener: Arc<dyn UploadProgressListener>,
}

impl UploadProgress {
    #[must_use]
    pub fn new(request: RequestInfo, listener: Arc<dyn UploadProgressListener>) -> Self {
        Self { request, listener }
    }

    pub fn report(&self, percent: u8) {
        self.listener.on_upload_progress(&self.request, percent.min(100));
    }
}

impl fmt::Debug for UploadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadProgress")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
