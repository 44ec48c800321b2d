use crate::progress::UploadProgress;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Single-chunk request body reporting upload progress as hyper pulls it.
///
/// hyper polls a request body only after the connection is established, so
/// a request that fails to connect reports nothing. `0` is reported on the
/// first poll and `100` when the data frame is handed to the connection.
#[derive(Debug, Default)]
pub struct UploadBody {
    data: Option<Bytes>,
    progress: Option<UploadProgress>,
    finished: bool,
}

impl UploadBody {
    #[must_use]
    pub fn new(data: Bytes, progress: Option<UploadProgress>) -> Self {
        Self {
            data: Some(data),
            progress,
            finished: false,
        }
    }

    fn report(&self, percent: u8) {
        if let Some(progress) = &self.progress {
            progress.report(percent);
        }
    }
}

impl Body for UploadBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        this.report(0);
        let data = this.data.take().filter(|d| !d.is_empty());
        this.finished = true;
        this.report(100);
        Poll::Ready(data.map(|d| Ok(Frame::data(d))))
    }

    fn is_end_stream(&self) -> bool {
        // With a listener the first poll must still happen to report progress.
        self.finished
            || (self.progress.is_none() && self.data.as_ref().is_none_or(Bytes::is_empty))
    }

    fn size_hint(&self) -> SizeHint {
        let len = self.data.as_ref().map_or(0, Bytes::len);
        SizeHint::with_exact(u64::try_from(len).unwrap_or(u64::MAX))
    }
}
